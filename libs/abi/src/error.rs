//! Error types for signatures and argument coercion.

use thiserror::Error;

/// Errors raised while reading signatures or coercing JSON arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// A function signature or ABI parameter could not be parsed.
    #[error("invalid signature '{signature}': {message}")]
    InvalidSignature { signature: String, message: String },

    /// The type has no JSON representation in deployment definitions.
    #[error("unsupported ABI type '{0}'")]
    UnsupportedType(String),

    /// A JSON argument cannot be converted to the requested type.
    #[error("cannot convert {value} to {ty}: {reason}")]
    InvalidArgument {
        ty: String,
        value: String,
        reason: String,
    },

    /// An integer does not fit the declared width.
    #[error("integer {value} does not fit in {ty}")]
    Overflow { ty: String, value: String },
}

impl AbiError {
    pub fn signature(signature: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidSignature {
            signature: signature.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn argument(
        ty: impl ToString,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            ty: ty.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
