//! Error types for loading and resolving deployment definitions.

use std::path::PathBuf;

use stepchain_abi::AbiError;
use thiserror::Error;

/// Errors raised while loading a definition file.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The definition file does not exist.
    #[error("deployment definition not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read deployment definition {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid definition document.
    #[error("failed to parse deployment definition {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// Errors raised while locating or decoding a compiled contract artifact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("no artifact named '{0}'")]
    NotFound(String),

    #[error("artifact name '{name}' matches more than one file: {}", .paths.join(", "))]
    Ambiguous { name: String, paths: Vec<String> },

    #[error("failed to read artifact {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse artifact {path}: {message}")]
    Parse { path: String, message: String },

    /// Bytecode is missing, abstract or still contains link placeholders.
    #[error("artifact '{name}' has no deployable bytecode: {message}")]
    InvalidBytecode { name: String, message: String },
}

/// A definition that cannot be turned into raw operations.
///
/// Raised before any ledger interaction and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("action #{}: {kind}", .index + 1)]
pub struct MalformedDefinition {
    /// Zero-based index of the offending action.
    pub index: usize,
    pub kind: MalformedKind,
}

impl MalformedDefinition {
    pub fn new(index: usize, kind: MalformedKind) -> Self {
        Self { index, kind }
    }
}

/// Reason a definition action is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedKind {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("gas limit must be greater than zero")]
    ZeroGasLimit,

    #[error("alias '{0}' is already defined by an earlier deploy")]
    DuplicateAlias(String),

    #[error("alias '{0}' is not defined by an earlier deploy")]
    UnknownAlias(String),

    #[error("'{0}' cannot be used as an alias")]
    InvalidAlias(String),

    #[error("invalid target address '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A signature or ABI parameter type could not be read.
    #[error(transparent)]
    Signature(AbiError),

    #[error("function '{function}' is not defined by contract '{contract}'")]
    UnknownFunction { contract: String, function: String },

    #[error("function '{function}' is overloaded in contract '{contract}'; use a full signature")]
    AmbiguousFunction { contract: String, function: String },

    #[error("function '{0}' needs a full signature when the target is a literal address")]
    BareFunctionName(String),

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("argument {}: {source}", .position + 1)]
    Argument {
        position: usize,
        #[source]
        source: AbiError,
    },
}
