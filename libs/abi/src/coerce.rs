//! Conversion of JSON arguments into dynamic ABI values.
//!
//! Deployment definitions carry call and constructor arguments as plain JSON.
//! Integers may be JSON numbers, decimal strings or `0x` hex strings, with an
//! optional leading `-` for signed types; anything else (exponents, empty hex,
//! stray characters) is rejected rather than read as some other number. Byte
//! values are `0x` hex. Addresses are `0x` hex or a name understood by the
//! caller-supplied lookup (used for aliases of earlier deployments).

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, Address, Sign, B256, I256, U256};
use serde_json::Value;

use crate::AbiError;

/// Converts `value` into a value of type `ty`.
///
/// `lookup` resolves non-hex address strings; returning `None` rejects the value.
pub fn coerce(
    ty: &DynSolType,
    value: &Value,
    lookup: &dyn Fn(&str) -> Option<Address>,
) -> Result<DynSolValue, AbiError> {
    match ty {
        DynSolType::Address => {
            let s = expect_str(ty, value)?;
            if is_hex_prefixed(s) {
                return s
                    .parse::<Address>()
                    .map(DynSolValue::Address)
                    .map_err(|e| invalid(ty, value, e.to_string()));
            }
            lookup(s)
                .map(DynSolValue::Address)
                .ok_or_else(|| invalid(ty, value, "unknown address or alias"))
        }
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) if s == "true" => Ok(DynSolValue::Bool(true)),
            Value::String(s) if s == "false" => Ok(DynSolValue::Bool(false)),
            _ => Err(invalid(ty, value, "expected a boolean")),
        },
        DynSolType::Uint(bits) => {
            let (negative, magnitude) = integer(ty, value)?;
            if negative {
                return Err(invalid(ty, value, "negative value for unsigned type"));
            }
            if magnitude.bit_len() > *bits {
                return Err(overflow(ty, value));
            }
            Ok(DynSolValue::Uint(magnitude, *bits))
        }
        DynSolType::Int(bits) => {
            let (negative, magnitude) = integer(ty, value)?;
            let negative = negative && !magnitude.is_zero();
            // Two's complement range: [-2^(bits-1), 2^(bits-1) - 1].
            let fits = if negative {
                (magnitude - U256::from(1u64)).bit_len() < *bits
            } else {
                magnitude.bit_len() < *bits
            };
            let sign = if negative {
                Sign::Negative
            } else {
                Sign::Positive
            };
            let signed = fits
                .then(|| I256::checked_from_sign_and_abs(sign, magnitude))
                .flatten()
                .ok_or_else(|| overflow(ty, value))?;
            Ok(DynSolValue::Int(signed, *bits))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = decode_hex(ty, value)?;
            if bytes.len() != *size {
                return Err(invalid(
                    ty,
                    value,
                    format!("expected {size} bytes, got {}", bytes.len()),
                ));
            }
            let mut word = B256::ZERO;
            word.0[..*size].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Bytes => decode_hex(ty, value).map(DynSolValue::Bytes),
        DynSolType::String => expect_str(ty, value).map(|s| DynSolValue::String(s.to_string())),
        DynSolType::Array(inner) => expect_array(ty, value)?
            .iter()
            .map(|item| coerce(inner, item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        DynSolType::FixedArray(inner, size) => {
            let items = expect_array(ty, value)?;
            if items.len() != *size {
                return Err(invalid(
                    ty,
                    value,
                    format!("expected {size} elements, got {}", items.len()),
                ));
            }
            items
                .iter()
                .map(|item| coerce(inner, item, lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(members) => {
            let items = expect_array(ty, value)?;
            if items.len() != members.len() {
                return Err(invalid(
                    ty,
                    value,
                    format!("expected {} members, got {}", members.len(), items.len()),
                ));
            }
            members
                .iter()
                .zip(items)
                .map(|(member, item)| coerce(member, item, lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        other => Err(AbiError::UnsupportedType(other.sol_type_name().into_owned())),
    }
}

fn is_hex_prefixed(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

fn invalid(ty: &DynSolType, value: &Value, reason: impl Into<String>) -> AbiError {
    AbiError::argument(ty.sol_type_name(), value, reason)
}

fn overflow(ty: &DynSolType, value: &Value) -> AbiError {
    AbiError::Overflow {
        ty: ty.sol_type_name().into_owned(),
        value: value.to_string(),
    }
}

fn expect_str<'a>(ty: &DynSolType, value: &'a Value) -> Result<&'a str, AbiError> {
    value
        .as_str()
        .ok_or_else(|| invalid(ty, value, "expected a string"))
}

fn expect_array<'a>(ty: &DynSolType, value: &'a Value) -> Result<&'a Vec<Value>, AbiError> {
    value
        .as_array()
        .ok_or_else(|| invalid(ty, value, "expected an array"))
}

fn decode_hex(ty: &DynSolType, value: &Value) -> Result<Vec<u8>, AbiError> {
    let s = expect_str(ty, value)?;
    if !is_hex_prefixed(s) {
        return Err(invalid(ty, value, "expected 0x-prefixed hex"));
    }
    hex::decode(&s[2..]).map_err(|e| invalid(ty, value, e.to_string()))
}

/// Sign and magnitude of an integer argument.
///
/// Only JSON integers, decimal digits and `0x` followed by at least one hex
/// digit are accepted. Overflow is reported only for well-formed text.
fn integer(ty: &DynSolType, value: &Value) -> Result<(bool, U256), AbiError> {
    let text = match value {
        Value::Number(n) if !n.is_f64() => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid(ty, value, "expected an integer")),
    };

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (radix, digits) = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex_digits) => (16, hex_digits),
        None => (10, unsigned),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        let reason = if radix == 16 {
            "expected hex digits after 0x"
        } else {
            "expected an integer in decimal or 0x hex"
        };
        return Err(invalid(ty, value, reason));
    }

    let magnitude =
        U256::from_str_radix(digits, u64::from(radix)).map_err(|_| overflow(ty, value))?;
    Ok((negative, magnitude))
}
