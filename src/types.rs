//! Semantic types and the cast functions between external and stored values
//!
//! Casting is split in two directions:
//!
//! - **cast-in** turns a user supplied value into the declared type. It can
//!   fail with [`InvalidType`].
//! - **cast-out** turns a stored value back into the declared type when the
//!   store cannot represent it natively (symbols come back as strings).
//!
//! Numeric casts are strict: the parsed number, printed again, must equal the
//! normalized input, so `"12abc"` and `"042"` are rejected instead of being
//! truncated.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Bare cast failure returned by a cast-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid type")]
pub struct InvalidType;

/// Cast-in function: external value to declared type
pub type CastIn = fn(&Value) -> Result<Value, InvalidType>;

/// Cast-out function: stored value to declared type
pub type CastOut = fn(Value) -> Value;

/// Declared semantic type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    String,
    Integer,
    Float,
    Boolean,
    Symbol,
    /// A type with no registered casts
    Custom(String),
}

impl TypeTag {
    /// Human readable type label used in validation messages
    pub fn human_name(&self) -> &str {
        match self {
            TypeTag::String => "String",
            TypeTag::Integer => "Integer",
            TypeTag::Float => "Float",
            TypeTag::Boolean => "Boolean",
            TypeTag::Symbol => "Symbol",
            TypeTag::Custom(name) => name,
        }
    }

    /// Whether `value` is already in this type's internal representation
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (TypeTag::String, Value::String(_))
                | (TypeTag::Integer, Value::Integer(_))
                | (TypeTag::Float, Value::Float(_))
                | (TypeTag::Boolean, Value::Bool(_))
                | (TypeTag::Symbol, Value::Symbol(_))
        )
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        match name {
            "String" | "string" => TypeTag::String,
            "Integer" | "integer" => TypeTag::Integer,
            "Float" | "float" => TypeTag::Float,
            "Boolean" | "boolean" => TypeTag::Boolean,
            "Symbol" | "symbol" => TypeTag::Symbol,
            other => TypeTag::Custom(other.to_string()),
        }
    }
}

impl From<String> for TypeTag {
    fn from(name: String) -> Self {
        TypeTag::from(name.as_str())
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.human_name().to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.human_name())
    }
}

/// A cast failure annotated with the attribute it happened on
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{attribute} should be a {type_tag}, got {value}")]
pub struct CastError {
    pub type_tag: TypeTag,
    pub value: Value,
    pub attribute: String,
}

impl CastError {
    pub fn human_type_name(&self) -> &str {
        self.type_tag.human_name()
    }
}

/// Registered cast-in function for `tag`, if any
pub fn registered_cast_in(tag: &TypeTag) -> Option<CastIn> {
    match tag {
        TypeTag::String => Some(cast_string),
        TypeTag::Integer => Some(cast_integer),
        TypeTag::Float => Some(cast_float),
        TypeTag::Boolean => Some(cast_boolean),
        TypeTag::Symbol => Some(cast_symbol),
        TypeTag::Custom(_) => None,
    }
}

/// Cast-in function for `tag`. Unregistered types reject every value.
pub fn lookup_cast_in(tag: &TypeTag) -> CastIn {
    registered_cast_in(tag).unwrap_or(reject)
}

/// Cast-out function for `tag`. `None` means stored values are used as-is.
pub fn lookup_cast_out(tag: &TypeTag) -> Option<CastOut> {
    match tag {
        TypeTag::Symbol => Some(symbol_from_store),
        _ => None,
    }
}

fn reject(_: &Value) -> Result<Value, InvalidType> {
    Err(InvalidType)
}

fn cast_string(value: &Value) -> Result<Value, InvalidType> {
    match value {
        Value::Symbol(s) => Ok(Value::String(s.clone())),
        _ => Err(InvalidType),
    }
}

/// Trim whitespace and drop a single leading `+`.
fn normalize_number(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.strip_prefix('+').unwrap_or(trimmed)
}

fn cast_integer(value: &Value) -> Result<Value, InvalidType> {
    match value {
        Value::String(s) => {
            let normalized = normalize_number(s);
            let parsed: i64 = normalized.parse().map_err(|_| InvalidType)?;
            if parsed.to_string() == normalized {
                Ok(Value::Integer(parsed))
            } else {
                Err(InvalidType)
            }
        }
        // only integral floats inside the i64 range
        Value::Float(f) if f.is_finite() && *f >= -(2f64.powi(63)) && *f < 2f64.powi(63) => {
            let truncated = *f as i64;
            if truncated as f64 == *f {
                Ok(Value::Integer(truncated))
            } else {
                Err(InvalidType)
            }
        }
        _ => Err(InvalidType),
    }
}

/// Normalized textual form of a float: no trailing fractional zeros, always
/// at least one fractional digit.
fn normalize_float(input: &str) -> String {
    let mut normalized = normalize_number(input);
    if normalized.contains('.') {
        normalized = normalized.trim_end_matches('0');
    }
    normalized = normalized.strip_suffix('.').unwrap_or(normalized);
    if normalized.contains('.') {
        normalized.to_string()
    } else {
        format!("{}.0", normalized)
    }
}

/// Canonical text of a float: fixed notation inside `[1e-4, 1e16)`,
/// otherwise `1.5e+16` / `1.0e-05` style scientific notation.
fn format_float(f: f64) -> String {
    let magnitude = f.abs();
    if magnitude == 0.0 || (1e-4..1e16).contains(&magnitude) {
        return with_fraction(f.to_string());
    }

    let printed = format!("{:e}", f);
    match printed.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or_default();
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", with_fraction(mantissa.to_string()), sign, exponent.abs())
        }
        None => with_fraction(printed),
    }
}

fn with_fraction(printed: String) -> String {
    if printed.contains('.') {
        printed
    } else {
        format!("{}.0", printed)
    }
}

fn cast_float(value: &Value) -> Result<Value, InvalidType> {
    match value {
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::String(s) => {
            let normalized = normalize_float(s);
            let parsed: f64 = normalized.parse().map_err(|_| InvalidType)?;
            if parsed.is_finite() && format_float(parsed) == normalized {
                Ok(Value::Float(parsed))
            } else {
                Err(InvalidType)
            }
        }
        _ => Err(InvalidType),
    }
}

fn cast_boolean(value: &Value) -> Result<Value, InvalidType> {
    let text = match value {
        Value::Bool(b) => return Ok(Value::Bool(*b)),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        Value::Integer(i) => i.to_string(),
        _ => return Err(InvalidType),
    };
    match text.as_str() {
        "true" | "yes" | "t" | "1" => Ok(Value::Bool(true)),
        "false" | "no" | "f" | "0" => Ok(Value::Bool(false)),
        _ => Err(InvalidType),
    }
}

fn cast_symbol(value: &Value) -> Result<Value, InvalidType> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(InvalidType)
            } else {
                Ok(Value::Symbol(trimmed.to_string()))
            }
        }
        _ => Err(InvalidType),
    }
}

fn symbol_from_store(value: Value) -> Value {
    match value {
        Value::String(s) => Value::Symbol(s),
        other => other,
    }
}
