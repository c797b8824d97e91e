use crate::config::schema::{FieldSpec, FieldType};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;

fn invalid(attribute: &str, message: impl Into<String>) -> Error {
    Error::InvalidFieldSpec {
        attribute: attribute.to_string(),
        message: message.into(),
    }
}

/// Validates one raw `data_fields` entry.
///
/// Fails on the first offending attribute, checked in the order
/// `selector`, `type`, `required`, `regex`.
pub fn validate_field(raw: &Value) -> Result<FieldSpec> {
    let obj = raw
        .as_object()
        .ok_or_else(|| invalid("field", "must be an object"))?;

    let selector = match obj.get("selector") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => return Err(invalid("selector", "must not be empty")),
        Some(_) => return Err(invalid("selector", "must be a string")),
        None => return Err(invalid("selector", "is required")),
    };

    let field_type = match obj.get("type") {
        Some(Value::String(s)) => FieldType::parse(s).ok_or_else(|| {
            invalid(
                "type",
                format!("'{}' is not one of {}", s, FieldType::ALL.join(", ")),
            )
        })?,
        Some(_) => return Err(invalid("type", "must be a string")),
        None => return Err(invalid("type", "is required")),
    };

    let required = match obj.get("required") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid("required", "must be a boolean")),
    };

    let regex = match obj.get("regex") {
        None | Some(Value::Null) => None,
        Some(Value::String(pattern)) => {
            Regex::new(pattern).map_err(|e| invalid("regex", e.to_string()))?;
            Some(pattern.clone())
        }
        Some(_) => return Err(invalid("regex", "must be a string")),
    };

    Ok(FieldSpec {
        selector,
        field_type,
        required,
        regex,
    })
}
