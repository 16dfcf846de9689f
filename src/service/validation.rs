//! Generic validator interpreting a synthesized [`Interface`], plus scalar coercion for
//! query-string and path values.

use crate::error::{AppError, FieldError};
use crate::interface::{FieldFormat, FieldSpec, Interface};
use crate::schema::{ColumnDescriptor, LogicalType};
use base64::Engine as _;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn decimal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid decimal pattern"))
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a JSON body against an interface. Every failing field is reported; on success
    /// the returned map holds exactly the supplied fields.
    pub fn validate(interface: &Interface, body: Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(body) = body else {
            return Err(AppError::BadRequest("body must be a JSON object".into()));
        };
        let mut errors = Vec::new();
        for key in body.keys() {
            if interface.field(key).is_none() {
                errors.push(FieldError::new(key, "unknown field"));
            }
        }
        for field in &interface.fields {
            match body.get(&field.name) {
                None if field.required => errors.push(FieldError::new(&field.name, "field is required")),
                None => {}
                Some(v) => {
                    if let Err(message) = check_value(field, v) {
                        errors.push(FieldError::new(&field.name, message));
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(body)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Coerce a raw query parameter into a typed value for `column`, rejecting values the
    /// column could never hold.
    pub fn coerce_text(column: &ColumnDescriptor, raw: &str) -> Result<Value, String> {
        let value = Self::parse_text(column, raw)?;
        Self::within_bounds(column, &value)?;
        Ok(value)
    }

    /// Text longer than the declared length, or an integer outside the native width.
    pub fn within_bounds(column: &ColumnDescriptor, value: &Value) -> Result<(), String> {
        match column.logical_type {
            LogicalType::Integer => {
                let (lo, hi) = column.integer_bounds();
                match value.as_i64() {
                    Some(n) if n < lo || n > hi => Err(format!("must be between {} and {}", lo, hi)),
                    _ => Ok(()),
                }
            }
            LogicalType::Text => match (column.max_length, value.as_str()) {
                (Some(max), Some(s)) if s.chars().count() > max as usize => {
                    Err(format!("must be at most {} characters", max))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Type-only coercion of a raw string; bounds are not checked.
    pub fn parse_text(column: &ColumnDescriptor, raw: &str) -> Result<Value, String> {
        match column.logical_type {
            LogicalType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| "must be an integer".to_string()),
            LogicalType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "must be a number".to_string()),
            LogicalType::Decimal => {
                if decimal_pattern().is_match(raw.trim()) {
                    Ok(Value::String(raw.trim().to_string()))
                } else {
                    Err("must be a decimal number".into())
                }
            }
            LogicalType::Boolean => match raw {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("must be true or false".into()),
            },
            LogicalType::DateTime => {
                if is_iso8601(raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err("must be an ISO-8601 date, time or timestamp".into())
                }
            }
            LogicalType::Binary => {
                if base64::engine::general_purpose::STANDARD.decode(raw).is_ok() {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err("must be base64 encoded".into())
                }
            }
            LogicalType::Enum if !column.allowed_values.is_empty() => {
                if column.allowed_values.iter().any(|a| a == raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(format!("must be one of: {}", column.allowed_values.join(", ")))
                }
            }
            LogicalType::Text if column.is_uuid() => uuid::Uuid::parse_str(raw)
                .map(|u| Value::String(u.to_string()))
                .map_err(|_| "must be a valid UUID".to_string()),
            LogicalType::Text | LogicalType::Enum | LogicalType::Opaque => Ok(Value::String(raw.to_string())),
        }
    }
}

fn check_value(field: &FieldSpec, v: &Value) -> Result<(), String> {
    if v.is_null() {
        return if field.nullable {
            Ok(())
        } else {
            Err("may not be null".into())
        };
    }
    match field.logical_type {
        LogicalType::Integer => {
            let Some(n) = v.as_i64() else {
                return Err("must be an integer".into());
            };
            if let Some((lo, hi)) = field.constraints.range {
                if n < lo || n > hi {
                    return Err(format!("must be between {} and {}", lo, hi));
                }
            }
        }
        LogicalType::Float => {
            if !v.is_number() {
                return Err("must be a number".into());
            }
        }
        LogicalType::Decimal => {
            let ok = v.is_number() || v.as_str().map(|s| decimal_pattern().is_match(s)).unwrap_or(false);
            if !ok {
                return Err("must be a decimal number".into());
            }
        }
        LogicalType::Boolean => {
            if !v.is_boolean() {
                return Err("must be true or false".into());
            }
        }
        LogicalType::DateTime => {
            if !v.as_str().map(is_iso8601).unwrap_or(false) {
                return Err("must be an ISO-8601 date, time or timestamp".into());
            }
        }
        LogicalType::Binary => {
            let ok = v
                .as_str()
                .map(|s| base64::engine::general_purpose::STANDARD.decode(s).is_ok())
                .unwrap_or(false);
            if !ok {
                return Err("must be a base64 encoded string".into());
            }
        }
        LogicalType::Text | LogicalType::Enum => {
            let Some(s) = v.as_str() else {
                return Err("must be a string".into());
            };
            if let Some(max) = field.constraints.max_length {
                if s.chars().count() > max as usize {
                    return Err(format!("must be at most {} characters", max));
                }
            }
            if !field.constraints.allowed.is_empty() && !field.constraints.allowed.iter().any(|a| a == s) {
                return Err(format!("must be one of: {}", field.constraints.allowed.join(", ")));
            }
            if field.constraints.format == Some(FieldFormat::Uuid) && uuid::Uuid::parse_str(s).is_err() {
                return Err("must be a valid UUID".into());
            }
        }
        LogicalType::Opaque => {}
    }
    Ok(())
}

/// RFC 3339 timestamp, naive timestamp, date or time of day.
pub fn is_iso8601(s: &str) -> bool {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
}
