//! Convert validated JSON values into text parameters.
//!
//! Every parameter is bound as nullable text and cast server-side to the column's
//! native type, so one bind type covers every column PostgreSQL can parse from text.

use crate::schema::ColumnDescriptor;
use serde_json::Value;

/// Text form of `v` for `column`. `None` binds SQL NULL.
pub fn to_param(column: &ColumnDescriptor, v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        _ if column.is_json() => Some(v.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{fixtures, LogicalType};
    use serde_json::json;

    #[test]
    fn scalars_use_their_text_form() {
        let id = fixtures::column("id", LogicalType::Integer, "integer", false);
        assert_eq!(to_param(&id, &json!(42)), Some("42".into()));
        assert_eq!(to_param(&id, &Value::Null), None);
        let flag = fixtures::column("on", LogicalType::Boolean, "boolean", false);
        assert_eq!(to_param(&flag, &json!(false)), Some("false".into()));
        let name = fixtures::column("name", LogicalType::Text, "text", false);
        assert_eq!(to_param(&name, &json!("bob")), Some("bob".into()));
    }

    #[test]
    fn json_columns_receive_documents() {
        let payload = fixtures::column("payload", LogicalType::Opaque, "jsonb", true);
        assert_eq!(to_param(&payload, &json!("bob")), Some("\"bob\"".into()));
        assert_eq!(to_param(&payload, &json!({"a": 1})), Some("{\"a\":1}".into()));
        assert_eq!(to_param(&payload, &Value::Null), None);
    }
}
