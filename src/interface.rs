//! Create / Update / Read interfaces synthesized from a table descriptor.
//!
//! An interface is an explicit list of tagged fields; the single generic validator in
//! [`crate::service::RequestValidator`] interprets it.

use crate::schema::{ColumnDescriptor, LogicalType, TableDescriptor};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceRole {
    Create,
    Update,
    Read,
}

impl InterfaceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceRole::Create => "Create",
            InterfaceRole::Update => "Update",
            InterfaceRole::Read => "Read",
        }
    }
}

/// Extra string format enforced on top of the logical type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    Uuid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Inclusive integer range of narrower-than-`bigint` columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    pub required: bool,
    pub nullable: bool,
    pub constraints: FieldConstraints,
}

#[derive(Clone, Debug, Serialize)]
pub struct Interface {
    /// `<table>.<Role>`, e.g. `users.Create`.
    pub name: String,
    pub role: InterfaceRole,
    pub fields: Vec<FieldSpec>,
}

impl Interface {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Keep only this interface's fields, in declared order. Missing fields become null.
    pub fn project(&self, mut row: Map<String, Value>) -> Value {
        let mut out = Map::with_capacity(self.fields.len());
        for f in &self.fields {
            out.insert(f.name.clone(), row.remove(&f.name).unwrap_or(Value::Null));
        }
        Value::Object(out)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableInterfaces {
    pub create: Interface,
    pub update: Interface,
    pub read: Interface,
}

fn constraints(col: &ColumnDescriptor) -> FieldConstraints {
    FieldConstraints {
        max_length: match col.logical_type {
            LogicalType::Text => col.max_length,
            _ => None,
        },
        range: match col.integer_bounds() {
            (i64::MIN, i64::MAX) => None,
            bounds if col.logical_type == LogicalType::Integer => Some(bounds),
            _ => None,
        },
        allowed: match col.logical_type {
            LogicalType::Enum => col.allowed_values.clone(),
            _ => Vec::new(),
        },
        format: col.is_uuid().then_some(FieldFormat::Uuid),
    }
}

/// Derive the three interfaces of a table. Pure function of the descriptor.
pub fn synthesize(table: &TableDescriptor) -> TableInterfaces {
    let create_fields: Vec<FieldSpec> = table
        .columns
        .iter()
        .filter(|c| !c.server_generated)
        .map(|c| FieldSpec {
            name: c.name.clone(),
            logical_type: c.logical_type,
            required: !c.nullable && !c.has_default,
            nullable: c.nullable,
            constraints: constraints(c),
        })
        .collect();

    // Rows are addressed by key, so key columns are not updatable.
    let update_fields = create_fields
        .iter()
        .filter(|f| !table.primary_key.contains(&f.name))
        .cloned()
        .map(|f| FieldSpec { required: false, ..f })
        .collect();

    let read_fields = table
        .columns
        .iter()
        .map(|c| FieldSpec {
            name: c.name.clone(),
            logical_type: c.logical_type,
            required: true,
            nullable: c.nullable,
            constraints: constraints(c),
        })
        .collect();

    let named = |role: InterfaceRole, fields| Interface {
        name: format!("{}.{}", table.name, role.as_str()),
        role,
        fields,
    };

    TableInterfaces {
        create: named(InterfaceRole::Create, create_fields),
        update: named(InterfaceRole::Update, update_fields),
        read: named(InterfaceRole::Read, read_fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use serde_json::json;

    #[test]
    fn create_skips_generated_columns_and_requires_non_nullable_without_default() {
        let i = synthesize(&fixtures::users());
        assert!(i.create.field("id").is_none());
        assert!(i.create.field("email").unwrap().required);
        assert!(!i.create.field("status").unwrap().required);
        assert!(!i.create.field("manager_id").unwrap().required);
        assert_eq!(i.create.field("email").unwrap().constraints.max_length, Some(64));
        assert_eq!(i.create.name, "users.Create");
    }

    #[test]
    fn update_is_all_optional() {
        let i = synthesize(&fixtures::users());
        assert_eq!(i.update.fields.len(), i.create.fields.len());
        assert!(i.update.fields.iter().all(|f| !f.required));
    }

    #[test]
    fn update_leaves_out_key_columns() {
        let i = synthesize(&fixtures::comments());
        assert!(i.update.field("post_id").is_none());
        assert!(i.update.field("author_id").is_none());
        assert!(i.update.field("content").is_some());
        assert!(i.create.field("post_id").is_some());
    }

    #[test]
    fn integer_range_follows_the_native_width() {
        let i = synthesize(&fixtures::users());
        let range = i.create.field("manager_id").unwrap().constraints.range;
        assert_eq!(range, Some((i32::MIN as i64, i32::MAX as i64)));
        assert_eq!(i.create.field("email").unwrap().constraints.range, None);
    }

    #[test]
    fn read_has_every_column_with_true_nullability() {
        let i = synthesize(&fixtures::users());
        assert_eq!(i.read.fields.len(), 4);
        assert!(!i.read.field("id").unwrap().nullable);
        assert!(i.read.field("manager_id").unwrap().nullable);
    }

    #[test]
    fn composite_key_columns_are_required_on_create() {
        let i = synthesize(&fixtures::comments());
        assert!(i.create.field("post_id").unwrap().required);
        assert!(i.create.field("author_id").unwrap().required);
        assert!(!i.create.field("content").unwrap().required);
    }

    #[test]
    fn project_orders_fields_and_drops_extras() {
        let i = synthesize(&fixtures::comments());
        let row = json!({"content": "hi", "author_id": 1, "post_id": 3, "extra": true});
        let Value::Object(map) = row else { unreachable!() };
        let out = i.read.project(map);
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert!(!keys.contains(&"extra".to_string()));
        assert_eq!(out["post_id"], 3);
    }
}
