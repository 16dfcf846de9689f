//! Reflected schema model: tables, columns and keys as reported by the catalog.

use serde::Serialize;

/// Reduced type vocabulary every native column type is mapped onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Float,
    Decimal,
    Text,
    Boolean,
    DateTime,
    Binary,
    Enum,
    /// Native type with no closer match (json, arrays, ranges, network types).
    Opaque,
}

impl LogicalType {
    /// Map a PostgreSQL type (`pg_type.typname` plus `typtype`) onto a logical type.
    pub fn from_pg(udt_name: &str, type_kind: &str) -> Self {
        if type_kind == "e" {
            return LogicalType::Enum;
        }
        match udt_name {
            "int2" | "int4" | "int8" | "oid" => LogicalType::Integer,
            "float4" | "float8" => LogicalType::Float,
            "numeric" => LogicalType::Decimal,
            "text" | "varchar" | "bpchar" | "char" | "name" | "citext" | "uuid" => LogicalType::Text,
            "bool" => LogicalType::Boolean,
            "date" | "time" | "timetz" | "timestamp" | "timestamptz" => LogicalType::DateTime,
            "bytea" => LogicalType::Binary,
            _ => LogicalType::Opaque,
        }
    }

    /// Whether PostgreSQL can order by values of this type without surprises.
    pub fn is_orderable(self) -> bool {
        !matches!(self, LogicalType::Opaque)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    /// Catalog type name with modifiers (`format_type`), as declared.
    pub native_type: String,
    /// The type placeholders are cast to: `native_type` without length, precision or
    /// scale, and the base type for domains. `varchar(3)` becomes `character varying`.
    #[serde(skip)]
    pub cast_type: String,
    pub nullable: bool,
    /// Any column default, including server-generated ones.
    pub has_default: bool,
    /// Identity, serial (`nextval`) or generated column: never written by clients on create.
    pub server_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl ColumnDescriptor {
    pub fn is_uuid(&self) -> bool {
        self.native_type == "uuid"
    }

    /// Value range of an integer column's native width.
    pub fn integer_bounds(&self) -> (i64, i64) {
        match self.cast_type.as_str() {
            "smallint" => (i16::MIN.into(), i16::MAX.into()),
            "integer" => (i32::MIN.into(), i32::MAX.into()),
            "oid" => (0, u32::MAX.into()),
            _ => (i64::MIN, i64::MAX),
        }
    }

    /// `json` or `jsonb`: values travel as JSON documents rather than text.
    pub fn is_json(&self) -> bool {
        self.logical_type == LogicalType::Opaque && self.native_type.starts_with("json")
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn is_writable(&self) -> bool {
        self.kind == TableKind::Table
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyDescriptor> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Primary-key columns in declared order. Caller checks `has_primary_key` first.
    pub fn key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.primary_key.iter().filter_map(|k| self.column(k)).collect()
    }

    /// Every primary-key column is present in the column list.
    pub fn key_is_consistent(&self) -> bool {
        self.primary_key.iter().all(|k| self.column(k).is_some())
    }
}
