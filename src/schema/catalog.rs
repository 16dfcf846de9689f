//! Per-table lookup table built once after reflection and shared read-only afterwards.

use crate::interface::{synthesize, TableInterfaces};
use crate::schema::types::TableDescriptor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a request against one table needs: its descriptor, the cached
/// interfaces and the URL segment it is served under.
#[derive(Debug)]
pub struct TableEntry {
    pub descriptor: TableDescriptor,
    pub interfaces: TableInterfaces,
    pub segment: String,
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub schema: String,
    tables: BTreeMap<String, Arc<TableEntry>>,
}

impl Catalog {
    /// Synthesize interfaces for every descriptor. Tables whose name yields no usable
    /// path segment are skipped with a warning.
    pub fn build(schema: impl Into<String>, tables: Vec<TableDescriptor>) -> Self {
        let mut by_name = BTreeMap::new();
        for descriptor in tables {
            let segment = path_segment(&descriptor.name);
            if segment.is_empty() {
                tracing::warn!(table = %descriptor.name, "skipping table with no usable path segment");
                continue;
            }
            let interfaces = synthesize(&descriptor);
            by_name.insert(
                descriptor.name.clone(),
                Arc::new(TableEntry {
                    descriptor,
                    interfaces,
                    segment,
                }),
            );
        }
        Catalog {
            schema: schema.into(),
            tables: by_name,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableEntry>> {
        self.tables.get(name)
    }

    /// Entries ordered by table name.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<TableEntry>> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// URL segment for a table: lowercased, anything outside `[a-z0-9_-]` replaced by `_`.
pub fn path_segment(table_name: &str) -> String {
    let segment: String = table_name
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if segment.chars().all(|c| c == '_') {
        return String::new();
    }
    segment
}
