//! Parsed list parameters (filters, ordering, pagination) and primary-key tuples.

use crate::error::{AppError, FieldError};
use crate::schema::{Catalog, ColumnDescriptor, LogicalType, TableDescriptor};
use crate::service::RequestValidator;
use serde_json::Value;
use std::collections::BTreeMap;

pub const LIMIT_PARAM: &str = "limit";
pub const OFFSET_PARAM: &str = "offset";
pub const ORDER_BY_PARAM: &str = "order_by";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    IsNull,
}

impl FilterOp {
    pub fn from_suffix(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Ne,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "in" => FilterOp::In,
            "isnull" => FilterOp::IsNull,
            _ => return None,
        })
    }

    /// Comparison operator for the binary operators.
    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
            FilterOp::IsNull => "IS NULL",
        }
    }
}

/// `value` is an array for `In` and a boolean for `IsNull`.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterClause {
    pub op: FilterOp,
    pub value: Value,
}

/// What a filter applies to: a column of the table, or a column of the table one
/// foreign key away (matched through a subquery on the referenced key).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterTarget {
    Column(String),
    Related {
        column: String,
        referenced_table: String,
        referenced_column: String,
        remote_column: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub filters: BTreeMap<FilterTarget, Vec<FilterClause>>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: u64,
    pub offset: u64,
}

/// Server-side pagination bounds.
#[derive(Clone, Copy, Debug)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl QuerySpec {
    /// Parse raw query pairs for `table`. Unknown columns, operators and malformed values
    /// are all reported together as a validation error.
    pub fn parse(
        params: &[(String, String)],
        table: &TableDescriptor,
        catalog: &Catalog,
        limits: PageLimits,
    ) -> Result<Self, AppError> {
        let mut errors = Vec::new();
        let mut spec = QuerySpec {
            filters: BTreeMap::new(),
            order_by: Vec::new(),
            limit: limits.default_limit.min(limits.max_limit),
            offset: 0,
        };

        for (key, raw) in params {
            match key.as_str() {
                LIMIT_PARAM => match raw.parse::<u64>() {
                    Ok(n) => spec.limit = n.min(limits.max_limit),
                    Err(_) => errors.push(FieldError::new(key, "must be a non-negative integer")),
                },
                OFFSET_PARAM => match raw.parse::<u64>() {
                    Ok(n) => spec.offset = n,
                    Err(_) => errors.push(FieldError::new(key, "must be a non-negative integer")),
                },
                ORDER_BY_PARAM => parse_order_by(raw, table, &mut spec.order_by, &mut errors),
                _ => match parse_filter(key, raw, table, catalog) {
                    Ok((target, clause)) => spec.filters.entry(target).or_default().push(clause),
                    Err(message) => errors.push(FieldError::new(key, message)),
                },
            }
        }

        if errors.is_empty() {
            Ok(spec)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

fn parse_order_by(
    raw: &str,
    table: &TableDescriptor,
    order_by: &mut Vec<(String, SortDirection)>,
    errors: &mut Vec<FieldError>,
) {
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, direction) = match item.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (item.strip_prefix('+').unwrap_or(item), SortDirection::Asc),
        };
        let Some(col) = table.column(name) else {
            errors.push(FieldError::new(ORDER_BY_PARAM, format!("unknown column '{}'", name)));
            continue;
        };
        if !col.logical_type.is_orderable() {
            errors.push(FieldError::new(ORDER_BY_PARAM, format!("cannot order by '{}'", name)));
            continue;
        }
        if order_by.iter().all(|(c, _)| c != name) {
            order_by.push((name.to_string(), direction));
        }
    }
}

/// `column`, `column__op`, `fk_column.remote_column` or `fk_column.remote_column__op`.
fn parse_filter(
    key: &str,
    raw: &str,
    table: &TableDescriptor,
    catalog: &Catalog,
) -> Result<(FilterTarget, FilterClause), String> {
    let (path, op) = match key.rsplit_once("__") {
        Some((path, suffix)) => match FilterOp::from_suffix(suffix) {
            Some(op) => (path, op),
            None if table.column(key).is_some() => (key, FilterOp::Eq),
            None => return Err(format!("unknown filter operator '{}'", suffix)),
        },
        None => (key, FilterOp::Eq),
    };

    let (target, column) = match path.split_once('.') {
        Some((local, remote)) if table.column(path).is_none() => {
            let fk = table
                .foreign_key(local)
                .ok_or_else(|| format!("'{}' is not a foreign key column", local))?;
            let related = catalog
                .table(&fk.referenced_table)
                .ok_or_else(|| format!("related table '{}' is not exposed", fk.referenced_table))?;
            let remote_col = related
                .descriptor
                .column(remote)
                .ok_or_else(|| format!("unknown column '{}' on '{}'", remote, fk.referenced_table))?;
            let target = FilterTarget::Related {
                column: local.to_string(),
                referenced_table: fk.referenced_table.clone(),
                referenced_column: fk.referenced_column.clone(),
                remote_column: remote.to_string(),
            };
            (target, remote_col)
        }
        _ => {
            let col = table.column(path).ok_or_else(|| format!("unknown column '{}'", path))?;
            (FilterTarget::Column(path.to_string()), col)
        }
    };

    let value = match op {
        FilterOp::IsNull => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err("isnull takes true or false".into()),
        },
        FilterOp::Like => Value::String(raw.to_string()),
        FilterOp::In => {
            let items = raw
                .split(',')
                .map(|item| RequestValidator::coerce_text(column, item))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(items)
        }
        _ => {
            if column.logical_type == LogicalType::Opaque {
                return Err(format!("column '{}' only supports like and isnull filters", column.name));
            }
            RequestValidator::coerce_text(column, raw)?
        }
    };
    Ok((target, FilterClause { op, value }))
}

/// Typed primary-key values in declared key order.
pub type KeyTuple = Vec<(String, Value)>;

/// Split a path segment into the table's key columns. Composite keys are joined by
/// `delimiter` in declared order; single-column keys take the whole segment.
///
/// A part may itself contain the delimiter (uuids, negative integers, hyphenated text).
/// When the segment splits into more pieces than there are key columns, adjacent pieces
/// are rejoined and the first grouping in which every part parses as its column's type
/// wins. A part the column could never hold (too long, out of range) means no such row.
pub fn parse_key(table: &TableDescriptor, raw: &str, delimiter: &str) -> Result<KeyTuple, AppError> {
    let columns = table.key_columns();
    if columns.is_empty() {
        return Err(AppError::NotAllowed(format!("'{}' has no primary key", table.name)));
    }
    let parts: Vec<String> = if columns.len() == 1 {
        vec![raw.to_string()]
    } else {
        let pieces: Vec<&str> = raw.split(delimiter).collect();
        if pieces.len() == columns.len() {
            pieces.into_iter().map(str::to_string).collect()
        } else {
            group_pieces(&columns, &pieces, delimiter).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "key must have {} parts joined by '{}'",
                    columns.len(),
                    delimiter
                ))
            })?
        }
    };

    let mut key = Vec::with_capacity(columns.len());
    let mut errors = Vec::new();
    for (col, part) in columns.iter().zip(&parts) {
        match RequestValidator::parse_text(col, part) {
            Ok(v) => key.push((col.name.clone(), v)),
            Err(message) => errors.push(FieldError::new(&col.name, message)),
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    let out_of_bounds = columns
        .iter()
        .zip(&key)
        .any(|(col, (_, v))| RequestValidator::within_bounds(col, v).is_err());
    if out_of_bounds {
        return Err(AppError::NotFound(format!("{} ({})", table.name, parts.join(", "))));
    }
    Ok(key)
}

/// Assign contiguous runs of `pieces` to `columns`, shortest first, so that every run
/// parses as its column's type.
fn group_pieces(columns: &[&ColumnDescriptor], pieces: &[&str], delimiter: &str) -> Option<Vec<String>> {
    let (col, rest) = columns.split_first()?;
    if rest.is_empty() {
        let part = pieces.join(delimiter);
        return RequestValidator::parse_text(col, &part).is_ok().then(|| vec![part]);
    }
    // Leave at least one piece for every remaining column.
    for take in 1..=pieces.len().saturating_sub(rest.len()) {
        let part = pieces[..take].join(delimiter);
        if RequestValidator::parse_text(col, &part).is_err() {
            continue;
        }
        if let Some(mut tail) = group_pieces(rest, &pieces[take..], delimiter) {
            tail.insert(0, part);
            return Some(tail);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use serde_json::json;

    const LIMITS: PageLimits = PageLimits {
        default_limit: 100,
        max_limit: 1000,
    };

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn catalog() -> Catalog {
        Catalog::build("public", vec![fixtures::users(), fixtures::comments()])
    }

    #[test]
    fn parses_filters_sort_and_pagination() {
        let spec = QuerySpec::parse(
            &pairs(&[("status", "active"), ("id__gte", "2"), ("order_by", "-email,id"), ("limit", "10")]),
            &fixtures::users(),
            &catalog(),
            LIMITS,
        )
        .unwrap();
        assert_eq!(spec.limit, 10);
        assert_eq!(spec.offset, 0);
        assert_eq!(
            spec.order_by,
            vec![("email".to_string(), SortDirection::Desc), ("id".to_string(), SortDirection::Asc)]
        );
        let id = &spec.filters[&FilterTarget::Column("id".into())];
        assert_eq!(id, &vec![FilterClause { op: FilterOp::Gte, value: json!(2) }]);
    }

    #[test]
    fn repeated_keys_accumulate_on_the_same_target() {
        let spec = QuerySpec::parse(
            &pairs(&[("status", "active"), ("status", "pending")]),
            &fixtures::users(),
            &catalog(),
            LIMITS,
        )
        .unwrap();
        assert_eq!(spec.filters[&FilterTarget::Column("status".into())].len(), 2);
    }

    #[test]
    fn unknown_columns_are_rejected_not_ignored() {
        let err = QuerySpec::parse(&pairs(&[("nickname", "x")]), &fixtures::users(), &catalog(), LIMITS).unwrap_err();
        let AppError::Validation(errors) = err else { panic!("expected validation error") };
        assert_eq!(errors[0].field, "nickname");

        let err = QuerySpec::parse(&pairs(&[("order_by", "nickname")]), &fixtures::users(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = QuerySpec::parse(&pairs(&[("status__between", "a")]), &fixtures::users(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn limit_is_clamped_and_malformed_values_rejected() {
        let spec = QuerySpec::parse(&pairs(&[("limit", "5000")]), &fixtures::users(), &catalog(), LIMITS).unwrap();
        assert_eq!(spec.limit, 1000);
        let err = QuerySpec::parse(&pairs(&[("offset", "-1")]), &fixtures::users(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = QuerySpec::parse(&pairs(&[("id", "abc")]), &fixtures::users(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn in_and_isnull_values() {
        let spec = QuerySpec::parse(
            &pairs(&[("id__in", "1,2,3"), ("manager_id__isnull", "true")]),
            &fixtures::users(),
            &catalog(),
            LIMITS,
        )
        .unwrap();
        assert_eq!(spec.filters[&FilterTarget::Column("id".into())][0].value, json!([1, 2, 3]));
        assert_eq!(spec.filters[&FilterTarget::Column("manager_id".into())][0].value, json!(true));
    }

    #[test]
    fn relationship_filters_follow_one_foreign_key() {
        let spec = QuerySpec::parse(
            &pairs(&[("author_id.email__like", "%@x.com")]),
            &fixtures::comments(),
            &catalog(),
            LIMITS,
        )
        .unwrap();
        let (target, clauses) = spec.filters.iter().next().unwrap();
        assert_eq!(
            target,
            &FilterTarget::Related {
                column: "author_id".into(),
                referenced_table: "users".into(),
                referenced_column: "id".into(),
                remote_column: "email".into(),
            }
        );
        assert_eq!(clauses[0].op, FilterOp::Like);

        let err = QuerySpec::parse(&pairs(&[("content.id", "1")]), &fixtures::comments(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = QuerySpec::parse(&pairs(&[("author_id.nickname", "1")]), &fixtures::comments(), &catalog(), LIMITS);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn composite_keys_split_positionally() {
        let key = parse_key(&fixtures::comments(), "3-1", "-").unwrap();
        assert_eq!(key, vec![("post_id".to_string(), json!(3)), ("author_id".to_string(), json!(1))]);
        assert!(matches!(parse_key(&fixtures::comments(), "3", "-"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_key(&fixtures::comments(), "3-x", "-"), Err(AppError::Validation(_))));
    }

    #[test]
    fn single_keys_take_the_whole_segment() {
        let key = parse_key(&fixtures::users(), "42", "-").unwrap();
        assert_eq!(key, vec![("id".to_string(), json!(42))]);
        assert!(matches!(parse_key(&fixtures::audit_log(), "1", "-"), Err(AppError::NotAllowed(_))));
    }

    fn memberships() -> TableDescriptor {
        TableDescriptor {
            schema: "public".into(),
            name: "memberships".into(),
            kind: crate::schema::TableKind::Table,
            columns: vec![
                fixtures::column("org", LogicalType::Text, "uuid", false),
                fixtures::column("n", LogicalType::Integer, "integer", false),
            ],
            primary_key: vec!["org".into(), "n".into()],
            foreign_keys: Vec::new(),
            unique: Vec::new(),
        }
    }

    #[test]
    fn key_parts_may_contain_the_delimiter() {
        let key = parse_key(&memberships(), "6f1c2d1e-0000-4000-8000-000000000001-1", "-").unwrap();
        assert_eq!(
            key,
            vec![
                ("org".to_string(), json!("6f1c2d1e-0000-4000-8000-000000000001")),
                ("n".to_string(), json!(1)),
            ]
        );

        let key = parse_key(&fixtures::comments(), "3--1", "-").unwrap();
        assert_eq!(key[1], ("author_id".to_string(), json!(-1)));

        let mut slugs = memberships();
        slugs.columns[0] = fixtures::column("org", LogicalType::Text, "text", false);
        let key = parse_key(&slugs, "acme-west-2", "-").unwrap();
        assert_eq!(key[0], ("org".to_string(), json!("acme-west")));
        assert_eq!(key[1], ("n".to_string(), json!(2)));

        assert!(matches!(parse_key(&memberships(), "not-a-uuid-1", "-"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn keys_the_column_cannot_hold_are_not_found() {
        let mut codes = fixtures::audit_log();
        let mut code = fixtures::column("code", LogicalType::Text, "character varying(3)", false);
        code.cast_type = "character varying".into();
        code.max_length = Some(3);
        codes.columns = vec![code];
        codes.primary_key = vec!["code".into()];
        assert!(parse_key(&codes, "ABC", "-").is_ok());
        assert!(matches!(parse_key(&codes, "ABCXYZ", "-"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_key(&fixtures::users(), "99999999999", "-"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn filters_beyond_the_column_width_are_rejected() {
        let long = "a".repeat(65);
        let params = pairs(&[("email", long.as_str()), ("id", "99999999999"), ("manager_id__in", "1,3000000000")]);
        let Err(AppError::Validation(errors)) = QuerySpec::parse(&params, &fixtures::users(), &catalog(), LIMITS)
        else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "id", "manager_id__in"]);
    }
}
