//! Dialect-neutral SQL helpers shared by the store implementations.
use serde_json::Value;

use crate::rows::RowSet;

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Storage class of a column, inferred from the non-null values in a row-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnKind {
    /// Mixed or nested values fall back to text; an all-null column is text.
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut kind: Option<ColumnKind> = None;
        for v in values {
            let this = match v {
                Value::Null => continue,
                Value::Bool(_) => ColumnKind::Boolean,
                Value::Number(n) if n.is_i64() => ColumnKind::Integer,
                Value::Number(_) => ColumnKind::Float,
                _ => return ColumnKind::Text,
            };
            kind = Some(match (kind, this) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(ColumnKind::Integer), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
                _ => return ColumnKind::Text,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }

    pub fn postgres_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "BIGINT",
            ColumnKind::Float => "DOUBLE PRECISION",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Text => "TEXT",
        }
    }

    pub fn sqlite_type(self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Float => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    /// Kind for a declared column type (`format_type` on Postgres, the
    /// declared type on SQLite). Anything unrecognized binds as text.
    pub fn from_declared(declared: &str) -> Self {
        match base_type(declared).as_str() {
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" => {
                ColumnKind::Integer
            }
            "double precision" | "real" | "float" | "float4" | "float8" | "double" => {
                ColumnKind::Float
            }
            "boolean" | "bool" => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }
}

/// `character varying(255)` -> `character varying`
fn base_type(declared: &str) -> String {
    declared
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_text_type(declared: &str) -> bool {
    matches!(
        base_type(declared).as_str(),
        "" | "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name"
    )
}

/// How one input column is bound in an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct BindColumn {
    pub name: String,
    pub kind: ColumnKind,
    /// Declared type to cast a text bind to, for existing non-text columns
    /// (`numeric`, `timestamptz`, `jsonb`, ...).
    pub cast: Option<String>,
}

/// Resolve bind kinds for `rows`. Columns the table already declares take
/// the declared type, so an all-null batch still binds with the column's
/// type; the rest are inferred from the batch.
pub fn bind_columns(rows: &RowSet, declared: &[(String, String)]) -> Vec<BindColumn> {
    rows.columns()
        .iter()
        .map(|c| match declared.iter().find(|(name, _)| name == c) {
            Some((_, ty)) => {
                let kind = ColumnKind::from_declared(ty);
                let cast = (kind == ColumnKind::Text && !is_text_type(ty)).then(|| ty.clone());
                BindColumn {
                    name: c.clone(),
                    kind,
                    cast,
                }
            }
            None => BindColumn {
                name: c.clone(),
                kind: ColumnKind::infer(rows.rows().iter().map(|r| RowSet::cell(r, c))),
                cast: None,
            },
        })
        .collect()
}

/// A cell coerced to its column's kind, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Integer(Option<i64>),
    Float(Option<f64>),
    Boolean(Option<bool>),
    Text(Option<String>),
}

impl Cell {
    pub fn coerce(kind: ColumnKind, value: &Value) -> Self {
        match kind {
            ColumnKind::Integer => Cell::Integer(match value {
                Value::Bool(b) => Some(i64::from(*b)),
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_i64(),
            }),
            ColumnKind::Float => Cell::Float(match value {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_f64(),
            }),
            ColumnKind::Boolean => Cell::Boolean(value.as_bool()),
            ColumnKind::Text => Cell::Text(match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
        }
    }
}

pub fn create_table_sql<F>(table: &str, columns: &[BindColumn], type_name: F) -> String
where
    F: Fn(ColumnKind) -> &'static str,
{
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), type_name(c.kind)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        cols.join(", ")
    )
}

/// `INSERT INTO "t" ("a", "b") ` — the VALUES list is appended by the caller.
pub fn insert_prefix(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("INSERT INTO {} ({}) ", quote_ident(table), cols.join(", "))
}

/// Rows per INSERT so a statement stays under `max_params` bind parameters.
pub fn rows_per_chunk(columns: usize, max_params: usize) -> usize {
    (max_params / columns.max(1)).max(1)
}
