//! Tabular row-sets built from nested API records.
//!
//! A [`RowSet`] owns an ordered column list; every row is an [`IndexMap`]
//! whose keys follow that order. Missing cells read as JSON null.
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, normalizing it to this set's column order.
    /// Cells for unknown columns are discarded; absent cells become null.
    pub fn push(&mut self, mut row: Row) {
        let normalized: Row = self
            .columns
            .iter()
            .map(|c| (c.clone(), row.swap_remove(c).unwrap_or(Value::Null)))
            .collect();
        self.rows.push(normalized);
    }

    /// Cell accessor; null when the column is unknown.
    pub fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
        static NULL: Value = Value::Null;
        row.get(column).unwrap_or(&NULL)
    }

    /// Keep rows for which `keep` returns true, preserving order.
    pub fn filter<F>(&self, mut keep: F) -> RowSet
    where
        F: FnMut(&Row) -> bool,
    {
        RowSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(*r)).cloned().collect(),
        }
    }

    /// Restrict the set to `keep` columns (original order kept).
    /// Returns the names of the columns that were dropped.
    pub fn retain_columns(&mut self, keep: &HashSet<String>) -> Vec<String> {
        let dropped: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !keep.contains(*c))
            .cloned()
            .collect();
        if dropped.is_empty() {
            return dropped;
        }
        self.columns.retain(|c| keep.contains(c));
        for row in &mut self.rows {
            row.retain(|k, _| keep.contains(k));
        }
        dropped
    }

    /// Drop rows whose `column` value was already seen; first occurrence wins.
    /// Rows with a null key are kept as-is.
    pub fn dedup_by(&mut self, column: &str) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| match key_text(Self::cell(row, column)) {
            Some(k) => seen.insert(k),
            None => true,
        });
    }
}

/// Text form of a key cell, matching how stores render keys with
/// `CAST(col AS TEXT)`. Null and nested values have no key.
pub fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        (f as i64).to_string()
                    } else {
                        f.to_string()
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn push_normalizes_column_order_and_fills_nulls() {
        let mut set = RowSet::new(["id", "name", "email"]);
        set.push(row(&[("email", json!("a@x")), ("id", json!(1)), ("extra", json!(true))]));
        let got: Vec<&String> = set.rows()[0].keys().collect();
        assert_eq!(got, ["id", "name", "email"]);
        assert_eq!(set.rows()[0]["name"], Value::Null);
        assert!(!set.rows()[0].contains_key("extra"));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut set = RowSet::new(["customer_id", "email"]);
        set.push(row(&[("customer_id", json!(7)), ("email", json!("first"))]));
        set.push(row(&[("customer_id", json!(8)), ("email", json!("other"))]));
        set.push(row(&[("customer_id", json!(7)), ("email", json!("second"))]));
        set.dedup_by("customer_id");
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0]["email"], json!("first"));
    }

    #[test]
    fn retain_columns_reports_dropped() {
        let mut set = RowSet::new(["a", "b", "c"]);
        set.push(row(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]));
        let keep: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let dropped = set.retain_columns(&keep);
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(set.columns(), ["a", "c"]);
        assert!(!set.rows()[0].contains_key("b"));
    }

    #[test]
    fn key_text_matches_sql_text_casts() {
        assert_eq!(key_text(&json!(5)), Some("5".into()));
        assert_eq!(key_text(&json!(5.0)), Some("5".into()));
        assert_eq!(key_text(&json!("abc")), Some("abc".into()));
        assert_eq!(key_text(&json!(5_000_000_000_u64)), Some("5000000000".into()));
        assert_eq!(key_text(&Value::Null), None);
    }
}
