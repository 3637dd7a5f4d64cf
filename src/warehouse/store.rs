use std::collections::HashSet;

use anyhow::Result;

use crate::rows::RowSet;

/// The operations the synchronizer needs from a relational target.
///
/// Keys are compared as text (`CAST(key AS TEXT)` on the store side,
/// [`crate::rows::key_text`] on the row side).
#[async_trait::async_trait]
pub trait TableStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names of an existing table, in table order.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Distinct non-null values of `key_column`.
    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>>;

    /// Append all rows in one transaction, creating the table first when it
    /// does not exist. Returns the number of rows written.
    async fn append(&self, table: &str, rows: &RowSet) -> Result<u64>;
}
