//! Insert-only table synchronization.
//!
//! A sync is three steps over one table:
//!   read_state -> existing keys and columns
//!   plan       -> pure set-difference on the key column, then column projection
//!   write      -> append the planned rows
//!
//! A failure in either I/O step is logged and lands in the report; one table
//! never stops the next.
//!
//! Nothing locks the table between read and write: two concurrent runs can
//! both insert the same new keys.
use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::ColumnPolicy;
use crate::rows::{key_text, RowSet};
use crate::warehouse::TableStore;

/// What the target table looked like before the write.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    pub exists: bool,
    pub keys: HashSet<String>,
    pub columns: Vec<String>,
}

impl TableState {
    /// New tables and tables without rows accept every input column.
    fn accepts_all_columns(&self) -> bool {
        !self.exists || self.keys.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub rows: RowSet,
    pub skipped_existing: usize,
    pub skipped_null_key: usize,
    pub dropped_columns: Vec<String>,
}

/// Outcome of one table sync. `inserted` is the only count that reflects
/// what reached the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub table: String,
    pub key_column: String,
    pub candidates: usize,
    pub inserted: u64,
    pub skipped_existing: usize,
    pub skipped_null_key: usize,
    pub dropped_columns: Vec<String>,
    pub error: Option<String>,
}

pub struct TableSynchronizer<'a, S: ?Sized> {
    store: &'a S,
    policy: ColumnPolicy,
}

impl<'a, S: TableStore + ?Sized> TableSynchronizer<'a, S> {
    pub fn new(store: &'a S, policy: ColumnPolicy) -> Self {
        Self { store, policy }
    }

    /// Fails when the table exists without `key_column`: its keys cannot be
    /// read, so every input row would look new.
    pub async fn read_state(&self, table: &str, key_column: &str) -> Result<TableState> {
        if !self.store.table_exists(table).await? {
            return Ok(TableState::default());
        }
        let columns = self.store.table_columns(table).await?;
        if !columns.iter().any(|c| c == key_column) {
            bail!("table {table:?} has no key column {key_column:?}");
        }
        Ok(TableState {
            exists: true,
            keys: self.store.existing_keys(table, key_column).await?,
            columns,
        })
    }

    /// Rows of `rows` whose key is not in `state.keys`, input order kept,
    /// then projected onto the table's columns per policy.
    pub fn plan(&self, rows: &RowSet, key_column: &str, state: &TableState) -> SyncPlan {
        let mut skipped_existing = 0usize;
        let mut skipped_null_key = 0usize;
        let mut fresh = rows.filter(|row| match key_text(RowSet::cell(row, key_column)) {
            Some(k) if state.keys.contains(&k) => {
                skipped_existing += 1;
                false
            }
            Some(_) => true,
            None => {
                skipped_null_key += 1;
                false
            }
        });

        let dropped_columns =
            if self.policy == ColumnPolicy::Project && !state.accepts_all_columns() {
                let mut known: HashSet<String> = state.columns.iter().cloned().collect();
                known.insert(key_column.to_string());
                fresh.retain_columns(&known)
            } else {
                Vec::new()
            };

        SyncPlan {
            rows: fresh,
            skipped_existing,
            skipped_null_key,
            dropped_columns,
        }
    }

    /// Append the planned rows. Never fails: store errors land in the report.
    pub async fn write(&self, table: &str, plan: &SyncPlan) -> std::result::Result<u64, String> {
        if plan.rows.is_empty() {
            return Ok(0);
        }
        self.store
            .append(table, &plan.rows)
            .await
            .map_err(|e| format!("{e:#}"))
    }

    #[instrument(skip(self, rows), fields(store = self.store.name(), candidates = rows.len()))]
    pub async fn sync(&self, rows: &RowSet, table: &str, key_column: &str) -> SyncReport {
        let mut report = SyncReport {
            table: table.to_string(),
            key_column: key_column.to_string(),
            candidates: rows.len(),
            ..Default::default()
        };
        if !rows.columns().iter().any(|c| c == key_column) {
            warn!(table, key_column, "key column not among input columns; nothing can be keyed");
        }

        let state = match self.read_state(table, key_column).await {
            Ok(state) => state,
            Err(e) => {
                let e = format!("{e:#}");
                error!(table, error = %e, "reading table state failed; table skipped for this run");
                report.error = Some(e);
                return report;
            }
        };
        let plan = self.plan(rows, key_column, &state);
        report.skipped_existing = plan.skipped_existing;
        report.skipped_null_key = plan.skipped_null_key;
        report.dropped_columns = plan.dropped_columns.clone();

        if plan.skipped_null_key > 0 {
            warn!(table, count = plan.skipped_null_key, "rows without a key value skipped");
        }
        if !plan.dropped_columns.is_empty() {
            warn!(
                table,
                columns = ?plan.dropped_columns,
                "input columns missing from table were dropped"
            );
        }
        if plan.rows.is_empty() {
            info!(table, "no new rows");
            return report;
        }

        match self.write(table, &plan).await {
            Ok(n) => {
                report.inserted = n;
                info!(table, inserted = n, "new rows added");
            }
            Err(e) => {
                error!(table, error = %e, "write failed; table skipped for this run");
                report.error = Some(e);
            }
        }
        report
    }
}
