use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use tracing::{info, instrument};

use super::sql::{self, Cell, ColumnKind};
use super::store::TableStore;
use crate::rows::RowSet;

// SQLITE_MAX_VARIABLE_NUMBER on older builds.
const SQLITE_MAX_PARAMS: usize = 999;

/// Local SQLite warehouse, selected by a `sqlite:` connection string.
#[derive(Clone)]
pub struct SqliteTableStore {
    pub pool: SqlitePool,
}

impl SqliteTableStore {
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid SQLite connection string")?
            .create_if_missing(true);

        // Every connection to an in-memory database is its own database.
        let max = if in_memory { 1 } else { max_connections.max(1) };
        let mut pool_options = SqlitePoolOptions::new().max_connections(max);
        if in_memory {
            pool_options = pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .context("opening SQLite warehouse")?;
        info!(in_memory, "connected to sqlite");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn memory() -> Self {
        Self::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite")
    }
}

#[async_trait::async_trait]
impl TableStore for SqliteTableStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(table)
                .fetch_one(&self.pool)
                .await?;
        Ok(n > 0)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let cols: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;
        Ok(cols)
    }

    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>> {
        let key = sql::quote_ident(key_column);
        // Integral REAL keys render as `5`, like Postgres' float8::text and
        // rows::key_text; plain CAST would give `5.0`.
        let stmt = format!(
            "SELECT DISTINCT CASE \
                 WHEN typeof({key}) = 'real' AND {key} = CAST({key} AS INTEGER) \
                 THEN CAST(CAST({key} AS INTEGER) AS TEXT) \
                 ELSE CAST({key} AS TEXT) END \
             FROM {} WHERE {key} IS NOT NULL",
            sql::quote_ident(table)
        );
        let keys: Vec<String> = sqlx::query_scalar(&stmt).fetch_all(&self.pool).await?;
        Ok(keys.into_iter().collect())
    }

    async fn append(&self, table: &str, rows: &RowSet) -> Result<u64> {
        if rows.is_empty() || rows.columns().is_empty() {
            return Ok(0);
        }
        let columns = rows.columns().to_vec();

        let mut tx = self.pool.begin().await?;
        let declared: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
                .bind(table)
                .fetch_all(&mut *tx)
                .await?;
        let binds = sql::bind_columns(rows, &declared);
        if declared.is_empty() {
            let ddl = sql::create_table_sql(table, &binds, ColumnKind::sqlite_type);
            sqlx::query(&ddl).execute(&mut *tx).await?;
        }

        let mut written = 0u64;
        for part in rows.rows().chunks(sql::rows_per_chunk(columns.len(), SQLITE_MAX_PARAMS)) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(sql::insert_prefix(table, &columns));
            qb.push_values(part, |mut b, row| {
                // SQLite converts by column affinity; no casts needed.
                for col in &binds {
                    match Cell::coerce(col.kind, RowSet::cell(row, &col.name)) {
                        Cell::Integer(v) => {
                            b.push_bind(v);
                        }
                        Cell::Float(v) => {
                            b.push_bind(v);
                        }
                        Cell::Boolean(v) => {
                            b.push_bind(v);
                        }
                        Cell::Text(v) => {
                            b.push_bind(v);
                        }
                    }
                }
            });
            written += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }
}
