use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Postgres, QueryBuilder,
};
use tracing::{debug, info, instrument};

use super::sql::{self, Cell, ColumnKind};
use super::store::TableStore;
use crate::rows::RowSet;

// Postgres wire protocol caps bind parameters per statement at u16::MAX.
const PG_MAX_PARAMS: usize = 65_535;

#[derive(Clone)]
pub struct PgTableStore {
    pub pool: PgPool,
}

impl PgTableStore {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)
            .context("invalid Postgres connection string")?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        // Hosted poolers (Neon, PgBouncer txn mode) reject named prepared statements.
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    let _ = sqlx::query("SET application_name = 'shop_sync'")
                        .persistent(false)
                        .execute(conn)
                        .await;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .context("connecting to Postgres warehouse")?;
        info!("connected to db");
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl TableStore for PgTableStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        // to_regclass resolves through search_path, the same way the
        // unqualified INSERT will.
        let visible: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .persistent(false)
            .bind(sql::quote_ident(table))
            .fetch_one(&self.pool)
            .await?;
        Ok(visible)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let cols: Vec<String> = sqlx::query_scalar(
            r#"SELECT a.attname::text
               FROM pg_attribute a
               WHERE a.attrelid = to_regclass($1)
                 AND a.attnum > 0
                 AND NOT a.attisdropped
               ORDER BY a.attnum"#,
        )
        .persistent(false)
        .bind(sql::quote_ident(table))
        .fetch_all(&self.pool)
        .await?;
        Ok(cols)
    }

    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>> {
        let key = sql::quote_ident(key_column);
        let stmt = format!(
            "SELECT DISTINCT {key}::text FROM {} WHERE {key} IS NOT NULL",
            sql::quote_ident(table)
        );
        let keys: Vec<String> = sqlx::query_scalar(&stmt)
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        Ok(keys.into_iter().collect())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn append(&self, table: &str, rows: &RowSet) -> Result<u64> {
        if rows.is_empty() || rows.columns().is_empty() {
            return Ok(0);
        }
        let columns = rows.columns().to_vec();

        let mut tx = self.pool.begin().await?;
        // Existing columns bind with their declared type; an untyped batch
        // (all nulls) must not be sent as text into a bigint column.
        let declared: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
               FROM pg_attribute a
               WHERE a.attrelid = to_regclass($1)
                 AND a.attnum > 0
                 AND NOT a.attisdropped
               ORDER BY a.attnum"#,
        )
        .persistent(false)
        .bind(sql::quote_ident(table))
        .fetch_all(&mut *tx)
        .await?;
        let binds = sql::bind_columns(rows, &declared);
        if declared.is_empty() {
            let ddl = sql::create_table_sql(table, &binds, ColumnKind::postgres_type);
            sqlx::query(&ddl).persistent(false).execute(&mut *tx).await?;
        }

        let mut written = 0u64;
        for part in rows.rows().chunks(sql::rows_per_chunk(columns.len(), PG_MAX_PARAMS)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(sql::insert_prefix(table, &columns));
            qb.push_values(part, |mut b, row| {
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
                            if let Some(ty) = &col.cast {
                                b.push_unseparated(format!("::{ty}"));
                            }
                        }
                    }
                }
            });
            let res = qb.build().persistent(false).execute(&mut *tx).await?;
            written += res.rows_affected();
            debug!(chunk = part.len(), "chunk inserted");
        }
        tx.commit().await?;
        Ok(written)
    }
}

// Needs a scratch database: TEST_DATABASE_URL=postgres://... cargo test.
// Skipped when unset.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnPolicy;
    use crate::sync::TableSynchronizer;
    use serde_json::{json, Value};

    async fn scratch(table: &str) -> Option<PgTableStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PgTableStore::connect(&url, 2).await.expect("connect to TEST_DATABASE_URL");
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", sql::quote_ident(table)))
            .persistent(false)
            .execute(&store.pool)
            .await
            .unwrap();
        Some(store)
    }

    async fn drop_table(store: &PgTableStore, table: &str) {
        let _ = sqlx::query(&format!("DROP TABLE IF EXISTS {}", sql::quote_ident(table)))
            .persistent(false)
            .execute(&store.pool)
            .await;
    }

    fn items(rows: &[(i64, Value)]) -> RowSet {
        let mut set = RowSet::new(["line_item_id", "product_id", "price"]);
        for (id, product) in rows {
            set.push(
                [
                    ("line_item_id".to_string(), json!(id)),
                    ("product_id".to_string(), product.clone()),
                    ("price".to_string(), json!("12.00")),
                ]
                .into_iter()
                .collect(),
            );
        }
        set
    }

    #[tokio::test]
    async fn append_creates_table_and_reads_back() {
        let table = "shop_sync_t_create";
        let Some(store) = scratch(table).await else {
            return;
        };
        assert!(!store.table_exists(table).await.unwrap());

        let n = store.append(table, &items(&[(1, json!(100)), (2, json!(200))])).await.unwrap();
        assert_eq!(n, 2);
        assert!(store.table_exists(table).await.unwrap());
        assert_eq!(
            store.table_columns(table).await.unwrap(),
            vec!["line_item_id", "product_id", "price"]
        );
        let keys = store.existing_keys(table, "line_item_id").await.unwrap();
        let expected: HashSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keys, expected);
        drop_table(&store, table).await;
    }

    #[tokio::test]
    async fn all_null_batch_binds_with_declared_type() {
        let table = "shop_sync_t_nulls";
        let Some(store) = scratch(table).await else {
            return;
        };
        store.append(table, &items(&[(1, json!(100)), (2, json!(200))])).await.unwrap();
        let n = store.append(table, &items(&[(3, Value::Null)])).await.unwrap();
        assert_eq!(n, 1);
        drop_table(&store, table).await;
    }

    #[tokio::test]
    async fn text_values_cast_into_typed_columns() {
        let table = "shop_sync_t_cast";
        let Some(store) = scratch(table).await else {
            return;
        };
        sqlx::query(&format!(
            "CREATE TABLE {} (line_item_id BIGINT, product_id BIGINT, price NUMERIC(10,2))",
            sql::quote_ident(table)
        ))
        .persistent(false)
        .execute(&store.pool)
        .await
        .unwrap();

        assert_eq!(store.append(table, &items(&[(1, Value::Null)])).await.unwrap(), 1);
        let price: String =
            sqlx::query_scalar(&format!("SELECT price::text FROM {}", sql::quote_ident(table)))
                .persistent(false)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(price, "12.00");
        drop_table(&store, table).await;
    }

    #[tokio::test]
    async fn only_unseen_keys_are_inserted() {
        let table = "shop_sync_t_scenario";
        let Some(store) = scratch(table).await else {
            return;
        };
        let sync = TableSynchronizer::new(&store, ColumnPolicy::Project);
        let batch = |ids: &[i64]| items(&ids.iter().map(|i| (*i, json!(i * 100))).collect::<Vec<_>>());

        assert_eq!(sync.sync(&batch(&[1, 2, 3]), table, "line_item_id").await.inserted, 3);
        let report = sync.sync(&batch(&[2, 3, 4, 5]), table, "line_item_id").await;
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_existing, 2);
        assert_eq!(sync.sync(&batch(&[2, 3, 4, 5]), table, "line_item_id").await.inserted, 0);
        drop_table(&store, table).await;
    }
}
