//! Relational targets for the synchronizer.
//!
//! `TableStore` is the seam; Postgres is the production warehouse and SQLite
//! covers local runs. The backend is picked from the connection string scheme.
pub mod postgres;
pub mod sql;
pub mod sqlite;
pub mod store;

use anyhow::Result;

pub use postgres::PgTableStore;
pub use sqlite::SqliteTableStore;
pub use store::TableStore;

use crate::config::SyncConfig;

/// Open the warehouse named by `cfg.database_url`.
pub async fn connect(cfg: &SyncConfig) -> Result<Box<dyn TableStore>> {
    let url = cfg.database_url.trim();
    if url.starts_with("sqlite:") {
        Ok(Box::new(
            SqliteTableStore::connect(url, cfg.max_connections).await?,
        ))
    } else {
        Ok(Box::new(PgTableStore::connect(url, cfg.max_connections).await?))
    }
}
