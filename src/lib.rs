//! Incremental Shopify order sync into a relational warehouse.
//!
//! Orders are fetched page by page from the Admin REST API, flattened into
//! `orders`, `line_items` and `customers` row-sets, and appended to the
//! warehouse without touching rows whose key is already there.
pub mod config;
pub mod flatten;
pub mod logging;
pub mod orchestrator;
pub mod rows;
pub mod shopify;
pub mod sync;
pub mod warehouse;

pub mod util {
    pub mod env;
}

pub use config::{ColumnPolicy, SyncConfig};
pub use orchestrator::{run_forever, run_once, RunSummary};
pub use sync::{SyncReport, TableSynchronizer};
