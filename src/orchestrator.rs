use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::flatten::{decode_orders, flatten};
use crate::rows::RowSet;
use crate::shopify::{PageTransport, ShopifyClient};
use crate::sync::{SyncReport, TableSynchronizer};
use crate::warehouse::TableStore;

pub const ORDERS_TABLE: &str = "orders";
pub const LINE_ITEMS_TABLE: &str = "line_items";
pub const CUSTOMERS_TABLE: &str = "customers";

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    pub tables: Vec<SyncReport>,
}

impl RunSummary {
    pub fn inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// One full pass: fetch every order, flatten, then sync orders, line items
/// and customers in that order. Tables are independent: a table that cannot
/// be read or written is reported and the next one still runs.
pub async fn run_once<T, S>(
    cfg: &SyncConfig,
    client: &ShopifyClient<T>,
    store: &S,
) -> Result<RunSummary>
where
    T: PageTransport,
    S: TableStore + ?Sized,
{
    let started_at = Utc::now();
    let raw = client.fetch_all("orders").await?;
    let mut summary = RunSummary {
        started_at,
        fetched: raw.len(),
        tables: Vec::new(),
    };
    if raw.is_empty() {
        info!("no orders found");
        return Ok(summary);
    }

    let orders = decode_orders(raw);
    let sets = flatten(&orders);
    let plan: [(&RowSet, &str, &str); 3] = [
        (&sets.orders, ORDERS_TABLE, "order_id"),
        (&sets.line_items, LINE_ITEMS_TABLE, cfg.line_item_key.as_str()),
        (&sets.customers, CUSTOMERS_TABLE, "customer_id"),
    ];

    let sync = TableSynchronizer::new(store, cfg.column_policy);
    for (rows, table, key) in plan {
        let report = sync.sync(rows, table, key).await;
        summary.tables.push(report);
    }

    for t in &summary.tables {
        info!(
            table = %t.table,
            candidates = t.candidates,
            inserted = t.inserted,
            skipped_existing = t.skipped_existing,
            failed = t.error.is_some(),
            "table summary"
        );
    }
    let failed = summary.failed_tables();
    if !failed.is_empty() {
        warn!(tables = ?failed, "run finished with failed tables");
    }
    Ok(summary)
}

/// Repeat [`run_once`] every `cfg.interval()`; a failed run is logged and the
/// next one still happens. Runs once when no interval is configured.
pub async fn run_forever<T, S>(cfg: &SyncConfig, client: &ShopifyClient<T>, store: &S) -> Result<()>
where
    T: PageTransport,
    S: TableStore + ?Sized,
{
    let Some(every) = cfg.interval() else {
        run_once(cfg, client, store).await?;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match run_once(cfg, client, store).await {
            Ok(s) => info!(inserted = s.inserted(), fetched = s.fetched, "sync run done"),
            Err(e) => error!(error = %e, "sync run failed"),
        }
    }
}
