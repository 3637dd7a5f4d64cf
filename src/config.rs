use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::util::env as envutil;

/// Shopify caps REST page size at 250.
pub const PAGE_SIZE: u32 = 250;
pub const DEFAULT_API_VERSION: &str = "2023-10";

/// What the synchronizer does with input columns the target table lacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColumnPolicy {
    /// Drop unknown columns when the table already holds rows.
    #[default]
    Project,
    /// Send every input column; schema drift surfaces as an insert error.
    PassThrough,
}

impl ColumnPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" | "projection" | "intersect" => Some(Self::Project),
            "passthrough" | "pass-through" | "all" | "none" => Some(Self::PassThrough),
            _ => None,
        }
    }
}

/// Process configuration, built once at start and passed by reference.
#[derive(Clone)]
pub struct SyncConfig {
    /// Shop host, e.g. `demo.myshopify.com`.
    pub shop: String,
    pub access_token: String,
    pub database_url: String,
    pub api_version: String,
    pub status: String,
    pub order: String,
    pub timeout_secs: u64,
    pub column_policy: ColumnPolicy,
    pub line_item_key: String,
    pub interval_secs: Option<u64>,
    pub max_connections: u32,
}

// Credentials stay out of logs.
impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("shop", &self.shop)
            .field("access_token", &"<redacted>")
            .field("database_url", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("status", &self.status)
            .field("order", &self.order)
            .field("timeout_secs", &self.timeout_secs)
            .field("column_policy", &self.column_policy)
            .field("line_item_key", &self.line_item_key)
            .field("interval_secs", &self.interval_secs)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl SyncConfig {
    /// Read configuration from the process environment (after `.env`).
    ///
    /// Shop, token and connection string are not validated: a missing value
    /// only warns and fails later at the first request or connection.
    pub fn from_env() -> Self {
        envutil::init_env();

        let column_policy = match envutil::env_opt("SYNC_COLUMN_POLICY") {
            Some(raw) => ColumnPolicy::parse(&raw).unwrap_or_else(|| {
                warn!(target = "config", value = %raw, "unknown SYNC_COLUMN_POLICY; using project");
                ColumnPolicy::Project
            }),
            None => ColumnPolicy::default(),
        };

        let database_url = envutil::db_url().unwrap_or_else(|e| {
            warn!(target = "config", error = %e, "warehouse connection string missing");
            String::new()
        });

        let cfg = Self {
            shop: envutil::env_or_warn("SHOP_NAME"),
            access_token: envutil::env_or_warn("SHOPIFY_TOKEN"),
            database_url,
            api_version: envutil::env_opt("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            status: envutil::env_opt("SHOPIFY_ORDER_STATUS").unwrap_or_else(|| "any".to_string()),
            order: envutil::env_opt("SHOPIFY_ORDER_SORT")
                .unwrap_or_else(|| "created_at asc".to_string()),
            timeout_secs: envutil::env_parse("SHOPIFY_TIMEOUT_SECS", 30),
            column_policy,
            line_item_key: envutil::env_opt("SYNC_LINE_ITEM_KEY")
                .unwrap_or_else(|| "line_item_id".to_string()),
            interval_secs: envutil::env_parse_opt::<u64>("SYNC_INTERVAL_SECS").filter(|s| *s > 0),
            max_connections: envutil::env_parse("DB_MAX_CONNECTIONS", 2),
        };

        if cfg.line_item_key == "variant_id" {
            warn!(
                target = "config",
                "line items keyed by variant_id: items sharing a variant across orders are treated as duplicates"
            );
        }
        cfg
    }

    /// `https://{shop}/admin/api/{version}/{collection}.json`
    pub fn collection_url(&self, collection: &str) -> String {
        let shop = self
            .shop
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        format!(
            "https://{}/admin/api/{}/{}.json",
            shop, self.api_version, collection
        )
    }

    /// Query for the first page; later pages follow the server's next link.
    pub fn first_page_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("limit", PAGE_SIZE.to_string()),
            ("status", self.status.clone()),
            ("order", self.order.clone()),
        ]
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SyncConfig {
    SyncConfig {
        shop: "demo.myshopify.com".to_string(),
        access_token: "shpat_test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        api_version: DEFAULT_API_VERSION.to_string(),
        status: "any".to_string(),
        order: "created_at asc".to_string(),
        timeout_secs: 5,
        column_policy: ColumnPolicy::Project,
        line_item_key: "line_item_id".to_string(),
        interval_secs: None,
        max_connections: 1,
    }
}
