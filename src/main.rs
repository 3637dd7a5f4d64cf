use anyhow::Result;
use shop_sync::config::SyncConfig;
use shop_sync::shopify::ShopifyClient;
use shop_sync::util::env as env_util;
use shop_sync::{orchestrator, warehouse};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    shop_sync::logging::init_tracing("shop_sync=info")?;

    let cfg = SyncConfig::from_env();
    info!(
        shop = %cfg.shop,
        api_version = %cfg.api_version,
        policy = ?cfg.column_policy,
        interval_secs = ?cfg.interval_secs,
        "starting shop-sync"
    );

    let client = ShopifyClient::new(&cfg)?;
    let store = warehouse::connect(&cfg).await?;
    info!(backend = store.name(), "warehouse ready");

    orchestrator::run_forever(&cfg, &client, &*store).await
}
