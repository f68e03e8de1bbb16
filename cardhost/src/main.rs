use std::sync::Arc;

use anyhow::Result;
use cardhost::{config, CardhostConfig, MockSmartCardPlatform, SmartCardPlatform};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CardhostConfig::parse();

    let json_logs = config.log_json || std::env::var("ROUTER_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("cardhost=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let identity = config::load_or_create(&config.keystore_path(), &config.router)?;
    tracing::info!(uuid = %identity.uuid, router = %config.router, "loaded cardhost identity");

    let platform: Arc<dyn SmartCardPlatform> = if config.mock {
        tracing::info!("using mock smart card platform (no physical reader)");
        Arc::new(MockSmartCardPlatform::new())
    } else {
        anyhow::bail!("no physical smart-card platform is wired up yet; pass --mock");
    };

    cardhost::client::run(identity, config.router.clone(), platform).await?;
    Ok(())
}
