use tracing_subscriber::{fmt, EnvFilter};

use cloudstore::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    // The server logs the startup banner with the effective configuration
    cloudstore::server::run_with_config(AppConfig::from_env()?).await
}
