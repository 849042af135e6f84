use drawboard::config::{DEFAULT_LOG_FILTER, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let result = match ServerConfig::from_env() {
        Ok(config) => drawboard::run(config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "drawboard failed to start");
        std::process::exit(1);
    }
}
