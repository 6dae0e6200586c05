use clap::Parser;
use meter_preprocess::config::{Args, Config};
use meter_preprocess::server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::try_from(args)?;

    tracing::info!(
        "Starting meter-preprocess-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(
        "Denoise: {} x{} levels, threshold {}; clip limit {}",
        config.pipeline.denoise.wavelet.as_str(),
        config.pipeline.denoise.levels,
        config.pipeline.denoise.threshold,
        config.pipeline.equalize.clip_limit
    );
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
