use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use firekey::cli::{self, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("firekey=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("{:?}", args);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing current item...");
            on_signal.cancel();
        }
    });

    cli::run(args, cancel).await
}
