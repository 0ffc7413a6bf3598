use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use upload_core::announce::render_qr;
use upload_core::{FileServer, ServerEvent};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Help and version exit here, before anything is created
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = cli.into_config();
    let qr_enabled = config.qr_enabled;
    tracing::info!("File upload server v{}", env!("CARGO_PKG_VERSION"));

    // Bounded with capacity 1000 for backpressure
    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(1000);

    let server = FileServer::bind(config, event_tx)
        .await
        .context("Server failed to start")?;
    tracing::info!("Serving files from folder: {}", server.upload_dir().display());

    let logger = tokio::spawn(log_events(event_rx, qr_enabled));

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    server.serve(cancel_token).await.context("Server error")?;
    let _ = logger.await;
    Ok(())
}

/// Print announcements and log stored files until the server is gone
async fn log_events(mut event_rx: mpsc::Receiver<ServerEvent>, qr_enabled: bool) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ServerEvent::Listening { urls, .. } => {
                println!("Available on:");
                for url in &urls {
                    println!("\t{}", url);
                    if qr_enabled {
                        if let Some(qr) = render_qr(url) {
                            println!("{}", qr);
                        }
                    }
                }
                println!("Hit CTRL-C to stop the server");
            }
            ServerEvent::FileStored(stored) => {
                tracing::info!("File uploaded: {}", stored.path.display());
            }
            ServerEvent::Stopped => {
                tracing::info!("Server stopped");
            }
        }
    }
}
