/// EMD Signer daemon entry point

use clap::Parser;
use emd_signer::{
    alert::LogAlert, config::Settings, crypto::KeyFileStore, dates::DateSelection,
    jobs::SigningJob, portal::PortalClient,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sign EMD documents waiting for the organisation's signature
#[derive(Debug, Parser)]
#[command(name = "emd-signer", version, about)]
struct Cli {
    /// Search range as dd.mm.yyyy: none for the last month, one date for a
    /// single day, two for a range
    #[arg(value_name = "DATE", num_args = 0..=2)]
    dates: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "EMD_LOG_JSON")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emd_signer=info".into());
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    print_banner();
    info!("EMD Signer v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;
    let dates = DateSelection::from_args(&cli.dates)?;
    if let DateSelection::Fixed(range) = dates {
        info!("Using fixed search range {}", range);
    }

    let portal = Arc::new(PortalClient::new(&settings.url, settings.request_timeout())?);
    let store = Arc::new(KeyFileStore::new(settings.keys_file.clone()));
    info!("Using key file {}", store.path().display());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let job = SigningJob::new(
        settings,
        portal,
        store,
        Arc::new(LogAlert::new()),
        dates,
        cancel,
    );
    let result = job.run().await;

    info!("Work finished");
    result.map_err(Into::into)
}

/// Cancel `cancel` on Ctrl-C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, finishing current step");
    cancel.cancel();
}

fn print_banner() {
    println!(
        r#"
    ________  _______     _____ _
   / ____/  |/  / __ \   / ___/(_)___ _____  ___  _____
  / __/ / /|_/ / / / /   \__ \/ / __ `/ __ \/ _ \/ ___/
 / /___/ /  / / /_/ /   ___/ / / /_/ / / / /  __/ /
/_____/_/  /_/_____/   /____/_/\__, /_/ /_/\___/_/
                              /____/
        EMD document signer v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
