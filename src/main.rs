use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wabot::client::sim::SimFactory;
use wabot::{BotConfig, CredentialStore, HttpBlobFetcher, LifecycleController, LogHandlers};

/// WhatsApp bot host: session bootstrap, connection lifecycle, static web.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Override the credential store directory.
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Override the static assets directory.
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Override the HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wabot starting");

    let mut config = BotConfig::from_env();
    if let Some(dir) = cli.session_dir {
        config = config.with_session_dir(dir);
    }
    if let Some(dir) = cli.assets_dir {
        config = config.with_assets_dir(dir);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }

    let store = CredentialStore::open(&config.session_dir)?;
    let fetcher = Arc::new(HttpBlobFetcher::new(config.storage_url.clone()));
    let factory = Arc::new(SimFactory::new(config.mode));
    let handlers = Arc::new(LogHandlers);

    let web = tokio::spawn(web_task(config.port, config.assets_dir.clone()));

    let controller = LifecycleController::new(config, store, fetcher, factory, handlers);
    if let Err(err) = controller.run().await {
        error!(error = %err, "lifecycle failed");
        return Err(err.into());
    }

    // A logged-out client leaves the web surface up; the operator decides
    // when to stop the process.
    web.await?;
    Ok(())
}

async fn web_task(port: u16, assets_dir: PathBuf) {
    if let Err(err) = wabot::web::serve(port, &assets_dir).await {
        error!(error = %err, "asset server failed");
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
