use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tile_controller::backend::BackendClient;
use tile_controller::config::Settings;
use tile_controller::context::{Collaborators, Context};
use tile_controller::device::DeviceClient;
use tile_controller::mqtt::RumqttTransport;
use tile_controller::orchestrator::discovery::MdnsBrowser;
use tile_controller::orchestrator::{Orchestrator, OrchestratorError};
use tile_controller::persistence::config_store::{ConfigStore, JsonFileStore};
use tile_controller::platform::{HostLink, LogDisplay, TerminalProvisioner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Bridges a LAN lighting panel controller with the GeoGlow broker.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (TOML). Created with defaults if missing.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Persisted device state (JSON).
    #[arg(long)]
    state: Option<PathBuf>,

    /// Erase the persisted device state and exit.
    #[arg(long)]
    factory_reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let settings_path = cli.settings.unwrap_or_else(Settings::default_path);
    Settings::ensure_default(&settings_path).await?;
    let settings = Settings::load(&settings_path).await?;
    info!("Settings loaded from {}", settings_path.display());

    let store = JsonFileStore::new(cli.state.unwrap_or_else(JsonFileStore::default_path));
    if cli.factory_reset {
        store.clear().await?;
        info!("Persisted state erased");
        return Ok(());
    }
    let persisted = store.load().await?;

    let device = DeviceClient::new(&settings.device)?;
    let backend = BackendClient::new(&settings.backend)?;
    let collaborators = Collaborators {
        transport: Box::new(RumqttTransport::new(settings.broker.clone())),
        browser: Box::new(MdnsBrowser::new()?),
        store: Box::new(store),
        link: Box::new(HostLink),
        provisioner: Box::new(TerminalProvisioner),
        display: Box::new(LogDisplay::default()),
    };

    let ctx = Context::assemble(settings, persisted, collaborators, device, backend);
    let orchestrator = Orchestrator::new(ctx);

    tokio::select! {
        result = orchestrator.run() => match result {
            Ok(()) => Ok(()),
            Err(OrchestratorError::RestartRequired(reason)) => {
                error!("Cannot continue: {}", reason);
                Err(eyre!("restart required: {}", reason))
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
