//! Command implementations.

mod acquire;
mod info;
mod process;
mod sync;
mod validate;

pub use acquire::run_acquire;
pub use info::run_info;
pub use process::run_process;
pub use sync::run_sync;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, RunBlueprint};
use tracing::{info, warn};

use crate::error::CliError;

/// Load and validate the configuration at `path`
fn load_blueprint(path: &Path) -> Result<RunBlueprint> {
    info!(config = %path.display(), "Loading configuration");

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }

    ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Re-validate after CLI overrides were applied
fn revalidate(blueprint: &RunBlueprint) -> Result<()> {
    ConfigLoader::validate(blueprint).map_err(|e| CliError::config_validation(e.to_string()))?;
    Ok(())
}

/// Start the Prometheus endpoint unless `port` is 0
fn init_metrics(port: u16) -> Result<()> {
    if port != 0 {
        observability::init_metrics_only(port)?;
        info!("Metrics endpoint available on port {}", port);
    }
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never resolves.
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
