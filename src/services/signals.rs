use std::process::ExitCode;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};

use crate::services::manager::ServiceManager;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

/// Run until a signal arrives or a service exits, then stop everything.
pub async fn handle_shutdown_signals(
    mut manager: ServiceManager,
    shutdown_timeout: Duration,
) -> ExitCode {
    let failed = tokio::select! {
        _ = shutdown_signal() => false,
        (name, failed) = manager.wait_for_exit() => {
            warn!(service = %name, "Service exited, shutting down the rest");
            failed
        }
    };

    let clean = manager.shutdown(shutdown_timeout).await;
    if failed || !clean {
        ExitCode::FAILURE
    } else {
        info!("Shutdown complete");
        ExitCode::SUCCESS
    }
}
