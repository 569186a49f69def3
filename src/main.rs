use clap::Parser;
use locator::app::App;
use locator::cli::{Args, Command, ServiceName};
use locator::config::Config;
use locator::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting locator"
    );

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    match args.command.unwrap_or_default() {
        Command::Serve => {
            let enabled_services = ServiceName::all();
            let names: Vec<_> = enabled_services.iter().map(ServiceName::as_str).collect();
            info!(enabled_services = ?names, "services configuration loaded");
            if let Err(e) = app.setup_services(&enabled_services) {
                error!(error = ?e, "Failed to setup services");
                return ExitCode::FAILURE;
            }
            app.start_services();
            app.run().await
        }
        Command::Sync => match app.sync_once().await {
            Ok(report) => {
                info!(?report, "Refresh cycle complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = ?e, "Refresh cycle failed");
                ExitCode::FAILURE
            }
        },
        Command::Status => match app.print_status().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "Failed to read refresh state");
                ExitCode::FAILURE
            }
        },
    }
}
