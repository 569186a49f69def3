use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use crate::cli::ServiceName;
use crate::config::Config;
use crate::directory::ClientOptions;
use crate::services::manager::ServiceManager;
use crate::services::scheduler::SchedulerService;
use crate::services::web::WebService;
use crate::settings::DirectorySettings;
use crate::state::AppState;
use crate::store::{MemoryStore, Stores};
use crate::sync::clock::SystemClock;
use crate::sync::scheduler::{Scheduler, SyncRunner};
use crate::sync::{CycleReport, RefreshKey};
use crate::utils::fmt_duration;

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
    runner: SyncRunner,
    service_manager: ServiceManager,
}

impl App {
    /// Connect the stores, seed settings and wire the sync runner.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let stores = match config.database_url.as_deref() {
            Some(url) => Stores::postgres(Self::connect(url).await?),
            None => {
                warn!("DATABASE_URL not set, state is kept in memory and lost on exit");
                Stores::memory(MemoryStore::new())
            }
        };

        let (seed, errors) = DirectorySettings::from_config(&config).sanitize();
        for e in &errors {
            warn!(field = %e.field, "{}", e.message);
        }
        let settings = seed
            .seed(stores.state.as_ref())
            .await
            .context("Failed to seed directory settings")?;
        info!(
            endpoint = %settings.endpoint,
            "Directory settings loaded"
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("locator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let options = ClientOptions {
            timeout: config.fetch_timeout,
            username: config.directory_username.clone(),
            password: config.directory_password.clone(),
            ..ClientOptions::default()
        };
        let clock = Arc::new(SystemClock);
        let runner = SyncRunner::new(
            stores.clone(),
            http,
            options,
            clock.clone(),
            config.import_timeout,
        );

        let app_state = AppState::new(stores)
            .with_clock(clock)
            .with_admin_token(config.admin_token.clone());

        Ok(App {
            config,
            app_state,
            runner,
            service_manager: ServiceManager::new(),
        })
    }

    async fn connect(url: &str) -> Result<sqlx::PgPool, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 4,
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(db_pool)
    }

    /// Setup and register services based on enabled service list
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Web) {
            self.service_manager.register_service(Box::new(WebService::new(
                self.config.port,
                self.app_state.clone(),
            )));
        }

        if services.contains(&ServiceName::Scheduler) {
            let scheduler = Scheduler::new(
                self.runner.clone(),
                self.config.cycle_interval,
                self.app_state.sync_notify.clone(),
            );
            self.service_manager
                .register_service(Box::new(SchedulerService::new(
                    scheduler,
                    self.app_state.service_statuses.clone(),
                )));
        }

        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }

        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }

    /// Run a single refresh cycle in-process.
    pub async fn sync_once(&self) -> Result<CycleReport, anyhow::Error> {
        self.runner.run_once().await
    }

    /// Print every key's refresh state.
    pub async fn print_status(&self) -> Result<(), anyhow::Error> {
        let states = self.app_state.gate().states().await?;
        for key in RefreshKey::ALL {
            match states.get(&key) {
                Some(state) => println!(
                    "{:<24} {}{}",
                    key.as_str(),
                    state.last_run_at.to_rfc3339(),
                    if state.locked { " *locked*" } else { "" }
                ),
                None => println!("{:<24} never", key.as_str()),
            }
        }
        Ok(())
    }
}
