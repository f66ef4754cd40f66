//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, SqlCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG, IAM_CACHE_MAX_ENTRIES};
use crate::core::shutdown::ShutdownService;
use crate::data::{
    BkApiCredentials, CachedPolicyClient, HttpIamClient, HttpQueryApi, IndexSetRegistry,
    PolicyClient,
};
use crate::domain::chart::{ChartService, FilterSpec, generate_sql, splice::splice};
use crate::domain::iam::IamService;
use crate::domain::iam::types::Space;

/// Long-lived services shared by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub index_sets: Arc<IndexSetRegistry>,
    pub chart: Arc<ChartService>,
    pub iam: Arc<IamService>,
    pub spaces: Arc<Vec<Space>>,
}

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub services: AppServices,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Sql { command }) => return Self::handle_sql_command(&cli_config, command),
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config)?;
        Self::start_server(app).await
    }

    fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let index_sets = Arc::new(IndexSetRegistry::new(config.index_sets.clone()));

        let query_api = HttpQueryApi::new(
            config.query.api_url.clone(),
            BkApiCredentials::new(config.query.app_code.clone(), config.query.app_secret.clone()),
            config.query.timeout_secs,
        )
        .context("Failed to initialize query API client")?;

        let iam_client: Arc<dyn PolicyClient> = Arc::new(
            HttpIamClient::new(
                config.iam.api_url.clone(),
                BkApiCredentials::new(config.iam.app_code.clone(), config.iam.app_secret.clone()),
                config.iam.timeout_secs,
            )
            .context("Failed to initialize IAM client")?,
        );
        let iam_client: Arc<dyn PolicyClient> = if config.iam.cache_ttl_secs > 0 {
            tracing::debug!(ttl_secs = config.iam.cache_ttl_secs, "IAM decision cache enabled");
            Arc::new(CachedPolicyClient::new(
                iam_client,
                Duration::from_secs(config.iam.cache_ttl_secs),
                IAM_CACHE_MAX_ENTRIES,
            ))
        } else {
            iam_client
        };

        let chart = Arc::new(ChartService::new(
            index_sets.clone(),
            Arc::new(query_api),
            config.chart.sql_options(),
        ));
        let iam = Arc::new(IamService::new(
            iam_client,
            config.iam.settings.clone(),
            index_sets.clone(),
        ));
        let spaces = Arc::new(config.spaces.clone());

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            services: AppServices {
                index_sets,
                chart,
                iam,
                spaces,
            },
        })
    }

    fn handle_sql_command(cli: &CliConfig, cmd: SqlCommands) -> Result<()> {
        match cmd {
            SqlCommands::Generate { filter } => {
                let filter: FilterSpec =
                    serde_json::from_str(&filter).context("Invalid filter JSON")?;
                let config = AppConfig::load(cli)?;
                println!("{}", generate_sql(&filter, &config.chart.sql_options()));
            }
            SqlCommands::Splice { table, sql } => {
                println!("{}", splice(&sql, &table)?);
            }
        }
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        banner::print_banner(&app.config);

        let server = ApiServer::new(app);
        let app = server.start().await?;
        tracing::debug!(
            triggered = app.shutdown.is_triggered(),
            "Server stopped"
        );

        Ok(())
    }
}
