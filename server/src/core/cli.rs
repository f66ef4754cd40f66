use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_APP_CODE, ENV_APP_SECRET, ENV_CONFIG, ENV_HOST, ENV_IAM_API_URL,
    ENV_IAM_IGNORE_PERMISSION, ENV_IAM_SKIP_CHECK, ENV_LOCAL_USERNAME, ENV_PORT,
    ENV_QUERY_API_URL, ENV_QUERY_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "logquery")]
#[command(version, about = "Log chart query and permission service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// BigData query API endpoint
    #[arg(long, global = true, env = ENV_QUERY_API_URL)]
    pub query_api_url: Option<String>,

    /// Query timeout in seconds
    #[arg(long, global = true, env = ENV_QUERY_TIMEOUT_SECS)]
    pub query_timeout_secs: Option<u64>,

    /// App code presented to the API gateway
    #[arg(long, global = true, env = ENV_APP_CODE)]
    pub app_code: Option<String>,

    /// App secret presented to the API gateway
    #[arg(long, global = true, env = ENV_APP_SECRET, hide_env_values = true)]
    pub app_secret: Option<String>,

    /// IAM API gateway base URL
    #[arg(long, global = true, env = ENV_IAM_API_URL)]
    pub iam_api_url: Option<String>,

    /// Skip business-level permission checks
    #[arg(long, global = true, env = ENV_IAM_SKIP_CHECK)]
    pub iam_skip_check: Option<bool>,

    /// List every space regardless of IAM policy
    #[arg(long, global = true, env = ENV_IAM_IGNORE_PERMISSION)]
    pub iam_ignore_permission: Option<bool>,

    /// Username to check permissions for when requests carry none
    #[arg(long, global = true, env = ENV_LOCAL_USERNAME)]
    pub local_username: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Offline SQL tools
    Sql {
        #[command(subcommand)]
        command: SqlCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SqlCommands {
    /// Print the chart SQL generated for a search filter
    Generate {
        /// Filter as JSON: {"start_time", "end_time", "addition": [...]}
        filter: String,
    },
    /// Rewrite a query to select from the given table
    Splice {
        /// Target table, e.g. 2_bklog.app_doris
        #[arg(long, short = 't')]
        table: String,
        /// Query to rewrite
        sql: String,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub query_api_url: Option<String>,
    pub query_timeout_secs: Option<u64>,
    pub app_code: Option<String>,
    pub app_secret: Option<String>,
    pub iam_api_url: Option<String>,
    pub iam_skip_check: Option<bool>,
    pub iam_ignore_permission: Option<bool>,
    pub local_username: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        query_api_url: cli.query_api_url,
        query_timeout_secs: cli.query_timeout_secs,
        app_code: cli.app_code,
        app_secret: cli.app_secret,
        iam_api_url: cli.iam_api_url,
        iam_skip_check: cli.iam_skip_check,
        iam_ignore_permission: cli.iam_ignore_permission,
        local_username: cli.local_username,
    };
    (config, cli.command)
}
