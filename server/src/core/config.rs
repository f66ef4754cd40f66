use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::IndexSet;
use crate::domain::chart::SqlOptions;
use crate::domain::chart::predicate::{DEFAULT_SQL_PREFIX, DEFAULT_SQL_SUFFIX, DEFAULT_TIME_FIELD};
use crate::domain::iam::IamSettings;
use crate::domain::iam::types::Space;
use crate::utils::file::expand_path;
use crate::utils::sql::is_identifier;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_HOST, DEFAULT_IAM_SYSTEM_ID,
    DEFAULT_IAM_SYSTEM_NAME, DEFAULT_IAM_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_TENANT_ID,
};
use super::secret::AppSecret;

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Chart SQL generation section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChartFileConfig {
    pub time_field: Option<String>,
    pub sql_prefix: Option<String>,
    pub sql_suffix: Option<String>,
    pub escape_literals: Option<bool>,
}

/// Query API section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryFileConfig {
    pub api_url: Option<String>,
    pub app_code: Option<String>,
    pub app_secret: Option<AppSecret>,
    pub timeout_secs: Option<u64>,
}

/// IAM section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IamFileConfig {
    pub system_id: Option<String>,
    pub system_name: Option<String>,
    pub api_url: Option<String>,
    pub app_code: Option<String>,
    pub app_secret: Option<AppSecret>,
    pub saas_host: Option<String>,
    pub skip_check: Option<bool>,
    pub ignore_permission: Option<bool>,
    pub default_tenant_id: Option<String>,
    pub local_username: Option<String>,
    pub demo_biz_id: Option<i64>,
    pub demo_biz_edit_enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub chart: Option<ChartFileConfig>,
    pub query: Option<QueryFileConfig>,
    pub iam: Option<IamFileConfig>,
    pub index_sets: Option<Vec<IndexSet>>,
    pub spaces: Option<Vec<Space>>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `$current.$field` when `$other.$field` is set
macro_rules! merge_fields {
    ($section:literal, $current:expr, $other:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if $other.$field.is_some() {
                tracing::trace!(
                    field = concat!($section, ".", stringify!($field)),
                    "Merging config field"
                );
                $current.$field = $other.$field;
            }
        )+
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            merge_fields!("server", current, server, [host, port]);
        }

        if let Some(chart) = other.chart {
            let current = self.chart.get_or_insert_with(ChartFileConfig::default);
            merge_fields!(
                "chart",
                current,
                chart,
                [time_field, sql_prefix, sql_suffix, escape_literals]
            );
        }

        if let Some(query) = other.query {
            let current = self.query.get_or_insert_with(QueryFileConfig::default);
            merge_fields!(
                "query",
                current,
                query,
                [api_url, app_code, app_secret, timeout_secs]
            );
        }

        if let Some(iam) = other.iam {
            let current = self.iam.get_or_insert_with(IamFileConfig::default);
            merge_fields!(
                "iam",
                current,
                iam,
                [
                    system_id,
                    system_name,
                    api_url,
                    app_code,
                    app_secret,
                    saas_host,
                    skip_check,
                    ignore_permission,
                    default_tenant_id,
                    local_username,
                    demo_biz_id,
                    demo_biz_edit_enabled,
                    timeout_secs,
                    cache_ttl_secs,
                ]
            );
        }

        // Lists are replaced as a whole
        if other.index_sets.is_some() {
            tracing::trace!("Merging index_sets");
            self.index_sets = other.index_sets;
        }
        if other.spaces.is_some() {
            tracing::trace!("Merging spaces");
            self.spaces = other.spaces;
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Chart SQL generation
#[derive(Debug, Clone)]
pub struct ChartConfig {
    pub time_field: String,
    pub sql_prefix: String,
    pub sql_suffix: String,
    pub escape_literals: bool,
}

impl ChartConfig {
    pub fn sql_options(&self) -> SqlOptions {
        SqlOptions {
            time_field: self.time_field.clone(),
            sql_prefix: self.sql_prefix.clone(),
            sql_suffix: self.sql_suffix.clone(),
            escape_literals: self.escape_literals,
        }
    }
}

/// Query API client configuration
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub api_url: String,
    pub app_code: String,
    pub app_secret: AppSecret,
    pub timeout_secs: u64,
}

/// IAM client configuration
#[derive(Debug, Clone)]
pub struct IamConfig {
    pub api_url: String,
    pub app_code: String,
    pub app_secret: AppSecret,
    pub timeout_secs: u64,
    /// Decision cache TTL; 0 disables the cache
    pub cache_ttl_secs: u64,
    pub settings: IamSettings,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chart: ChartConfig,
    pub query: QueryConfig,
    pub iam: IamConfig,
    pub index_sets: Vec<IndexSet>,
    pub spaces: Vec<Space>,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.logquery/logquery.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.logquery/logquery.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::from_layers(file_config, cli)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_server = file_config.server.unwrap_or_default();
        let file_chart = file_config.chart.unwrap_or_default();
        let file_query = file_config.query.unwrap_or_default();
        let file_iam = file_config.iam.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let chart = ChartConfig {
            time_field: file_chart
                .time_field
                .unwrap_or_else(|| DEFAULT_TIME_FIELD.to_string()),
            sql_prefix: file_chart
                .sql_prefix
                .unwrap_or_else(|| DEFAULT_SQL_PREFIX.to_string()),
            sql_suffix: file_chart
                .sql_suffix
                .unwrap_or_else(|| DEFAULT_SQL_SUFFIX.to_string()),
            escape_literals: file_chart.escape_literals.unwrap_or(false),
        };

        // Gateway credentials: CLI/env applies to both clients
        let cli_secret = cli.app_secret.clone().map(AppSecret::from);
        let query_app_code = cli
            .app_code
            .clone()
            .or(file_query.app_code)
            .unwrap_or_default();
        let query_app_secret = cli_secret
            .clone()
            .or(file_query.app_secret)
            .unwrap_or_default();

        let iam_app_code = cli
            .app_code
            .clone()
            .or(file_iam.app_code)
            .unwrap_or_else(|| query_app_code.clone());
        let iam_app_secret = cli_secret
            .or(file_iam.app_secret)
            .unwrap_or_else(|| query_app_secret.clone());

        let query = QueryConfig {
            api_url: cli
                .query_api_url
                .clone()
                .or(file_query.api_url)
                .unwrap_or_default(),
            app_code: query_app_code,
            app_secret: query_app_secret,
            timeout_secs: cli
                .query_timeout_secs
                .or(file_query.timeout_secs)
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
        };

        let settings = IamSettings {
            system_id: file_iam
                .system_id
                .unwrap_or_else(|| DEFAULT_IAM_SYSTEM_ID.to_string()),
            system_name: file_iam
                .system_name
                .unwrap_or_else(|| DEFAULT_IAM_SYSTEM_NAME.to_string()),
            saas_host: file_iam.saas_host.unwrap_or_default(),
            skip_check: cli
                .iam_skip_check
                .or(file_iam.skip_check)
                .unwrap_or(false),
            ignore_permission: cli
                .iam_ignore_permission
                .or(file_iam.ignore_permission)
                .unwrap_or(false),
            default_tenant_id: file_iam
                .default_tenant_id
                .unwrap_or_else(|| DEFAULT_TENANT_ID.to_string()),
            local_username: cli.local_username.clone().or(file_iam.local_username),
            demo_biz_id: file_iam.demo_biz_id,
            demo_biz_edit_enabled: file_iam.demo_biz_edit_enabled.unwrap_or(false),
        };

        let iam = IamConfig {
            api_url: cli
                .iam_api_url
                .clone()
                .or(file_iam.api_url)
                .unwrap_or_default(),
            app_code: iam_app_code,
            app_secret: iam_app_secret,
            timeout_secs: file_iam.timeout_secs.unwrap_or(DEFAULT_IAM_TIMEOUT_SECS),
            cache_ttl_secs: file_iam.cache_ttl_secs.unwrap_or(0),
            settings,
        };

        let config = Self {
            server,
            chart,
            query,
            iam,
            index_sets: file_config.index_sets.unwrap_or_default(),
            spaces: file_config.spaces.unwrap_or_default(),
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            index_sets = config.index_sets.len(),
            spaces = config.spaces.len(),
            iam_cache_ttl_secs = config.iam.cache_ttl_secs,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.query.timeout_secs == 0 {
            anyhow::bail!("Configuration error: query.timeout_secs must be greater than 0");
        }
        if self.iam.timeout_secs == 0 {
            anyhow::bail!("Configuration error: iam.timeout_secs must be greater than 0");
        }
        if !is_identifier(&self.chart.time_field) {
            anyhow::bail!(
                "Configuration error: chart.time_field '{}' is not a valid column name",
                self.chart.time_field
            );
        }

        for index_set in &self.index_sets {
            if index_set.support_doris && index_set.doris_table().is_none() {
                anyhow::bail!(
                    "Configuration error: index_sets[{}].table_id is required when support_doris is true",
                    index_set.index_set_id
                );
            }
        }

        if self.iam.settings.skip_check && is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "IAM business checks are skipped while listening on all interfaces"
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.logquery/logquery.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(json: &str) -> FileConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 8080 },
            "chart": { "time_field": "ts", "escape_literals": true },
            "query": { "api_url": "http://bkdata/query", "app_code": "log", "app_secret": "s", "timeout_secs": 30 },
            "iam": { "api_url": "http://iam", "demo_biz_id": 7, "cache_ttl_secs": 60 },
            "index_sets": [
                { "index_set_id": 1, "table_id": "2_bklog.a", "support_doris": true, "bk_biz_id": 2 }
            ],
            "spaces": [ { "bk_biz_id": 2, "space_uid": "bkcc__2", "space_name": "Blueking" } ]
        }"#;
        let config = parse(json);

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("0.0.0.0".to_string()));
        assert_eq!(server.port, Some(8080));
        assert_eq!(config.chart.as_ref().unwrap().escape_literals, Some(true));
        assert_eq!(
            config.query.as_ref().unwrap().app_secret,
            Some(AppSecret::new("s"))
        );
        assert_eq!(config.iam.as_ref().unwrap().demo_biz_id, Some(7));
        assert_eq!(config.index_sets.as_ref().unwrap().len(), 1);
        assert_eq!(config.spaces.as_ref().unwrap()[0].space_uid, "bkcc__2");
    }

    #[test]
    fn test_file_config_parse_partial() {
        let config = parse(r#"{ "server": { "port": 9000 } }"#);
        assert!(config.server.as_ref().unwrap().host.is_none());
        assert_eq!(config.server.as_ref().unwrap().port, Some(9000));
        assert!(config.iam.is_none());
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config = parse("{}");
        assert!(config.server.is_none());
        assert!(config.index_sets.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let config = parse(r#"{ "server": { "host": "localhost" }, "unknown_field": 123 }"#);
        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_file_config_merge() {
        let mut base = parse(
            r#"{
                "server": { "host": "base.host", "port": 1000 },
                "iam": { "system_id": "base_system", "skip_check": true },
                "index_sets": [ { "index_set_id": 1, "bk_biz_id": 2 } ]
            }"#,
        );
        let overlay = parse(
            r#"{
                "server": { "port": 2000 },
                "iam": { "skip_check": false },
                "index_sets": [
                    { "index_set_id": 5, "bk_biz_id": 3 },
                    { "index_set_id": 6, "bk_biz_id": 3 }
                ]
            }"#,
        );
        base.merge(overlay);

        let server = base.server.as_ref().unwrap();
        assert_eq!(server.host, Some("base.host".to_string()));
        assert_eq!(server.port, Some(2000));

        let iam = base.iam.as_ref().unwrap();
        assert_eq!(iam.system_id, Some("base_system".to_string()));
        assert_eq!(iam.skip_check, Some(false));

        let ids: Vec<u64> = base
            .index_sets
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| s.index_set_id)
            .collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_layers(FileConfig::default(), &CliConfig::default()).unwrap();

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.chart.time_field, DEFAULT_TIME_FIELD);
        assert!(!config.chart.escape_literals);
        assert_eq!(config.query.timeout_secs, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.iam.timeout_secs, DEFAULT_IAM_TIMEOUT_SECS);
        assert_eq!(config.iam.cache_ttl_secs, 0);
        assert_eq!(config.iam.settings.system_id, DEFAULT_IAM_SYSTEM_ID);
        assert_eq!(config.iam.settings.default_tenant_id, DEFAULT_TENANT_ID);
        assert!(config.index_sets.is_empty());
    }

    #[test]
    fn test_app_config_cli_override() {
        let file = parse(
            r#"{
                "server": { "host": "file.host", "port": 1000 },
                "query": { "api_url": "http://file/query", "app_code": "file_app" },
                "iam": { "skip_check": false, "local_username": "file_user" }
            }"#,
        );
        let cli = CliConfig {
            host: Some("cli.host".to_string()),
            port: Some(3000),
            query_api_url: Some("http://cli/query".to_string()),
            app_code: Some("cli_app".to_string()),
            app_secret: Some("cli_secret".to_string()),
            iam_skip_check: Some(true),
            local_username: Some("cli_user".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_layers(file, &cli).unwrap();

        assert_eq!(config.server.host, "cli.host");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.query.api_url, "http://cli/query");
        assert_eq!(config.query.app_code, "cli_app");
        assert_eq!(config.iam.app_code, "cli_app");
        assert_eq!(config.iam.app_secret.expose(), "cli_secret");
        assert!(config.iam.settings.skip_check);
        assert_eq!(
            config.iam.settings.local_username.as_deref(),
            Some("cli_user")
        );
    }

    #[test]
    fn test_iam_credentials_fall_back_to_query() {
        let file = parse(r#"{ "query": { "app_code": "log", "app_secret": "q" } }"#);
        let config = AppConfig::from_layers(file, &CliConfig::default()).unwrap();
        assert_eq!(config.iam.app_code, "log");
        assert_eq!(config.iam.app_secret.expose(), "q");
    }

    #[test]
    fn test_chart_sql_options() {
        let file = parse(r#"{ "chart": { "time_field": "ts", "sql_suffix": "" } }"#);
        let config = AppConfig::from_layers(file, &CliConfig::default()).unwrap();
        let options = config.chart.sql_options();
        assert_eq!(options.time_field, "ts");
        assert_eq!(options.sql_prefix, DEFAULT_SQL_PREFIX);
        assert_eq!(options.sql_suffix, "");
    }

    #[test]
    fn test_app_config_validation_port_zero() {
        let cli = CliConfig {
            port: Some(0),
            ..Default::default()
        };
        let err = AppConfig::from_layers(FileConfig::default(), &cli).unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_app_config_validation_empty_host() {
        let cli = CliConfig {
            host: Some(String::new()),
            ..Default::default()
        };
        let err = AppConfig::from_layers(FileConfig::default(), &cli).unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_app_config_validation_time_field() {
        let file = parse(r#"{ "chart": { "time_field": "ts; DROP TABLE x" } }"#);
        let err = AppConfig::from_layers(file, &CliConfig::default()).unwrap_err();
        assert!(err.to_string().contains("chart.time_field"));
    }

    #[test]
    fn test_app_config_validation_doris_table_required() {
        let file = parse(
            r#"{ "index_sets": [ { "index_set_id": 9, "support_doris": true, "bk_biz_id": 2 } ] }"#,
        );
        let err = AppConfig::from_layers(file, &CliConfig::default()).unwrap_err();
        assert!(err.to_string().contains("index_sets[9]"));
    }

    #[test]
    fn test_app_config_load_from_cli_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "server": {{ "port": 7001 }}, "iam": {{ "demo_biz_id": 3 }} }}"#
        )
        .unwrap();

        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.iam.settings.demo_biz_id, Some(3));
    }

    #[test]
    fn test_app_config_missing_cli_path() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/logquery.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let file = parse(r#"{ "query": { "app_secret": "top-secret" } }"#);
        let config = AppConfig::from_layers(file, &CliConfig::default()).unwrap();
        assert!(!format!("{:?}", config).contains("top-secret"));
    }

    #[test]
    fn test_is_all_interfaces() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(is_all_interfaces("::"));
        assert!(is_all_interfaces("[::]"));
        assert!(!is_all_interfaces("127.0.0.1"));
    }
}
