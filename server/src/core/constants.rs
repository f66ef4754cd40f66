// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "LogQuery";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "logquery";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".logquery";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "logquery.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "LOGQUERY_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "LOGQUERY_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "LOGQUERY_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "LOGQUERY_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5390;

/// Maximum request body size (1 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Seconds to wait for in-flight requests on shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Environment Variables - Query API
// =============================================================================

/// BigData query API endpoint
pub const ENV_QUERY_API_URL: &str = "LOGQUERY_QUERY_API_URL";

/// App code presented to the API gateway
pub const ENV_APP_CODE: &str = "LOGQUERY_APP_CODE";

/// App secret presented to the API gateway
pub const ENV_APP_SECRET: &str = "LOGQUERY_APP_SECRET";

/// Query timeout override
pub const ENV_QUERY_TIMEOUT_SECS: &str = "LOGQUERY_QUERY_TIMEOUT_SECS";

/// Default query timeout in seconds
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Environment Variables - IAM
// =============================================================================

/// IAM API gateway base URL
pub const ENV_IAM_API_URL: &str = "LOGQUERY_IAM_API_URL";

/// Skip business-level permission checks
pub const ENV_IAM_SKIP_CHECK: &str = "LOGQUERY_IAM_SKIP_CHECK";

/// Return every space regardless of policy
pub const ENV_IAM_IGNORE_PERMISSION: &str = "LOGQUERY_IAM_IGNORE_PERMISSION";

/// Username used when the request carries none
pub const ENV_LOCAL_USERNAME: &str = "LOGQUERY_LOCAL_USERNAME";

// =============================================================================
// IAM Defaults
// =============================================================================

/// System id registered in the IAM service
pub const DEFAULT_IAM_SYSTEM_ID: &str = "bk_log_search";

/// Display name of the system
pub const DEFAULT_IAM_SYSTEM_NAME: &str = "Log Search";

/// Tenant used when the request carries none
pub const DEFAULT_TENANT_ID: &str = "system";

/// Default IAM request timeout in seconds
pub const DEFAULT_IAM_TIMEOUT_SECS: u64 = 10;

/// Maximum cached permission decisions
pub const IAM_CACHE_MAX_ENTRIES: u64 = 10_000;

// =============================================================================
// Request Identity Headers
// =============================================================================

/// Header carrying the authenticated username (set by the login gateway)
pub const HEADER_USERNAME: &str = "x-bk-username";

/// Header carrying the tenant id
pub const HEADER_TENANT_ID: &str = "x-bk-tenant-id";
