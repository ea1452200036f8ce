use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Env var that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "REPO_ORACLE_CONFIG";

/// Top-level configuration loaded from `~/.repo-oracle/config.toml`.
///
/// **Security**: This struct NEVER stores API keys, tokens, or secrets.
/// All credentials are read from environment variables at runtime.
/// See [`CredentialProvider`] for the env-var-based credential model.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub github: GitHubSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl Config {
    /// Load config from `$REPO_ORACLE_CONFIG` or `~/.repo-oracle/config.toml`,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.general.log_format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Validation(format!(
                "general.log_format must be \"pretty\" or \"json\", got {:?}",
                self.general.log_format
            )));
        }
        self.github.validate()?;
        self.rate_limit.validate()?;
        self.providers.validate()?;
        if self.query.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "query.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.store.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.command_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.context.max_files == 0 {
            return Err(ConfigError::Validation(
                "context.max_files must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        if let Some(path) = CredentialProvider::from_env(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".repo-oracle")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_project_name() -> String {
    "repo-oracle".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
        }
    }
}

fn default_daemon_host() -> String {
    "127.0.0.1".into()
}
fn default_daemon_port() -> u16 {
    8787
}

/// Source-tree fetching against the GitHub REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// Env var name for the GitHub personal access token (default: `GITHUB_TOKEN`).
    #[serde(default = "default_github_env")]
    pub token_env: String,
    #[serde(default = "default_github_api")]
    pub api_base_url: String,
    /// Directory levels expanded below the root listing.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Child-directory fetches issued together.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token_env: default_github_env(),
            api_base_url: default_github_api(),
            max_depth: default_max_depth(),
            batch_size: default_batch_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
        }
    }
}

impl GitHubSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "github.batch_size must be greater than zero".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "github.retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_github_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_github_api() -> String {
    "https://api.github.com".into()
}
fn default_max_depth() -> u32 {
    2
}
fn default_batch_size() -> usize {
    5
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_initial_delay_ms() -> u64 {
    1000
}

/// Distributed key/value store (Redis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Env var name holding the Redis URL. When unset the daemon falls back
    /// to a process-local store.
    #[serde(default = "default_redis_env")]
    pub redis_url_env: String,
    /// Expiry for precomputed repository contexts.
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,
    /// Upper bound on one store round trip, connecting included.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url_env: default_redis_env(),
            context_ttl_secs: default_context_ttl_secs(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_redis_env() -> String {
    "REDIS_URL".into()
}
fn default_context_ttl_secs() -> u64 {
    6 * 60 * 60
}
fn default_command_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Successful queries allowed per identity per window.
    #[serde(default = "default_quota_limit")]
    pub limit: u32,
    #[serde(default = "default_quota_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: default_quota_limit(),
            window_secs: default_quota_window_secs(),
        }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.limit must be greater than zero".into(),
            ));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.window_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_quota_limit() -> u32 {
    20
}
fn default_quota_window_secs() -> u64 {
    24 * 60 * 60
}

/// Generative text provider. Two credential slots, one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_primary_key_env")]
    pub primary_key_env: String,
    #[serde(default = "default_secondary_key_env")]
    pub secondary_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary_key_env: default_primary_key_env(),
            secondary_key_env: default_secondary_key_env(),
            model: default_model(),
            base_url: default_provider_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl ProvidersConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "providers.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::Validation(
                "providers.max_output_tokens must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_primary_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_secondary_key_env() -> String {
    "GEMINI_API_KEY_SECONDARY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_provider_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_max_output_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Wall-clock budget for a query, measured from arrival.
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_query_timeout_secs() -> u64 {
    120
}

/// Limits applied when collecting a whole-repository context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_context_max_files")]
    pub max_files: usize,
    #[serde(default = "default_context_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_context_max_total_chars")]
    pub max_total_chars: usize,
    #[serde(default = "default_context_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: default_context_max_files(),
            max_file_chars: default_context_max_file_chars(),
            max_total_chars: default_context_max_total_chars(),
            exclude_dirs: default_context_exclude_dirs(),
        }
    }
}

fn default_context_max_files() -> usize {
    40
}
fn default_context_max_file_chars() -> usize {
    100_000
}
fn default_context_max_total_chars() -> usize {
    400_000
}
fn default_context_exclude_dirs() -> Vec<String> {
    [
        "tests",
        "docs",
        "node_modules",
        ".git",
        "target",
        "vendor",
        "dist",
        "build",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Credential provider: reads secrets from environment at runtime
// ---------------------------------------------------------------------------

/// Reads credentials from environment variables at runtime.
///
/// Config stores env var *names*; this provider resolves them to values on
/// demand. Empty values are treated as unset.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Read a credential from a named env var.
    pub fn from_env(var_name: &str) -> Option<String> {
        std::env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn github_token(config: &Config) -> Option<String> {
        Self::from_env(&config.github.token_env)
    }

    pub fn primary_ai_key(config: &Config) -> Option<String> {
        Self::from_env(&config.providers.primary_key_env)
    }

    pub fn secondary_ai_key(config: &Config) -> Option<String> {
        Self::from_env(&config.providers.secondary_key_env)
    }

    pub fn redis_url(config: &Config) -> Option<String> {
        Self::from_env(&config.store.redis_url_env)
    }

    /// Names of the backends whose credentials are present.
    pub fn available(config: &Config) -> Vec<&'static str> {
        let mut found = Vec::new();
        if Self::github_token(config).is_some() {
            found.push("github");
        }
        if Self::primary_ai_key(config).is_some() {
            found.push("gemini");
        }
        if Self::secondary_ai_key(config).is_some() {
            found.push("gemini-secondary");
        }
        if Self::redis_url(config).is_some() {
            found.push("redis");
        }
        found
    }
}
