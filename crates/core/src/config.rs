use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentKey;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub guard: GuardConfig,
    pub agents: AgentsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardConfig {
    /// Queryable tables/views. Empty means every object is allowed.
    pub allowed_objects: Vec<String>,
    pub default_row_limit: u32,
    pub row_cap_style: RowCapStyle,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
    /// Logical key -> provider-side agent name.
    pub agent_map: BTreeMap<AgentKey, String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How the row cap is written into a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCapStyle {
    /// Trailing `LIMIT n` (SQLite, Postgres, MySQL).
    Limit,
    /// `SELECT TOP n` (SQL Server).
    Top,
}

impl RowCapStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Top => "top",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub agents_endpoint: Option<String>,
    pub allowed_objects: Option<Vec<String>>,
    pub default_row_limit: Option<u32>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_ROW_LIMIT: u32 = 500;
const MAX_ROW_LIMIT: u32 = 100_000;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://copilot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            guard: GuardConfig {
                allowed_objects: Vec::new(),
                default_row_limit: DEFAULT_ROW_LIMIT,
                row_cap_style: RowCapStyle::Limit,
            },
            agents: AgentsConfig {
                endpoint: None,
                api_key: None,
                api_version: None,
                timeout_secs: 60,
                agent_map: default_agent_map(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn default_agent_map() -> BTreeMap<AgentKey, String> {
    AgentKey::ALL
        .into_iter()
        .map(|key| (key, format!("{}-agent", key.as_str().replace('_', "-"))))
        .collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

/// Splits a comma-separated allow-list, dropping blank entries.
pub fn parse_allowed_objects(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

impl std::str::FromStr for RowCapStyle {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "limit" => Ok(Self::Limit),
            "top" => Ok(Self::Top),
            other => Err(ConfigError::Validation(format!(
                "unsupported row cap style `{other}` (expected limit|top)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AgentsConfig {
    pub fn agent_name(&self, key: AgentKey) -> Option<&str> {
        self.agent_map.get(&key).map(String::as_str)
    }

    /// Keys with no provider agent configured.
    pub fn missing_agents(&self) -> Vec<AgentKey> {
        AgentKey::ALL.into_iter().filter(|key| !self.agent_map.contains_key(key)).collect()
    }

    fn set_agent_name(&mut self, key: AgentKey, name: String) {
        let name = name.trim().to_string();
        if name.is_empty() {
            self.agent_map.remove(&key);
        } else {
            self.agent_map.insert(key, name);
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("copilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(guard) = patch.guard {
            if let Some(allowed_objects) = guard.allowed_objects {
                self.guard.allowed_objects = allowed_objects
                    .into_iter()
                    .map(|object| object.trim().to_string())
                    .filter(|object| !object.is_empty())
                    .collect();
            }
            if let Some(default_row_limit) = guard.default_row_limit {
                self.guard.default_row_limit = default_row_limit;
            }
            if let Some(row_cap_style) = guard.row_cap_style {
                self.guard.row_cap_style = row_cap_style;
            }
        }

        if let Some(agents) = patch.agents {
            if let Some(endpoint) = agents.endpoint {
                self.agents.endpoint = Some(endpoint);
            }
            if let Some(agents_api_key_value) = agents.api_key {
                self.agents.api_key = Some(secret_value(agents_api_key_value));
            }
            if let Some(api_version) = agents.api_version {
                self.agents.api_version = Some(api_version);
            }
            if let Some(timeout_secs) = agents.timeout_secs {
                self.agents.timeout_secs = timeout_secs;
            }
            for (raw_key, name) in agents.names.unwrap_or_default() {
                let key = raw_key.parse::<AgentKey>().map_err(|error| {
                    ConfigError::Validation(format!("agents.names: {error}"))
                })?;
                self.agents.set_agent_name(key, name);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COPILOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("COPILOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("COPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COPILOT_GUARD_ALLOWED_OBJECTS") {
            self.guard.allowed_objects = parse_allowed_objects(&value);
        }
        if let Some(value) = read_env("COPILOT_GUARD_DEFAULT_ROW_LIMIT") {
            self.guard.default_row_limit = parse_u32("COPILOT_GUARD_DEFAULT_ROW_LIMIT", &value)?;
        }
        if let Some(value) = read_env("COPILOT_GUARD_ROW_CAP_STYLE") {
            self.guard.row_cap_style = value.parse()?;
        }

        if let Some(value) = read_env("COPILOT_AGENTS_ENDPOINT") {
            self.agents.endpoint = Some(value);
        }
        if let Some(value) = read_env("COPILOT_AGENTS_API_KEY") {
            self.agents.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("COPILOT_AGENTS_API_VERSION") {
            self.agents.api_version = Some(value);
        }
        if let Some(value) = read_env("COPILOT_AGENTS_TIMEOUT_SECS") {
            self.agents.timeout_secs = parse_u64("COPILOT_AGENTS_TIMEOUT_SECS", &value)?;
        }
        for key in AgentKey::ALL {
            let var = agent_name_env_var(key);
            if let Ok(value) = env::var(&var) {
                self.agents.set_agent_name(key, value);
            }
        }

        if let Some(value) = read_env("COPILOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COPILOT_SERVER_PORT") {
            self.server.port = parse_u16("COPILOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("COPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("COPILOT_LOGGING_LEVEL").or_else(|| read_env("COPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COPILOT_LOGGING_FORMAT").or_else(|| read_env("COPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(endpoint) = overrides.agents_endpoint {
            self.agents.endpoint = Some(endpoint);
        }
        if let Some(allowed_objects) = overrides.allowed_objects {
            self.guard.allowed_objects = allowed_objects;
        }
        if let Some(default_row_limit) = overrides.default_row_limit {
            self.guard.default_row_limit = default_row_limit;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_guard(&self.guard)?;
        validate_agents(&self.agents)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn agent_name_env_var(key: AgentKey) -> String {
    format!("COPILOT_AGENTS_{}_NAME", key.as_str().to_ascii_uppercase())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("copilot.toml"), PathBuf::from("config/copilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_guard(guard: &GuardConfig) -> Result<(), ConfigError> {
    if guard.default_row_limit == 0 || guard.default_row_limit > MAX_ROW_LIMIT {
        return Err(ConfigError::Validation(format!(
            "guard.default_row_limit must be in range 1..={MAX_ROW_LIMIT}"
        )));
    }

    if let Some(invalid) = guard
        .allowed_objects
        .iter()
        .find(|object| object.chars().any(|ch| ch.is_whitespace() || ch == ';'))
    {
        return Err(ConfigError::Validation(format!(
            "guard.allowed_objects entry `{invalid}` must be a bare or dotted object name"
        )));
    }

    Ok(())
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    let endpoint = agents.endpoint.as_deref().map(str::trim).unwrap_or_default();
    if endpoint.is_empty() {
        return Err(ConfigError::Validation(
            "agents.endpoint is required (set COPILOT_AGENTS_ENDPOINT or [agents].endpoint)"
                .to_string(),
        ));
    }
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(
            "agents.endpoint must start with http:// or https://".to_string(),
        ));
    }

    if agents.timeout_secs == 0 || agents.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agents.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(api_key) = &agents.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "agents.api_key must not be blank when set".to_string(),
            ));
        }
    }

    if agents.agent_name(AgentKey::Routing).is_none() {
        return Err(ConfigError::Validation(
            "agents.names.routing is required: every turn starts with the routing agent"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    guard: Option<GuardPatch>,
    agents: Option<AgentsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardPatch {
    allowed_objects: Option<Vec<String>>,
    default_row_limit: Option<u32>,
    row_cap_style: Option<RowCapStyle>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    names: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
