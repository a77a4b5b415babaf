use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use copilot_core::config::{agent_name_env_var, AppConfig, LoadOptions};
use copilot_core::AgentKey;
use toml::Value;

struct Field {
    key_path: String,
    value: String,
    env_keys: Vec<String>,
}

impl Field {
    fn new(key_path: &str, value: impl Into<String>, env_key: &str) -> Self {
        Self { key_path: key_path.to_string(), value: value.into(), env_keys: vec![env_key.to_string()] }
    }

    fn with_alias(mut self, env_key: &str) -> Self {
        self.env_keys.push(env_key.to_string());
        self
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            &field.key_path,
            &field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let allowed_objects = if config.guard.allowed_objects.is_empty() {
        "<any>".to_string()
    } else {
        config.guard.allowed_objects.join(",")
    };

    let mut fields = vec![
        Field::new("database.url", &config.database.url, "COPILOT_DATABASE_URL"),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "COPILOT_DATABASE_MAX_CONNECTIONS",
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "COPILOT_DATABASE_TIMEOUT_SECS",
        ),
        Field::new("guard.allowed_objects", allowed_objects, "COPILOT_GUARD_ALLOWED_OBJECTS"),
        Field::new(
            "guard.default_row_limit",
            config.guard.default_row_limit.to_string(),
            "COPILOT_GUARD_DEFAULT_ROW_LIMIT",
        ),
        Field::new(
            "guard.row_cap_style",
            config.guard.row_cap_style.as_str(),
            "COPILOT_GUARD_ROW_CAP_STYLE",
        ),
        Field::new(
            "agents.endpoint",
            config.agents.endpoint.as_deref().unwrap_or("<unset>"),
            "COPILOT_AGENTS_ENDPOINT",
        ),
        Field::new(
            "agents.api_key",
            if config.agents.api_key.is_some() { "<redacted>" } else { "<unset>" },
            "COPILOT_AGENTS_API_KEY",
        ),
        Field::new(
            "agents.api_version",
            config.agents.api_version.as_deref().unwrap_or("<unset>"),
            "COPILOT_AGENTS_API_VERSION",
        ),
        Field::new(
            "agents.timeout_secs",
            config.agents.timeout_secs.to_string(),
            "COPILOT_AGENTS_TIMEOUT_SECS",
        ),
    ];

    for key in AgentKey::ALL {
        fields.push(Field::new(
            &format!("agents.names.{}", key.as_str()),
            config.agents.agent_name(key).unwrap_or("<unmapped>"),
            &agent_name_env_var(key),
        ));
    }

    fields.extend([
        Field::new("server.bind_address", &config.server.bind_address, "COPILOT_SERVER_BIND_ADDRESS"),
        Field::new("server.port", config.server.port.to_string(), "COPILOT_SERVER_PORT"),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "COPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        Field::new("logging.level", &config.logging.level, "COPILOT_LOGGING_LEVEL")
            .with_alias("COPILOT_LOG_LEVEL"),
        Field::new(
            "logging.format",
            config.logging.format.as_str(),
            "COPILOT_LOGGING_FORMAT",
        )
        .with_alias("COPILOT_LOG_FORMAT"),
    ]);

    fields
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("copilot.toml"), PathBuf::from("config/copilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[String],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key.as_str()).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
