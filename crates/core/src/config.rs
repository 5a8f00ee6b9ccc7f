use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub calendar: CalendarConfig,
    pub knowledge: KnowledgeConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_token: SecretString,
    pub phone_number_id: String,
    pub verify_token: SecretString,
    pub api_version: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    /// Calendar proxy base URL; `None` keeps bookings in process memory.
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub business_id: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct KnowledgeConfig {
    pub enabled: bool,
    pub vector_query_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub embedding_model: String,
    pub top_k: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_turns: usize,
    pub summarize_on_exhaustion: bool,
    pub tool_timeout_secs: u64,
    pub default_time_zone: String,
    pub assistant_instructions: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub whatsapp_api_token: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub calendar_base_url: Option<String>,
    pub business_id: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://concierge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                api_token: String::new().into(),
                phone_number_id: String::new(),
                verify_token: String::new().into(),
                api_version: "v22.0".to_string(),
                base_url: "https://graph.facebook.com".to_string(),
                timeout_secs: 15,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-2.0-flash".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            calendar: CalendarConfig {
                base_url: None,
                api_token: None,
                business_id: String::new(),
                timeout_secs: 15,
            },
            knowledge: KnowledgeConfig {
                enabled: false,
                vector_query_url: None,
                api_token: None,
                embedding_model: "text-embedding-004".to_string(),
                top_k: 2,
                timeout_secs: 15,
            },
            agent: AgentConfig {
                max_turns: 5,
                summarize_on_exhaustion: false,
                tool_timeout_secs: 20,
                default_time_zone: "UTC".to_string(),
                assistant_instructions: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                queue_capacity: 256,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AgentConfig {
    /// Zone used when a calendar service does not declare its own.
    pub fn time_zone(&self) -> Tz {
        self.default_time_zone.parse().unwrap_or(Tz::UTC)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("concierge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(api_token) = whatsapp.api_token {
                self.whatsapp.api_token = secret_value(api_token);
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token);
            }
            if let Some(api_version) = whatsapp.api_version {
                self.whatsapp.api_version = api_version;
            }
            if let Some(base_url) = whatsapp.base_url {
                self.whatsapp.base_url = base_url;
            }
            if let Some(timeout_secs) = whatsapp.timeout_secs {
                self.whatsapp.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(base_url) = calendar.base_url {
                self.calendar.base_url = Some(base_url);
            }
            if let Some(api_token) = calendar.api_token {
                self.calendar.api_token = Some(secret_value(api_token));
            }
            if let Some(business_id) = calendar.business_id {
                self.calendar.business_id = business_id;
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
        }

        if let Some(knowledge) = patch.knowledge {
            if let Some(enabled) = knowledge.enabled {
                self.knowledge.enabled = enabled;
            }
            if let Some(vector_query_url) = knowledge.vector_query_url {
                self.knowledge.vector_query_url = Some(vector_query_url);
            }
            if let Some(api_token) = knowledge.api_token {
                self.knowledge.api_token = Some(secret_value(api_token));
            }
            if let Some(embedding_model) = knowledge.embedding_model {
                self.knowledge.embedding_model = embedding_model;
            }
            if let Some(top_k) = knowledge.top_k {
                self.knowledge.top_k = top_k;
            }
            if let Some(timeout_secs) = knowledge.timeout_secs {
                self.knowledge.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_turns) = agent.max_turns {
                self.agent.max_turns = max_turns;
            }
            if let Some(summarize) = agent.summarize_on_exhaustion {
                self.agent.summarize_on_exhaustion = summarize;
            }
            if let Some(tool_timeout_secs) = agent.tool_timeout_secs {
                self.agent.tool_timeout_secs = tool_timeout_secs;
            }
            if let Some(default_time_zone) = agent.default_time_zone {
                self.agent.default_time_zone = default_time_zone;
            }
            if let Some(instructions) = agent.assistant_instructions {
                self.agent.assistant_instructions = Some(instructions);
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
            if let Some(queue_capacity) = server.queue_capacity {
                self.server.queue_capacity = queue_capacity;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CONCIERGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("CONCIERGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("CONCIERGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_WHATSAPP_API_TOKEN") {
            self.whatsapp.api_token = secret_value(value);
        }
        if let Some(value) = read_env("CONCIERGE_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("CONCIERGE_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }
        if let Some(value) = read_env("CONCIERGE_WHATSAPP_API_VERSION") {
            self.whatsapp.api_version = value;
        }
        if let Some(value) = read_env("CONCIERGE_WHATSAPP_BASE_URL") {
            self.whatsapp.base_url = value;
        }

        if let Some(value) = read_env("CONCIERGE_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("CONCIERGE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("CONCIERGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("CONCIERGE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_CALENDAR_BASE_URL") {
            self.calendar.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_CALENDAR_API_TOKEN") {
            self.calendar.api_token = Some(secret_value(value));
        }
        let business_id =
            read_env("CONCIERGE_CALENDAR_BUSINESS_ID").or_else(|| read_env("CONCIERGE_BUSINESS_ID"));
        if let Some(value) = business_id {
            self.calendar.business_id = value;
        }

        if let Some(value) = read_env("CONCIERGE_KNOWLEDGE_ENABLED") {
            self.knowledge.enabled = parse_env("CONCIERGE_KNOWLEDGE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_KNOWLEDGE_VECTOR_QUERY_URL") {
            self.knowledge.vector_query_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_KNOWLEDGE_API_TOKEN") {
            self.knowledge.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("CONCIERGE_AGENT_MAX_TURNS") {
            self.agent.max_turns = parse_env("CONCIERGE_AGENT_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_SUMMARIZE_ON_EXHAUSTION") {
            self.agent.summarize_on_exhaustion =
                parse_env("CONCIERGE_AGENT_SUMMARIZE_ON_EXHAUSTION", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_TOOL_TIMEOUT_SECS") {
            self.agent.tool_timeout_secs = parse_env("CONCIERGE_AGENT_TOOL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_DEFAULT_TIME_ZONE") {
            self.agent.default_time_zone = value;
        }

        if let Some(value) = read_env("CONCIERGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_PORT") {
            self.server.port = parse_env("CONCIERGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_QUEUE_CAPACITY") {
            self.server.queue_capacity = parse_env("CONCIERGE_SERVER_QUEUE_CAPACITY", &value)?;
        }

        let log_level =
            read_env("CONCIERGE_LOGGING_LEVEL").or_else(|| read_env("CONCIERGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONCIERGE_LOGGING_FORMAT").or_else(|| read_env("CONCIERGE_LOG_FORMAT"));
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
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(api_token) = overrides.whatsapp_api_token {
            self.whatsapp.api_token = secret_value(api_token);
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
        if let Some(base_url) = overrides.calendar_base_url {
            self.calendar.base_url = Some(base_url);
        }
        if let Some(business_id) = overrides.business_id {
            self.calendar.business_id = business_id;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_calendar(&self.calendar)?;
        validate_knowledge(&self.knowledge)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
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

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(validation(format!("{key} must start with http:// or https://")))
    }
}

fn require_timeout(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        ));
    }

    if database.max_connections == 0 {
        return Err(validation("database.max_connections must be greater than zero"));
    }

    require_timeout("database.timeout_secs", database.timeout_secs)
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if whatsapp.api_token.expose_secret().trim().is_empty() {
        return Err(validation(
            "whatsapp.api_token is required. Get it from Meta for Developers > Your App > WhatsApp > API Setup",
        ));
    }

    let phone_number_id = whatsapp.phone_number_id.trim();
    if phone_number_id.is_empty() {
        return Err(validation(
            "whatsapp.phone_number_id is required. It is listed under WhatsApp > API Setup > Phone number ID",
        ));
    }
    if !phone_number_id.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(validation(
            "whatsapp.phone_number_id must be numeric (hint: use the phone number ID, not the phone number)",
        ));
    }

    if whatsapp.verify_token.expose_secret().trim().is_empty() {
        return Err(validation(
            "whatsapp.verify_token is required; it must match the token configured for the webhook",
        ));
    }

    require_http_url("whatsapp.base_url", &whatsapp.base_url)?;
    require_timeout("whatsapp.timeout_secs", whatsapp.timeout_secs)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    require_timeout("llm.timeout_secs", llm.timeout_secs)?;

    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(validation("llm.api_key is required to call the generative language API"));
    }
    if llm.model.trim().is_empty() {
        return Err(validation("llm.model must not be empty"));
    }

    require_http_url("llm.base_url", &llm.base_url)
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.business_id.trim().is_empty() {
        return Err(validation(
            "calendar.business_id is required; it selects which business's calendar services are bookable",
        ));
    }
    if let Some(base_url) = &calendar.base_url {
        require_http_url("calendar.base_url", base_url)?;
    }
    require_timeout("calendar.timeout_secs", calendar.timeout_secs)
}

fn validate_knowledge(knowledge: &KnowledgeConfig) -> Result<(), ConfigError> {
    if knowledge.enabled {
        let url = knowledge
            .vector_query_url
            .as_deref()
            .ok_or_else(|| validation("knowledge.enabled is true but knowledge.vector_query_url is missing"))?;
        require_http_url("knowledge.vector_query_url", url)?;

        let missing_token = knowledge
            .api_token
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_token {
            return Err(validation("knowledge.enabled is true but knowledge.api_token is missing"));
        }
    }

    if knowledge.top_k == 0 {
        return Err(validation("knowledge.top_k must be greater than zero"));
    }
    require_timeout("knowledge.timeout_secs", knowledge.timeout_secs)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_turns == 0 || agent.max_turns > 20 {
        return Err(validation("agent.max_turns must be in range 1..=20"));
    }
    require_timeout("agent.tool_timeout_secs", agent.tool_timeout_secs)?;

    if agent.default_time_zone.parse::<Tz>().is_err() {
        return Err(validation(format!(
            "agent.default_time_zone `{}` is not an IANA time zone (e.g. America/Mexico_City)",
            agent.default_time_zone
        )));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(validation("server.port must be greater than zero"));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(validation("server.graceful_shutdown_secs must be greater than zero"));
    }

    if server.queue_capacity == 0 {
        return Err(validation("server.queue_capacity must be greater than zero"));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validation("logging.level must be one of trace|debug|info|warn|error")),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    calendar: Option<CalendarPatch>,
    knowledge: Option<KnowledgePatch>,
    agent: Option<AgentPatch>,
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
struct WhatsAppPatch {
    api_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    api_version: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    business_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgePatch {
    enabled: Option<bool>,
    vector_query_url: Option<String>,
    api_token: Option<String>,
    embedding_model: Option<String>,
    top_k: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_turns: Option<usize>,
    summarize_on_exhaustion: Option<bool>,
    tool_timeout_secs: Option<u64>,
    default_time_zone: Option<String>,
    assistant_instructions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED: [(&str, &str); 5] = [
        ("CONCIERGE_WHATSAPP_API_TOKEN", "EAAG-test-token"),
        ("CONCIERGE_WHATSAPP_PHONE_NUMBER_ID", "1234567890"),
        ("CONCIERGE_WHATSAPP_VERIFY_TOKEN", "verify-me"),
        ("CONCIERGE_LLM_API_KEY", "gemini-test-key"),
        ("CONCIERGE_CALENDAR_BUSINESS_ID", "biz-1"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required() {
        for (key, value) in REQUIRED {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for (key, _) in REQUIRED {
            env::remove_var(key);
        }
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WA_TOKEN", "EAAG-from-env");
        env::set_var("TEST_GEMINI_KEY", "gemini-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
api_token = "${TEST_WA_TOKEN}"
phone_number_id = "555000111"
verify_token = "hook-secret"

[llm]
api_key = "${TEST_GEMINI_KEY}"

[calendar]
business_id = "clinic-1"
base_url = "https://calendar.example.com"

[agent]
max_turns = 3
default_time_zone = "America/Mexico_City"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.api_token.expose_secret() == "EAAG-from-env",
                "whatsapp token should be loaded from environment",
            )?;
            ensure(
                config.llm.api_key.expose_secret() == "gemini-from-env",
                "llm key should be loaded from environment",
            )?;
            ensure(config.agent.max_turns == 3, "agent.max_turns should come from the file")?;
            ensure(
                config.agent.time_zone() == chrono_tz::Tz::America__Mexico_City,
                "default time zone should parse",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_WA_TOKEN", "TEST_GEMINI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("CONCIERGE_LOG_LEVEL", "warn");
        env::set_var("CONCIERGE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_LOG_LEVEL", "CONCIERGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("CONCIERGE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CONCIERGE_SERVER_PORT", "9090");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[whatsapp]
api_token = "EAAG-from-file"

[server]
port = 7070

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file")?;
            ensure(
                config.whatsapp.api_token.expose_secret() == "EAAG-test-token",
                "env whatsapp token should win over file and defaults",
            )?;
            ensure(config.calendar.base_url.is_none(), "calendar base url defaults to none")?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_DATABASE_URL", "CONCIERGE_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("CONCIERGE_WHATSAPP_PHONE_NUMBER_ID", "+52 55 1234 5678");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("whatsapp.phone_number_id")
            );
            ensure(has_message, "validation failure should mention whatsapp.phone_number_id")
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn knowledge_requires_endpoint_when_enabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("CONCIERGE_KNOWLEDGE_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("knowledge without endpoint should not validate".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("vector_query_url")),
                "validation failure should mention knowledge.vector_query_url",
            )
        })();

        clear_vars(&["CONCIERGE_KNOWLEDGE_ENABLED"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("CONCIERGE_AGENT_MAX_TURNS", "five");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("non-numeric max turns should not load".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "CONCIERGE_AGENT_MAX_TURNS"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CONCIERGE_AGENT_MAX_TURNS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("EAAG-test-token"), "debug output should not contain api token")?;
            ensure(!debug.contains("verify-me"), "debug output should not contain verify token")?;
            ensure(!debug.contains("gemini-test-key"), "debug output should not contain llm key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[]);
        result
    }
}
