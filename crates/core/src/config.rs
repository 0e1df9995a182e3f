use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub pricing: PricingConfig,
    pub freshdesk: FreshdeskConfig,
    pub session: SessionConfig,
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
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub verify_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    /// CSV of single-unit prices keyed by reference code. Optional: when
    /// absent the dataset source is skipped and the chain starts at the API.
    pub dataset_path: Option<PathBuf>,
    pub api_base_url: String,
    pub api_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct FreshdeskConfig {
    pub enabled: bool,
    pub domain: Option<String>,
    pub api_key: Option<SecretString>,
    pub responder_id: Option<u64>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl_secs: u64,
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
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub pricing_dataset_path: Option<PathBuf>,
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
                url: "sqlite://bulkpix.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                access_token: String::new().into(),
                phone_number_id: String::new(),
                verify_token: String::new().into(),
                api_base_url: "https://graph.facebook.com/v21.0".to_string(),
            },
            pricing: PricingConfig {
                dataset_path: None,
                api_base_url: "https://qt-api.printerpix.co.uk/artwrap".to_string(),
                api_timeout_secs: 10,
            },
            freshdesk: FreshdeskConfig {
                enabled: false,
                domain: None,
                api_key: None,
                responder_id: None,
                timeout_secs: 10,
            },
            session: SessionConfig { ttl_secs: 3600 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("bulkpix.toml"));
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
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = access_token.into();
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = verify_token.into();
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(dataset_path) = pricing.dataset_path {
                self.pricing.dataset_path = Some(dataset_path);
            }
            if let Some(api_base_url) = pricing.api_base_url {
                self.pricing.api_base_url = api_base_url;
            }
            if let Some(api_timeout_secs) = pricing.api_timeout_secs {
                self.pricing.api_timeout_secs = api_timeout_secs;
            }
        }

        if let Some(freshdesk) = patch.freshdesk {
            if let Some(enabled) = freshdesk.enabled {
                self.freshdesk.enabled = enabled;
            }
            if let Some(domain) = freshdesk.domain {
                self.freshdesk.domain = Some(domain);
            }
            if let Some(api_key) = freshdesk.api_key {
                self.freshdesk.api_key = Some(api_key.into());
            }
            if let Some(responder_id) = freshdesk.responder_id {
                self.freshdesk.responder_id = Some(responder_id);
            }
            if let Some(timeout_secs) = freshdesk.timeout_secs {
                self.freshdesk.timeout_secs = timeout_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BULKPIX_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BULKPIX_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BULKPIX_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BULKPIX_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BULKPIX_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BULKPIX_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = value.into();
        }
        if let Some(value) = read_env("BULKPIX_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("BULKPIX_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = value.into();
        }
        if let Some(value) = read_env("BULKPIX_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }

        if let Some(value) = read_env("BULKPIX_PRICING_DATASET_PATH") {
            self.pricing.dataset_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BULKPIX_PRICING_API_BASE_URL") {
            self.pricing.api_base_url = value;
        }
        if let Some(value) = read_env("BULKPIX_PRICING_API_TIMEOUT_SECS") {
            self.pricing.api_timeout_secs =
                parse_u64("BULKPIX_PRICING_API_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BULKPIX_FRESHDESK_ENABLED") {
            self.freshdesk.enabled = parse_bool("BULKPIX_FRESHDESK_ENABLED", &value)?;
        }
        if let Some(value) = read_env("BULKPIX_FRESHDESK_DOMAIN") {
            self.freshdesk.domain = Some(value);
        }
        if let Some(value) = read_env("BULKPIX_FRESHDESK_API_KEY") {
            self.freshdesk.api_key = Some(value.into());
        }
        if let Some(value) = read_env("BULKPIX_FRESHDESK_RESPONDER_ID") {
            self.freshdesk.responder_id =
                Some(parse_u64("BULKPIX_FRESHDESK_RESPONDER_ID", &value)?);
        }

        if let Some(value) = read_env("BULKPIX_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("BULKPIX_SESSION_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("BULKPIX_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BULKPIX_SERVER_PORT") {
            self.server.port = parse_u16("BULKPIX_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BULKPIX_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BULKPIX_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BULKPIX_LOGGING_LEVEL").or_else(|| read_env("BULKPIX_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BULKPIX_LOGGING_FORMAT").or_else(|| read_env("BULKPIX_LOG_FORMAT"));
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
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = access_token.into();
        }
        if let Some(phone_number_id) = overrides.whatsapp_phone_number_id {
            self.whatsapp.phone_number_id = phone_number_id;
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = verify_token.into();
        }
        if let Some(dataset_path) = overrides.pricing_dataset_path {
            self.pricing.dataset_path = Some(dataset_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_pricing(&self.pricing)?;
        validate_freshdesk(&self.freshdesk)?;
        validate_session(&self.session)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("bulkpix.toml"), PathBuf::from("config/bulkpix.toml")]
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

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if whatsapp.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.access_token is required. Generate one in the Meta developer console \
             under WhatsApp > API Setup"
                .to_string(),
        ));
    }
    if whatsapp.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required. It is shown next to the test number in the \
             Meta developer console"
                .to_string(),
        ));
    }
    if whatsapp.verify_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required. It must match the token entered when \
             registering the webhook"
                .to_string(),
        ));
    }
    if !whatsapp.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if !pricing.api_base_url.starts_with("http://") && !pricing.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "pricing.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    // Network sources must fail fast and fall through, never hang the flow.
    if pricing.api_timeout_secs == 0 || pricing.api_timeout_secs > 30 {
        return Err(ConfigError::Validation(
            "pricing.api_timeout_secs must be in range 1..=30".to_string(),
        ));
    }

    Ok(())
}

fn validate_freshdesk(freshdesk: &FreshdeskConfig) -> Result<(), ConfigError> {
    if freshdesk.enabled {
        if freshdesk.domain.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true) {
            return Err(ConfigError::Validation(
                "freshdesk.enabled is true but freshdesk.domain is missing".to_string(),
            ));
        }
        let missing_key = freshdesk
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "freshdesk.enabled is true but freshdesk.api_key is missing".to_string(),
            ));
        }
    }

    if freshdesk.timeout_secs == 0 || freshdesk.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "freshdesk.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    // Below a minute sessions expire mid-conversation; above a day they
    // stop being "abandonment" cleanup.
    if session.ttl_secs < 60 || session.ttl_secs > 86_400 {
        return Err(ConfigError::Validation(
            "session.ttl_secs must be in range 60..=86400".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    pricing: Option<PricingPatch>,
    freshdesk: Option<FreshdeskPatch>,
    session: Option<SessionPatch>,
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
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    dataset_path: Option<PathBuf>,
    api_base_url: Option<String>,
    api_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FreshdeskPatch {
    enabled: Option<bool>,
    domain: Option<String>,
    api_key: Option<String>,
    responder_id: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    ttl_secs: Option<u64>,
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
