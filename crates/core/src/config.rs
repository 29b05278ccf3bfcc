use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duplicates::DuplicateDetectorConfig;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub procurement: ProcurementConfig,
    pub duplicates: DuplicateDetectorConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcurementConfig {
    pub purchase_order_prefix: String,
    pub request_prefix: String,
    pub sequence_width: usize,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            purchase_order_prefix: "PO".to_string(),
            request_prefix: "BOQ".to_string(),
            sequence_width: 4,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub require_material_match: Option<bool>,
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
                url: "sqlite://boqtrack.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            procurement: ProcurementConfig::default(),
            duplicates: DuplicateDetectorConfig::default(),
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("boqtrack.toml"));
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(procurement) = patch.procurement {
            if let Some(prefix) = procurement.purchase_order_prefix {
                self.procurement.purchase_order_prefix = prefix;
            }
            if let Some(prefix) = procurement.request_prefix {
                self.procurement.request_prefix = prefix;
            }
            if let Some(width) = procurement.sequence_width {
                self.procurement.sequence_width = width;
            }
        }

        if let Some(duplicates) = patch.duplicates {
            if let Some(enabled) = duplicates.enabled {
                self.duplicates.enabled = enabled;
            }
            if let Some(require_material_match) = duplicates.require_material_match {
                self.duplicates.require_material_match = require_material_match;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOQTRACK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BOQTRACK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("BOQTRACK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BOQTRACK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("BOQTRACK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("BOQTRACK_LOGGING_LEVEL").or_else(|| read_env("BOQTRACK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOQTRACK_LOGGING_FORMAT").or_else(|| read_env("BOQTRACK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("BOQTRACK_PROCUREMENT_PURCHASE_ORDER_PREFIX") {
            self.procurement.purchase_order_prefix = value;
        }
        if let Some(value) = read_env("BOQTRACK_PROCUREMENT_REQUEST_PREFIX") {
            self.procurement.request_prefix = value;
        }
        if let Some(value) = read_env("BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH") {
            self.procurement.sequence_width =
                parse_value("BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH", &value)?;
        }

        if let Some(value) = read_env("BOQTRACK_DUPLICATES_ENABLED") {
            self.duplicates.enabled = parse_value("BOQTRACK_DUPLICATES_ENABLED", &value)?;
        }
        if let Some(value) = read_env("BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH") {
            self.duplicates.require_material_match =
                parse_value("BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH", &value)?;
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(require_material_match) = overrides.require_material_match {
            self.duplicates.require_material_match = require_material_match;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_procurement(&self.procurement)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("boqtrack.toml"), PathBuf::from("config/boqtrack.toml")]
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_procurement(procurement: &ProcurementConfig) -> Result<(), ConfigError> {
    for (field, prefix) in [
        ("procurement.purchase_order_prefix", &procurement.purchase_order_prefix),
        ("procurement.request_prefix", &procurement.request_prefix),
    ] {
        let valid = !prefix.is_empty()
            && prefix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid {
            return Err(ConfigError::Validation(format!(
                "{field} must be non-empty and contain only letters, digits, or `_`"
            )));
        }
    }

    if procurement.purchase_order_prefix == procurement.request_prefix {
        return Err(ConfigError::Validation(
            "procurement.purchase_order_prefix and procurement.request_prefix must differ"
                .to_string(),
        ));
    }

    if !(1..=9).contains(&procurement.sequence_width) {
        return Err(ConfigError::Validation(
            "procurement.sequence_width must be in range 1..=9".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    procurement: Option<ProcurementPatch>,
    duplicates: Option<DuplicatesPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcurementPatch {
    purchase_order_prefix: Option<String>,
    request_prefix: Option<String>,
    sequence_width: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DuplicatesPatch {
    enabled: Option<bool>,
    require_material_match: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "BOQTRACK_DATABASE_URL",
        "BOQTRACK_LOG_LEVEL",
        "BOQTRACK_LOG_FORMAT",
        "BOQTRACK_LOGGING_LEVEL",
        "BOQTRACK_LOGGING_FORMAT",
        "BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH",
        "BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH",
        "TEST_BOQTRACK_DB_FILE",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in MANAGED_VARS {
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
    fn defaults_are_valid_and_preserve_advisory_duplicates() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.duplicates.enabled, "duplicate detection should be on by default")?;
        ensure(
            !config.duplicates.require_material_match,
            "empty material overlaps should be reported by default",
        )?;
        ensure(config.procurement.purchase_order_prefix == "PO", "default PO prefix")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format compact")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("TEST_BOQTRACK_DB_FILE", "from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("boqtrack.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_BOQTRACK_DB_FILE}"

[duplicates]
require_material_match = true
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env.db",
                "database url should be interpolated from environment",
            )?;
            ensure(
                config.duplicates.require_material_match,
                "file should switch on material matching",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BOQTRACK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BOQTRACK_LOG_LEVEL", "warn");
        env::set_var("BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH", "6");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("boqtrack.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "error"

[procurement]
purchase_order_prefix = "LPO"
sequence_width = 5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "warn", "env log level should win over file")?;
            ensure(config.procurement.sequence_width == 6, "env width should win over file")?;
            ensure(
                config.procurement.purchase_order_prefix == "LPO",
                "file prefix should win over defaults",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn invalid_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH", "sometimes");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override to fail".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars();
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH", "0");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message)
                        if message.contains("procurement.sequence_width")
                ),
                "validation failure should mention procurement.sequence_width",
            ),
        };

        clear_vars();
        result
    }

    #[test]
    fn non_sqlite_database_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/boq".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("database.url")
            ),
            "postgres url should fail sqlite validation",
        )
    }
}
