use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use boqtrack_core::config::AppConfig;
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        effective_entries(&config),
    )
}

pub fn effective_entries(config: &AppConfig) -> Vec<ConfigEntry> {
    let path = detect_config_path();
    let doc = load_config_file_doc(path.as_deref());
    let sources = SourceResolver { doc: doc.as_ref(), path: path.as_deref() };

    vec![
        sources.entry(
            "database.url",
            &["BOQTRACK_DATABASE_URL"],
            redact_url(&config.database.url),
        ),
        sources.entry(
            "database.max_connections",
            &["BOQTRACK_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        sources.entry(
            "database.timeout_secs",
            &["BOQTRACK_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        sources.entry(
            "logging.level",
            &["BOQTRACK_LOGGING_LEVEL", "BOQTRACK_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        sources.entry(
            "logging.format",
            &["BOQTRACK_LOGGING_FORMAT", "BOQTRACK_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
        sources.entry(
            "procurement.purchase_order_prefix",
            &["BOQTRACK_PROCUREMENT_PURCHASE_ORDER_PREFIX"],
            config.procurement.purchase_order_prefix.clone(),
        ),
        sources.entry(
            "procurement.request_prefix",
            &["BOQTRACK_PROCUREMENT_REQUEST_PREFIX"],
            config.procurement.request_prefix.clone(),
        ),
        sources.entry(
            "procurement.sequence_width",
            &["BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH"],
            config.procurement.sequence_width.to_string(),
        ),
        sources.entry(
            "duplicates.enabled",
            &["BOQTRACK_DUPLICATES_ENABLED"],
            config.duplicates.enabled.to_string(),
        ),
        sources.entry(
            "duplicates.require_material_match",
            &["BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH"],
            config.duplicates.require_material_match.to_string(),
        ),
    ]
}

struct SourceResolver<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl SourceResolver<'_> {
    fn entry(&self, key: &'static str, env_keys: &[&str], value: String) -> ConfigEntry {
        ConfigEntry { key, value, source: self.source(key, env_keys) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    ["boqtrack.toml", "config/boqtrack.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
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

/// Hides credentials embedded in a connection string.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://<redacted>{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
