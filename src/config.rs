//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `BRANCH_KEY` and `BRANCH_SEARCH_LOG_LEVEL` env overrides.

use std::{
    env, fs,
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;

use crate::dispatch::PoolConfig;
use crate::error::AppError;
use crate::logger;
use crate::payload::{ConfigurationSource, keys, merge_extra};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Server endpoints. Populated from `[endpoints]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search_url: String,
    pub autosuggest_url: String,
    pub queryhint_url: String,
    /// The availability check lives at `{prefix}{branch_key}.json`.
    pub configuration_url_prefix: String,
}

impl Endpoints {
    pub fn configuration_url(&self, branch_key: &str) -> String {
        format!("{}{branch_key}.json", self.configuration_url_prefix)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            autosuggest_url: default_autosuggest_url(),
            queryhint_url: default_queryhint_url(),
            configuration_url_prefix: default_configuration_url_prefix(),
        }
    }
}

/// Dispatcher tuning. Populated from `[dispatch]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Per-attempt transport timeout.
    pub timeout: Duration,
    pub pool_size: usize,
    /// How long idle pool threads linger.
    pub keep_alive: Duration,
}

impl DispatchConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            size: self.pool_size,
            keep_alive: self.keep_alive,
            ..PoolConfig::default()
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(default_timeout_ms()),
            pool_size: default_pool_size(),
            keep_alive: Duration::from_secs(default_keep_alive_secs()),
        }
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub branch_key: String,
    pub country: Option<String>,
    /// Overrides the device locale when set.
    pub locale: Option<String>,
    pub gaid: Option<String>,
    pub limit_ad_tracking: bool,
    pub log_level: LevelFilter,
    /// Sent as `extra_data` on every request; request-level extras win.
    pub extra: Map<String, Value>,
    pub endpoints: Endpoints,
    pub dispatch: DispatchConfig,
}

impl SearchConfig {
    /// Defaults for everything but the key.
    pub fn new(branch_key: impl Into<String>) -> Self {
        Self {
            branch_key: branch_key.into(),
            country: None,
            locale: None,
            gaid: None,
            limit_ad_tracking: false,
            log_level: LevelFilter::INFO,
            extra: Map::new(),
            endpoints: Endpoints::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Live keys only; test keys are rejected by the search service.
    pub fn has_valid_key(&self) -> bool {
        self.branch_key.starts_with("key_live")
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl ConfigurationSource for SearchConfig {
    fn populate(&self, payload: &mut Map<String, Value>) {
        payload.insert(keys::BRANCH_KEY.into(), Value::from(self.branch_key.as_str()));
        if let Some(country) = &self.country {
            payload.insert(keys::COUNTRY.into(), Value::from(country.as_str()));
        }
        if let Some(locale) = &self.locale {
            payload.insert(keys::LOCALE.into(), Value::from(locale.as_str()));
        }
        if let Some(gaid) = &self.gaid {
            payload.insert(keys::GAID.into(), Value::from(gaid.as_str()));
        }
        payload.insert(keys::IS_LAT.into(), Value::from(u8::from(self.limit_ad_tracking)));
        merge_extra(payload, &self.extra);
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    search: RawSearch,
    #[serde(default)]
    endpoints: RawEndpoints,
    #[serde(default)]
    dispatch: RawDispatch,
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default)]
    branch_key: String,
    country: Option<String>,
    locale: Option<String>,
    gaid: Option<String>,
    #[serde(default)]
    limit_ad_tracking: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    extra: toml::Table,
}

impl Default for RawSearch {
    fn default() -> Self {
        Self {
            branch_key: String::new(),
            country: None,
            locale: None,
            gaid: None,
            limit_ad_tracking: false,
            log_level: default_log_level(),
            extra: toml::Table::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawEndpoints {
    #[serde(default = "default_search_url")]
    search_url: String,
    #[serde(default = "default_autosuggest_url")]
    autosuggest_url: String,
    #[serde(default = "default_queryhint_url")]
    queryhint_url: String,
    #[serde(default = "default_configuration_url_prefix")]
    configuration_url_prefix: String,
}

impl Default for RawEndpoints {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            autosuggest_url: default_autosuggest_url(),
            queryhint_url: default_queryhint_url(),
            configuration_url_prefix: default_configuration_url_prefix(),
        }
    }
}

#[derive(Deserialize)]
struct RawDispatch {
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_pool_size")]
    pool_size: usize,
    #[serde(default = "default_keep_alive_secs")]
    keep_alive_secs: u64,
}

impl Default for RawDispatch {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            pool_size: default_pool_size(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_search_url() -> String { "https://vulcan.branch.io/v1/search/".to_string() }
fn default_autosuggest_url() -> String { "https://vulcan.branch.io/v2/autosuggest".to_string() }
fn default_queryhint_url() -> String { "https://vulcan.branch.io/v2/queryhint".to_string() }
fn default_configuration_url_prefix() -> String { "https://vulcan.branch.io/configuration/".to_string() }
fn default_timeout_ms() -> u64 { 6000 }
fn default_pool_size() -> usize { 6 }
fn default_keep_alive_secs() -> u64 { 5 }

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<SearchConfig, AppError> {
    load_path(Path::new(DEFAULT_CONFIG_PATH))
}

/// Load from an explicit path, still honouring the env overrides.
pub fn load_path(path: &Path) -> Result<SearchConfig, AppError> {
    let key_override = env::var("BRANCH_KEY").ok();
    let log_level_override = env::var("BRANCH_SEARCH_LOG_LEVEL").ok();
    load_from(path, key_override.as_deref(), log_level_override.as_deref())
}

/// Internal loader. Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    key_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<SearchConfig, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.search;
    let d = parsed.dispatch;
    if d.pool_size == 0 {
        return Err(AppError::Config("dispatch.pool_size must be at least 1".into()));
    }

    let log_level = logger::parse_level(log_level_override.unwrap_or(&s.log_level))
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{msg} in {}", path.display())),
            other => other,
        })?;

    let extra = serde_json::to_value(s.extra)
        .map_err(|e| AppError::Config(format!("invalid [search.extra] in {}: {e}", path.display())))?;

    Ok(SearchConfig {
        branch_key: key_override.unwrap_or(&s.branch_key).to_string(),
        country: s.country.filter(|c| !c.is_empty()),
        locale: s.locale.filter(|l| !l.is_empty()),
        gaid: s.gaid.filter(|g| !g.is_empty()),
        limit_ad_tracking: s.limit_ad_tracking,
        log_level,
        extra: match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        endpoints: Endpoints {
            search_url: parsed.endpoints.search_url,
            autosuggest_url: parsed.endpoints.autosuggest_url,
            queryhint_url: parsed.endpoints.queryhint_url,
            configuration_url_prefix: parsed.endpoints.configuration_url_prefix,
        },
        dispatch: DispatchConfig {
            timeout: Duration::from_millis(d.timeout_ms),
            pool_size: d.pool_size,
            keep_alive: Duration::from_secs(d.keep_alive_secs),
        },
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `SearchConfig` for unit tests: live-shaped key, local endpoints.
#[cfg(test)]
impl SearchConfig {
    pub fn test_default() -> Self {
        let mut config = Self::new("key_live_test");
        config.endpoints = Endpoints {
            search_url: "http://localhost:0/v1/search/".into(),
            autosuggest_url: "http://localhost:0/v2/autosuggest".into(),
            queryhint_url: "http://localhost:0/v2/queryhint".into(),
            configuration_url_prefix: "http://localhost:0/configuration/".into(),
        };
        config.dispatch.timeout = Duration::from_secs(1);
        config.dispatch.pool_size = 2;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[search]
branch_key = "key_live_abc"
country = "US"
log_level = "info"

[search.extra]
theme = "light"
size = "small"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.branch_key, "key_live_abc");
        assert_eq!(cfg.country.as_deref(), Some("US"));
        assert_eq!(cfg.locale, None);
        assert_eq!(cfg.extra["size"], json!("small"));
        assert!(cfg.has_valid_key());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.endpoints, Endpoints::default());
        assert_eq!(cfg.dispatch, DispatchConfig::default());
        assert_eq!(cfg.dispatch.timeout, Duration::from_millis(6000));
        assert_eq!(cfg.dispatch.pool_size, 6);
        assert_eq!(cfg.log_level, LevelFilter::INFO);
        assert!(!cfg.has_valid_key());
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn zero_pool_size_rejected() {
        let f = write_toml("[dispatch]\npool_size = 0\n");
        assert!(matches!(load_from(f.path(), None, None), Err(AppError::Config(_))));
    }

    #[test]
    fn key_and_log_level_overrides() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("key_live_env"), Some("debug")).unwrap();
        assert_eq!(cfg.branch_key, "key_live_env");
        assert_eq!(cfg.log_level, LevelFilter::DEBUG);
    }

    #[test]
    fn unknown_log_level_rejected() {
        let f = write_toml("[search]\nlog_level = \"verbose\"\n");
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(matches!(&err, AppError::Config(msg) if msg.contains("verbose")), "{err}");

        let f = write_toml(MINIMAL_TOML);
        assert!(matches!(load_from(f.path(), None, Some("loud")), Err(AppError::Config(_))));
    }

    #[test]
    fn test_keys_are_not_valid() {
        assert!(!SearchConfig::new("key_test_abc").has_valid_key());
        assert!(SearchConfig::new("key_live_abc").has_valid_key());
    }

    #[test]
    fn configuration_url_appends_key() {
        let e = Endpoints::default();
        assert_eq!(e.configuration_url("key_live_x"), "https://vulcan.branch.io/configuration/key_live_x.json");
    }

    #[test]
    fn populate_writes_configuration_fields() {
        let mut cfg = SearchConfig::test_default().with_extra("size", "small");
        cfg.gaid = Some("ad-id".into());
        cfg.limit_ad_tracking = true;
        let mut payload = Map::new();
        payload.insert(keys::LOCALE.into(), json!("en-US"));
        cfg.populate(&mut payload);
        assert_eq!(payload["branch_key"], json!("key_live_test"));
        assert_eq!(payload["gaid"], json!("ad-id"));
        assert_eq!(payload["is_lat"], json!(1));
        // Device locale survives when the configuration does not set one.
        assert_eq!(payload["locale"], json!("en-US"));
        assert!(payload.get("country").is_none());
        assert_eq!(payload["extra_data"], json!({"size": "small"}));
    }
}
