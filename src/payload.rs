//! Outgoing payload assembly.
//!
//! A payload is one JSON object built in three passes: the request writes its
//! own fields, then the device-info source, then the configuration source.
//! The configuration pass merges its `extra_data` entries under any keys the
//! request already set, so request-level extras win.

use serde_json::{Map, Value};

/// Wire field names. These are part of the compatibility surface.
pub mod keys {
    pub const USER_QUERY: &str = "user_query";
    pub const LIMIT_APP_RESULTS: &str = "limit_app_results";
    pub const LIMIT_LINK_RESULTS: &str = "limit_link_results";
    pub const DO_NOT_MODIFY: &str = "do_not_modify";
    pub const QUERY_SOURCE: &str = "query_source";
    pub const LATITUDE: &str = "user_latitude";
    pub const LONGITUDE: &str = "user_longitude";
    pub const TIMESTAMP: &str = "utc_timestamp";
    pub const EXTRA_DATA: &str = "extra_data";
    pub const LAST_RTT: &str = "lr_rtt";

    pub const BRANCH_KEY: &str = "branch_key";
    pub const COUNTRY: &str = "country";
    pub const GAID: &str = "gaid";
    pub const IS_LAT: &str = "is_lat";
    pub const LOCALE: &str = "locale";

    pub const BRAND: &str = "brand";
    pub const MODEL: &str = "model";
    pub const OS: &str = "os";
    pub const OS_VERSION: &str = "os_version";
    pub const CARRIER: &str = "carrier";
    pub const SDK: &str = "sdk";
    pub const SDK_VERSION: &str = "sdk_version";
    pub const APP_PACKAGE: &str = "app_package";
    pub const APP_VERSION: &str = "app_version";
    pub const SCREEN_DPI: &str = "screen_dpi";
    pub const SCREEN_WIDTH: &str = "screen_width";
    pub const SCREEN_HEIGHT: &str = "screen_height";
}

pub const DEFAULT_MAX_APP_RESULTS: u32 = 5;
pub const DEFAULT_MAX_CONTENT_PER_APP: u32 = 5;

/// Where the query text of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuerySource {
    /// Picked from the results of a query-hint call.
    QueryHintResults,
    /// Picked from the results of an autosuggest call.
    AutosuggestResults,
    #[default]
    Unspecified,
}

impl QuerySource {
    pub fn as_str(self) -> &'static str {
        match self {
            QuerySource::QueryHintResults => "query_hint",
            QuerySource::AutosuggestResults => "autosuggest",
            QuerySource::Unspecified => "unspecified",
        }
    }
}

/// A request that can write its own fields into a payload.
pub trait RequestFields {
    fn write_fields(&self, payload: &mut Map<String, Value>);
}

/// Externally owned device metadata.
pub trait DeviceInfoSource: Send + Sync {
    fn populate(&self, payload: &mut Map<String, Value>);
}

/// Externally owned client configuration.
pub trait ConfigurationSource: Send + Sync {
    fn populate(&self, payload: &mut Map<String, Value>);
}

/// Location and extras shared by every discovery request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub latitude: f64,
    pub longitude: f64,
    pub extra: Map<String, Value>,
}

impl Discovery {
    fn write_fields(&self, payload: &mut Map<String, Value>) {
        payload.insert(keys::LATITUDE.into(), Value::from(self.latitude));
        payload.insert(keys::LONGITUDE.into(), Value::from(self.longitude));
        payload.insert(keys::TIMESTAMP.into(), Value::from(chrono::Utc::now().timestamp_millis()));
        if !self.extra.is_empty() {
            payload.insert(keys::EXTRA_DATA.into(), Value::Object(self.extra.clone()));
        }
    }
}

/// Search or autosuggest request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub max_app_results: u32,
    pub max_content_per_app: u32,
    pub do_not_modify: bool,
    pub query_source: QuerySource,
    pub discovery: Discovery,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_app_results: DEFAULT_MAX_APP_RESULTS,
            max_content_per_app: DEFAULT_MAX_CONTENT_PER_APP,
            do_not_modify: false,
            query_source: QuerySource::Unspecified,
            discovery: Discovery::default(),
        }
    }

    /// Ask the server not to rewrite the query (e.g. typo correction).
    pub fn disable_query_modification(mut self) -> Self {
        self.do_not_modify = true;
        self
    }

    pub fn with_max_app_results(mut self, max: u32) -> Self {
        self.max_app_results = max;
        self
    }

    pub fn with_max_content_per_app(mut self, max: u32) -> Self {
        self.max_content_per_app = max;
        self
    }

    pub fn with_query_source(mut self, source: QuerySource) -> Self {
        self.query_source = source;
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.discovery.latitude = latitude;
        self.discovery.longitude = longitude;
        self
    }

    /// Request-level extra data; overrides configuration extras with the same key.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.discovery.extra.insert(key.into(), value.into());
        self
    }
}

impl RequestFields for SearchRequest {
    fn write_fields(&self, payload: &mut Map<String, Value>) {
        self.discovery.write_fields(payload);
        payload.insert(keys::LIMIT_APP_RESULTS.into(), Value::from(self.max_app_results));
        payload.insert(keys::LIMIT_LINK_RESULTS.into(), Value::from(self.max_content_per_app));
        payload.insert(keys::USER_QUERY.into(), Value::from(self.query.as_str()));
        if self.do_not_modify {
            payload.insert(keys::DO_NOT_MODIFY.into(), Value::Bool(true));
        }
        payload.insert(keys::QUERY_SOURCE.into(), Value::from(self.query_source.as_str()));
    }
}

/// Query-hint request: location and extras only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryHintRequest {
    pub discovery: Discovery,
}

impl QueryHintRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.discovery.latitude = latitude;
        self.discovery.longitude = longitude;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.discovery.extra.insert(key.into(), value.into());
        self
    }
}

impl RequestFields for QueryHintRequest {
    fn write_fields(&self, payload: &mut Map<String, Value>) {
        self.discovery.write_fields(payload);
    }
}

/// Merge `extras` into the payload's `extra_data`, keeping keys already present.
pub fn merge_extra(payload: &mut Map<String, Value>, extras: &Map<String, Value>) {
    if extras.is_empty() {
        return;
    }
    let entry = payload
        .entry(keys::EXTRA_DATA)
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(existing) = entry {
        for (key, value) in extras {
            existing.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Build the full outgoing JSON object for one request.
pub fn assemble(
    request: &dyn RequestFields,
    device: &dyn DeviceInfoSource,
    config: &dyn ConfigurationSource,
) -> Value {
    let mut payload = Map::new();
    request.write_fields(&mut payload);
    device.populate(&mut payload);
    config.populate(&mut payload);
    Value::Object(payload)
}

// ── Device info ───────────────────────────────────────────────────────────────

pub const UNKNOWN_CARRIER: &str = "bnc_no_value";
pub const DEFAULT_LOCALE: &str = "en-US";
pub const SDK_NAME: &str = "discovery_rust";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub dpi: u32,
    pub width: u32,
    pub height: u32,
}

/// Host/device description written into every payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
    pub os: String,
    pub os_version: String,
    pub carrier: String,
    pub locale: String,
    pub sdk_version: String,
    pub app_package: Option<String>,
    pub app_version: Option<String>,
    pub screen: Option<ScreenMetrics>,
}

impl DeviceInfo {
    /// Describe the current host as far as it can be known without platform APIs.
    pub fn detect() -> Self {
        let locale = std::env::var("LANG")
            .ok()
            .and_then(|lang| locale_from_lang(&lang))
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        Self {
            brand: "unknown".to_string(),
            model: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_uppercase(),
            os_version: std::env::consts::FAMILY.to_string(),
            carrier: UNKNOWN_CARRIER.to_string(),
            locale,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            app_package: Some(env!("CARGO_PKG_NAME").to_string()),
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            screen: None,
        }
    }
}

/// `en_GB.UTF-8` → `en-GB`. Returns `None` for `C`/`POSIX`/empty values.
fn locale_from_lang(lang: &str) -> Option<String> {
    let base = lang.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

impl DeviceInfoSource for DeviceInfo {
    fn populate(&self, payload: &mut Map<String, Value>) {
        payload.insert(keys::BRAND.into(), Value::from(self.brand.as_str()));
        payload.insert(keys::CARRIER.into(), Value::from(self.carrier.as_str()));
        payload.insert(keys::LOCALE.into(), Value::from(self.locale.as_str()));
        payload.insert(keys::MODEL.into(), Value::from(self.model.as_str()));
        payload.insert(keys::OS_VERSION.into(), Value::from(self.os_version.as_str()));
        payload.insert(keys::OS.into(), Value::from(self.os.as_str()));
        payload.insert(keys::SDK.into(), Value::from(SDK_NAME));
        payload.insert(keys::SDK_VERSION.into(), Value::from(self.sdk_version.as_str()));
        if let Some(screen) = self.screen {
            payload.insert(keys::SCREEN_DPI.into(), Value::from(screen.dpi));
            payload.insert(keys::SCREEN_WIDTH.into(), Value::from(screen.width));
            payload.insert(keys::SCREEN_HEIGHT.into(), Value::from(screen.height));
        }
        if let Some(package) = &self.app_package {
            payload.insert(keys::APP_PACKAGE.into(), Value::from(package.as_str()));
        }
        if let Some(version) = &self.app_version {
            payload.insert(keys::APP_VERSION.into(), Value::from(version.as_str()));
        }
    }
}
