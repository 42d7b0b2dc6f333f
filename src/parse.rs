//! Response parsing.
//!
//! Parsers are tolerant: absent arrays become empty lists, and every textual
//! field reads as `""` when the JSON value is null or missing. Non-string
//! scalars are rendered with their JSON text.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::payload::SearchRequest;

const REQUEST_ID: &str = "request_id";
const RESULTS: &str = "results";
const SUCCESS: &str = "success";
const CORRECTED_QUERY: &str = "search_query_string";
const DISABLED: &str = "disabled";

const APP_NAME: &str = "app_name";
const APP_STORE_ID: &str = "app_store_id";
const APP_ICON_URL: &str = "app_icon_url";
const APP_SEARCH_DEEP_LINK: &str = "app_search_deep_link";
const APP_DEEP_LINKS: &str = "deep_links";
const SCORE: &str = "score";
const RANKING_HINT: &str = "ranking_hint";

const STORE_PAGE_PREFIX: &str = "https://play.google.com/store/apps/details?id=";

/// Read `key` as text: `""` for null/absent, JSON text for other scalars.
pub fn opt_string(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn opt_score(object: &Map<String, Value>) -> f64 {
    object.get(SCORE).and_then(Value::as_f64).unwrap_or(0.0)
}

/// A search response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// The query text the request was made with.
    pub query: String,
    pub request_id: String,
    pub success: bool,
    /// Set when the server rewrote the query.
    pub corrected_query: Option<String>,
    pub results: Vec<AppResult>,
}

impl SearchResult {
    pub fn parse(request: &SearchRequest, body: &Value) -> Self {
        let empty = Map::new();
        let object = body.as_object().unwrap_or(&empty);
        let corrected_query = object
            .get(CORRECTED_QUERY)
            .filter(|v| !v.is_null())
            .map(|_| opt_string(object, CORRECTED_QUERY));
        let success = object.get(SUCCESS).and_then(Value::as_bool).unwrap_or(false);

        let results = if success {
            object
                .get(RESULTS)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_object).map(AppResult::parse).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            query: request.query.clone(),
            request_id: opt_string(object, REQUEST_ID),
            success,
            corrected_query,
            results,
        }
    }

    pub fn link_count(&self) -> usize {
        self.results.iter().map(|app| app.links.len()).sum()
    }
}

/// One app in a search response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppResult {
    pub store_id: String,
    pub name: String,
    pub icon_url: String,
    pub ranking_hint: String,
    pub score: f64,
    /// The app's own in-app search action, when it has one.
    pub search_link: Option<LinkResult>,
    pub links: Vec<LinkResult>,
}

impl AppResult {
    fn parse(object: &Map<String, Value>) -> Self {
        let name = opt_string(object, APP_NAME);
        let store_id = opt_string(object, APP_STORE_ID);
        let icon_url = opt_string(object, APP_ICON_URL);
        let owner = AppRef { name: &name, store_id: &store_id, icon_url: &icon_url };

        let links = object
            .get(APP_DEEP_LINKS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|link| LinkResult::parse(link, &owner))
                    .collect()
            })
            .unwrap_or_default();
        let search_link = object
            .get(APP_SEARCH_DEEP_LINK)
            .and_then(Value::as_object)
            .map(|link| LinkResult::parse(link, &owner));

        Self {
            ranking_hint: opt_string(object, RANKING_HINT),
            score: opt_score(object),
            search_link,
            links,
            store_id,
            name,
            icon_url,
        }
    }

    pub fn store_page_url(&self) -> String {
        format!("{STORE_PAGE_PREFIX}{}", self.store_id)
    }
}

struct AppRef<'a> {
    name: &'a str,
    store_id: &'a str,
    icon_url: &'a str,
}

/// One deep link inside an app result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkResult {
    pub entity_id: String,
    pub link_type: String,
    pub score: f64,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub ranking_hint: String,
    pub metadata: Option<Map<String, Value>>,
    pub routing_mode: String,
    pub uri_scheme: String,
    pub web_link: String,
    pub click_tracking_url: String,
    pub app_name: String,
    pub app_store_id: String,
    pub app_icon_url: String,
}

impl LinkResult {
    fn parse(object: &Map<String, Value>, owner: &AppRef<'_>) -> Self {
        Self {
            entity_id: opt_string(object, "entity_id"),
            link_type: opt_string(object, "type"),
            score: opt_score(object),
            name: opt_string(object, "name"),
            description: opt_string(object, "description"),
            image_url: opt_string(object, "image_url"),
            ranking_hint: opt_string(object, RANKING_HINT),
            metadata: object.get("metadata").and_then(Value::as_object).cloned(),
            routing_mode: opt_string(object, "routing_mode"),
            uri_scheme: opt_string(object, "uri_scheme"),
            web_link: opt_string(object, "web_link"),
            click_tracking_url: opt_string(object, "click_tracking_link"),
            app_name: owner.name.to_string(),
            app_store_id: owner.store_id.to_string(),
            app_icon_url: owner.icon_url.to_string(),
        }
    }

    /// The web link, or the app's store page when the server sent none.
    pub fn web_link_or_store(&self) -> String {
        if self.web_link.is_empty() {
            format!("{STORE_PAGE_PREFIX}{}", self.app_store_id)
        } else {
            self.web_link.clone()
        }
    }
}

/// Autosuggest and query-hint responses: a flat list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub results: Vec<String>,
}

impl QueryResult {
    pub fn parse(body: &Value) -> Self {
        let results = body
            .get(RESULTS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null | Value::Object(_) | Value::Array(_) => None,
                        other => Some(other.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { results }
    }
}

/// Availability verdict for a client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceEnabledResult {
    pub enabled: bool,
}

impl ServiceEnabledResult {
    /// Disabled only on an explicit `"disabled": true`.
    pub fn parse(body: &Value) -> Self {
        let disabled = body.get(DISABLED).and_then(Value::as_bool).unwrap_or(false);
        Self { enabled: !disabled }
    }

    pub fn enabled() -> Self {
        Self { enabled: true }
    }
}
