//! `BranchSearch` end to end over the scripted transport.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use serde_json::json;

use branch_search::config::Endpoints;
use branch_search::dispatch::{CallKind, ExecutionPool, PoolConfig, RttTracker};
use branch_search::payload::{DeviceInfo, QueryHintRequest, QuerySource, SearchRequest};
use branch_search::transport::scripted::{ScriptedReply, ScriptedTransport};
use branch_search::transport::{Transport, TransportFault};
use branch_search::{BranchSearch, CancelPolicy, ChannelDispatcher, ErrorKind, SearchConfig};

const KEY: &str = "key_live_k";
const WAIT: Duration = Duration::from_secs(3);
const SETTLE: Duration = Duration::from_millis(250);

fn config() -> SearchConfig {
    let mut config = SearchConfig::new(KEY).with_extra("theme", "light").with_extra("size", "small");
    config.country = Some("US".into());
    config.endpoints = Endpoints {
        search_url: "https://h/v1/search/".into(),
        autosuggest_url: "https://h/v2/autosuggest".into(),
        queryhint_url: "https://h/v2/queryhint".into(),
        configuration_url_prefix: "https://h/configuration/".into(),
    };
    config
}

fn device() -> DeviceInfo {
    DeviceInfo {
        brand: "acme".into(),
        model: "phone".into(),
        os: "ANDROID".into(),
        os_version: "14".into(),
        carrier: "bnc_no_value".into(),
        locale: "en-US".into(),
        sdk_version: "0.3.0".into(),
        app_package: Some("com.acme.launcher".into()),
        app_version: None,
        screen: None,
    }
}

fn client(transport: &ScriptedTransport) -> BranchSearch {
    let pool = ExecutionPool::new(&PoolConfig { size: 3, ..PoolConfig::default() }).unwrap();
    let dispatcher = ChannelDispatcher::new(Transport::Scripted(transport.clone()), pool)
        .with_rtt(Arc::new(RttTracker::new()));
    BranchSearch::with_dispatcher(config(), device(), dispatcher).unwrap()
}

fn only_one<T>(rx: &Receiver<T>) -> T {
    let value = rx.recv_timeout(WAIT).expect("callback never fired");
    assert!(rx.recv_timeout(SETTLE).is_err(), "callback fired twice");
    value
}

fn search_error(transport: &ScriptedTransport) -> ErrorKind {
    let c = client(transport);
    let (tx, rx) = mpsc::channel();
    c.query(&SearchRequest::new("pizza"), move |r| tx.send(r).unwrap());
    only_one(&rx).unwrap_err().kind
}

#[test]
fn test_unauthorized_search_with_disabled_service_is_service_disabled() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.search_url, ScriptedReply::json(401, "{}"))
        .route(&cfg.endpoints.configuration_url(KEY), ScriptedReply::json(200, r#"{"disabled":true}"#));
    assert_eq!(search_error(&transport), ErrorKind::ServiceDisabled);
    assert_eq!(transport.requests_to(&cfg.endpoints.configuration_url(KEY)).len(), 1);
}

#[test]
fn test_unauthorized_search_with_enabled_service_stays_unauthorized() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.search_url, ScriptedReply::json(401, "{}"))
        .route(&cfg.endpoints.configuration_url(KEY), ScriptedReply::json(200, "{}"));
    assert_eq!(search_error(&transport), ErrorKind::Unauthorized);
}

#[test]
fn test_failed_availability_lookup_keeps_unauthorized() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.search_url, ScriptedReply::json(401, r#"{"code":401,"message":"bad key"}"#))
        .route(
            &cfg.endpoints.configuration_url(KEY),
            ScriptedReply::fault(TransportFault::TimedOut("read".into())),
        );
    assert_eq!(search_error(&transport), ErrorKind::Unauthorized);
}

#[test]
fn test_unauthorized_autosuggest_skips_availability_lookup() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.autosuggest_url, ScriptedReply::json(401, "{}"))
        .route(&cfg.endpoints.configuration_url(KEY), ScriptedReply::json(200, r#"{"disabled":true}"#));
    let c = client(&transport);
    let (tx, rx) = mpsc::channel();
    c.auto_suggest(&SearchRequest::new("piz"), move |r| tx.send(r).unwrap());
    assert_eq!(only_one(&rx).unwrap_err().kind, ErrorKind::Unauthorized);
    assert!(transport.requests_to(&cfg.endpoints.configuration_url(KEY)).is_empty());
}

#[test]
fn test_search_result_is_parsed() {
    let cfg = config();
    let body = json!({
        "success": true,
        "search_query_string": "pizza near me",
        "results": [
            {"app_name": "Pizza", "app_store_id": "com.pizza", "score": 2.0,
             "deep_links": [{"name": "Large", "web_link": "https://pizza/large"}, {"name": "Small"}]},
            {"app_name": "Maps", "app_store_id": "com.maps"}
        ]
    });
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.search_url, ScriptedReply::json(200, body.to_string()));
    let c = client(&transport);
    let (tx, rx) = mpsc::channel();
    c.query(&SearchRequest::new("pizza"), move |r| tx.send(r).unwrap());

    let result = only_one(&rx).unwrap();
    assert_eq!(result.query, "pizza");
    assert_eq!(result.corrected_query.as_deref(), Some("pizza near me"));
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.link_count(), 2);
    let links = &result.results[0].links;
    assert_eq!(links[0].web_link_or_store(), "https://pizza/large");
    assert_eq!(links[1].web_link_or_store(), "https://play.google.com/store/apps/details?id=com.pizza");
    assert_eq!(result.results[1].score, 0.0);
}

#[test]
fn test_search_payload_merges_request_device_and_config() {
    let cfg = config();
    let transport = ScriptedTransport::new().route(&cfg.endpoints.search_url, ScriptedReply::json(200, "{}"));
    let c = client(&transport);
    let request = SearchRequest::new("coffee")
        .with_extra("theme", "dark")
        .with_location(1.5, 2.5)
        .with_query_source(QuerySource::QueryHintResults)
        .disable_query_modification();
    let (tx, rx) = mpsc::channel();
    c.query(&request, move |r| tx.send(r).unwrap());
    only_one(&rx).unwrap();

    let sent = transport.requests_to(&cfg.endpoints.search_url);
    let body = sent[0].body().unwrap();
    assert_eq!(body["user_query"], json!("coffee"));
    assert_eq!(body["do_not_modify"], json!(true));
    assert_eq!(body["query_source"], json!("query_hint"));
    assert_eq!(body["user_latitude"], json!(1.5));
    assert_eq!(body["branch_key"], json!(KEY));
    assert_eq!(body["country"], json!("US"));
    assert_eq!(body["is_lat"], json!(0));
    assert_eq!(body["brand"], json!("acme"));
    assert_eq!(body["app_package"], json!("com.acme.launcher"));
    assert_eq!(body["extra_data"], json!({"theme": "dark", "size": "small"}));
}

#[test]
fn test_query_hint_and_rtt_echo_across_posts() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.queryhint_url, ScriptedReply::json(200, r#"{"results":["a","b"]}"#))
        .route(&cfg.endpoints.autosuggest_url, ScriptedReply::json(200, r#"{"results":["ab"]}"#));
    let c = client(&transport);

    let (tx, rx) = mpsc::channel();
    c.query_hint(&QueryHintRequest::new(), move |r| tx.send(r).unwrap());
    assert_eq!(only_one(&rx).unwrap().results, vec!["a", "b"]);
    let measured = c.dispatcher().rtt().peek(CallKind::Write).expect("write sample recorded");

    let (tx, rx) = mpsc::channel();
    c.auto_suggest(&SearchRequest::new("a"), move |r| tx.send(r).unwrap());
    assert_eq!(only_one(&rx).unwrap().results, vec!["ab"]);

    let hint = &transport.requests_to(&cfg.endpoints.queryhint_url)[0];
    assert!(hint.body().unwrap().get("lr_rtt").is_none());
    assert!(hint.body().unwrap().get("user_query").is_none());
    let suggest = &transport.requests_to(&cfg.endpoints.autosuggest_url)[0];
    assert_eq!(suggest.body().unwrap()["lr_rtt"], json!(measured));
}

#[test]
fn test_newer_search_cancels_older() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.search_url, ScriptedReply::json(200, r#"{"success":true}"#).after(Duration::from_millis(300)))
        .route(&cfg.endpoints.search_url, ScriptedReply::json(200, r#"{"success":true}"#));
    let c = client(&transport).with_cancel_policy(CancelPolicy::Synchronous);

    let (tx_old, rx_old) = mpsc::channel();
    let (tx_new, rx_new) = mpsc::channel();
    c.query(&SearchRequest::new("p"), move |r| tx_old.send(r).unwrap());
    std::thread::sleep(Duration::from_millis(50));
    c.query(&SearchRequest::new("pi"), move |r| tx_new.send(r).unwrap());

    assert_eq!(only_one(&rx_old).unwrap_err().kind, ErrorKind::Canceled);
    let latest = only_one(&rx_new).unwrap();
    assert_eq!(latest.query, "pi");
    assert!(latest.success);
}

#[test]
fn test_is_service_enabled_public_check() {
    let cfg = config();
    let transport = ScriptedTransport::new()
        .route(&cfg.endpoints.configuration_url("key_live_other"), ScriptedReply::json(200, r#"{"disabled":true}"#));
    let c = client(&transport);
    let (tx, rx) = mpsc::channel();
    c.is_service_enabled("key_live_other", move |r| tx.send(r.enabled).unwrap());
    assert!(!only_one(&rx));
}
