//! The shipped config file must load and keep the documented defaults.

use std::path::Path;
use std::time::Duration;

use branch_search::config::{self, DEFAULT_CONFIG_PATH};

#[test]
fn test_default_config_file_exists() {
    assert!(Path::new(DEFAULT_CONFIG_PATH).exists(), "config/default.toml missing");
}

#[test]
fn test_default_config_values() {
    let cfg = config::load_from(Path::new(DEFAULT_CONFIG_PATH), None, None).unwrap();
    assert_eq!(cfg.endpoints.search_url, "https://vulcan.branch.io/v1/search/");
    assert_eq!(cfg.endpoints.queryhint_url, "https://vulcan.branch.io/v2/queryhint");
    assert_eq!(cfg.endpoints.autosuggest_url, "https://vulcan.branch.io/v2/autosuggest");
    assert_eq!(
        cfg.endpoints.configuration_url("key_live_x"),
        "https://vulcan.branch.io/configuration/key_live_x.json"
    );
    assert_eq!(cfg.dispatch.timeout, Duration::from_millis(6000));
    assert_eq!(cfg.dispatch.pool_size, 6);
    assert_eq!(cfg.dispatch.keep_alive, Duration::from_secs(5));
    assert!(cfg.extra.is_empty());
}

#[test]
fn test_branch_key_comes_from_override() {
    let cfg = config::load_from(Path::new(DEFAULT_CONFIG_PATH), Some("key_live_env"), None).unwrap();
    assert!(cfg.has_valid_key());
}
