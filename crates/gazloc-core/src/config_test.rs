use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

/// Returns a map with all required env vars populated with valid values.
fn full_env<'a>() -> HashMap<&'a str, &'a str> {
    let mut m = HashMap::new();
    m.insert("GAZLOC_REMOTE_URL", "https://directory.example.com");
    m
}

#[test]
fn build_app_config_fails_without_remote_url() {
    let map: HashMap<&str, &str> = HashMap::new();
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "GAZLOC_REMOTE_URL"),
        "expected MissingEnvVar(GAZLOC_REMOTE_URL), got: {result:?}"
    );
}

#[test]
fn build_app_config_treats_blank_remote_url_as_missing() {
    let mut map = HashMap::new();
    map.insert("GAZLOC_REMOTE_URL", "   ");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
}

#[test]
fn build_app_config_rejects_non_http_remote_url() {
    let mut map = HashMap::new();
    map.insert("GAZLOC_REMOTE_URL", "ftp://directory.example.com");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "GAZLOC_REMOTE_URL"),
        "got: {result:?}"
    );
}

#[test]
fn build_app_config_applies_defaults() {
    let map = full_env();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.remote_url, "https://directory.example.com");
    assert!(cfg.api_key.is_none());
    assert_eq!(cfg.table, "vendors");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.cache_dir, std::path::PathBuf::from("./.gazloc"));
    assert_eq!(
        cfg.catalog_path,
        std::path::PathBuf::from("./config/catalog.yaml")
    );
    assert_eq!(cfg.request_timeout_secs, 30);
    assert_eq!(cfg.user_agent, "gazloc/0.1 (vendor-directory)");
    assert_eq!(cfg.fetch_max_retries, 3);
    assert_eq!(cfg.fetch_backoff_base_secs, 1);
    assert_eq!(cfg.resubscribe_delay_secs, 5);
    assert!((cfg.fuzzy_threshold - 0.3).abs() < f64::EPSILON);
    assert_eq!(cfg.location_min_interval_secs, 5);
    assert!((cfg.location_min_distance_m - 10.0).abs() < f64::EPSILON);
}

#[test]
fn build_app_config_reads_overrides() {
    let mut map = full_env();
    map.insert("GAZLOC_API_KEY", "anon-key");
    map.insert("GAZLOC_TABLE", "vendors_staging");
    map.insert("GAZLOC_RESUBSCRIBE_DELAY_SECS", "10");
    map.insert("GAZLOC_FUZZY_THRESHOLD", "0.25");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.api_key.as_deref(), Some("anon-key"));
    assert_eq!(cfg.table, "vendors_staging");
    assert_eq!(cfg.resubscribe_delay_secs, 10);
    assert!((cfg.fuzzy_threshold - 0.25).abs() < f64::EPSILON);
}

#[test]
fn build_app_config_ignores_empty_api_key() {
    let mut map = full_env();
    map.insert("GAZLOC_API_KEY", "");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.api_key.is_none());
}

#[test]
fn build_app_config_rejects_invalid_numbers() {
    for var in [
        "GAZLOC_REQUEST_TIMEOUT_SECS",
        "GAZLOC_FETCH_MAX_RETRIES",
        "GAZLOC_FETCH_BACKOFF_BASE_SECS",
        "GAZLOC_RESUBSCRIBE_DELAY_SECS",
        "GAZLOC_LOCATION_MIN_INTERVAL_SECS",
        "GAZLOC_LOCATION_MIN_DISTANCE_M",
        "GAZLOC_FUZZY_THRESHOLD",
    ] {
        let mut map = full_env();
        map.insert(var, "not-a-number");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { var: ref v, .. }) if v == var),
            "expected InvalidEnvVar({var}), got: {result:?}"
        );
    }
}

#[test]
fn build_app_config_rejects_out_of_range_threshold() {
    let mut map = full_env();
    map.insert("GAZLOC_FUZZY_THRESHOLD", "1.5");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "GAZLOC_FUZZY_THRESHOLD"),
        "got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_non_finite_distance() {
    let mut map = full_env();
    map.insert("GAZLOC_LOCATION_MIN_DISTANCE_M", "inf");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
}

#[test]
fn debug_output_redacts_api_key() {
    let mut map = full_env();
    map.insert("GAZLOC_API_KEY", "super-secret");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let debug = format!("{cfg:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("[redacted]"));
}
