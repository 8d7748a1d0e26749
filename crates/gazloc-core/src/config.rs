use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`
/// lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        let value = raw.parse::<f64>().map_err(|e| invalid(var, e.to_string()))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid(var, format!("{raw} is not a finite number")))
        }
    };

    let remote_url = require("GAZLOC_REMOTE_URL")?;
    if !(remote_url.starts_with("http://") || remote_url.starts_with("https://")) {
        return Err(invalid(
            "GAZLOC_REMOTE_URL",
            format!("'{remote_url}' must start with http:// or https://"),
        ));
    }
    let api_key = lookup("GAZLOC_API_KEY").ok().filter(|k| !k.is_empty());
    let table = or_default("GAZLOC_TABLE", "vendors");

    let log_level = or_default("GAZLOC_LOG_LEVEL", "info");
    let cache_dir = PathBuf::from(or_default("GAZLOC_CACHE_DIR", "./.gazloc"));
    let catalog_path = PathBuf::from(or_default("GAZLOC_CATALOG_PATH", "./config/catalog.yaml"));

    let request_timeout_secs = parse_u64("GAZLOC_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("GAZLOC_USER_AGENT", "gazloc/0.1 (vendor-directory)");
    let fetch_max_retries = parse_u32("GAZLOC_FETCH_MAX_RETRIES", "3")?;
    let fetch_backoff_base_secs = parse_u64("GAZLOC_FETCH_BACKOFF_BASE_SECS", "1")?;
    let resubscribe_delay_secs = parse_u64("GAZLOC_RESUBSCRIBE_DELAY_SECS", "5")?;

    let fuzzy_threshold = parse_f64("GAZLOC_FUZZY_THRESHOLD", "0.3")?;
    if !(0.0..=1.0).contains(&fuzzy_threshold) {
        return Err(invalid(
            "GAZLOC_FUZZY_THRESHOLD",
            format!("{fuzzy_threshold} is outside 0.0..=1.0"),
        ));
    }

    let location_min_interval_secs = parse_u64("GAZLOC_LOCATION_MIN_INTERVAL_SECS", "5")?;
    let location_min_distance_m = parse_f64("GAZLOC_LOCATION_MIN_DISTANCE_M", "10")?;
    if location_min_distance_m < 0.0 {
        return Err(invalid(
            "GAZLOC_LOCATION_MIN_DISTANCE_M",
            format!("{location_min_distance_m} must not be negative"),
        ));
    }

    Ok(AppConfig {
        remote_url,
        api_key,
        table,
        log_level,
        cache_dir,
        catalog_path,
        request_timeout_secs,
        user_agent,
        fetch_max_retries,
        fetch_backoff_base_secs,
        resubscribe_delay_secs,
        fuzzy_threshold,
        location_min_interval_secs,
        location_min_distance_m,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
