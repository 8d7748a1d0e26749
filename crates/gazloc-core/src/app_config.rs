use std::path::PathBuf;

#[derive(Clone)]
pub struct AppConfig {
    pub remote_url: String,
    pub api_key: Option<String>,
    pub table: String,
    pub log_level: String,
    pub cache_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub fetch_max_retries: u32,
    pub fetch_backoff_base_secs: u64,
    pub resubscribe_delay_secs: u64,
    pub fuzzy_threshold: f64,
    pub location_min_interval_secs: u64,
    pub location_min_distance_m: f64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("remote_url", &self.remote_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("table", &self.table)
            .field("log_level", &self.log_level)
            .field("cache_dir", &self.cache_dir)
            .field("catalog_path", &self.catalog_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("fetch_max_retries", &self.fetch_max_retries)
            .field("fetch_backoff_base_secs", &self.fetch_backoff_base_secs)
            .field("resubscribe_delay_secs", &self.resubscribe_delay_secs)
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field(
                "location_min_interval_secs",
                &self.location_min_interval_secs,
            )
            .field("location_min_distance_m", &self.location_min_distance_m)
            .finish()
    }
}
