use ingestor_model::{IngestError, Result};
use std::path::PathBuf;

const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;
const DEFAULT_STORAGE_PATH: &str = "./data/storage";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost/ingestor";

/// Environment-sourced configuration (spec §6). The chat SDK credentials
/// and channel list are mandatory; everything else has a workable default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub remote_api_id: i32,
    pub remote_api_hash: String,
    pub remote_phone: String,
    pub remote_channels: Vec<String>,
    pub worker_count: usize,
    pub max_file_size_mb: u64,
    pub storage_path: PathBuf,
    pub database_url: String,
    pub ioc_domains: Vec<String>,
    pub ioc_emails: Vec<String>,
    pub ioc_ipv4_cidrs: Vec<String>,
}

impl Settings {
    /// Loads settings from process environment variables. Missing required
    /// credentials are a config error, fatal at startup (spec §7).
    pub fn from_env() -> Result<Self> {
        Self::from_source(&std::env::var)
    }

    /// Testable variant: `lookup` stands in for `std::env::var` so tests
    /// don't need to mutate real process environment.
    pub fn from_source(lookup: &dyn Fn(&str) -> std::result::Result<String, std::env::VarError>) -> Result<Self> {
        let remote_api_id = required(lookup, "REMOTE_API_ID")?
            .parse::<i32>()
            .map_err(|e| IngestError::Config(format!("REMOTE_API_ID must be an integer: {e}")))?;
        let remote_api_hash = required(lookup, "REMOTE_API_HASH")?;
        let remote_phone = required(lookup, "REMOTE_PHONE")?;
        let remote_channels = split_csv(&required(lookup, "REMOTE_CHANNELS")?);

        if remote_channels.is_empty() {
            return Err(IngestError::Config(
                "REMOTE_CHANNELS must name at least one channel".to_string(),
            ));
        }

        let worker_count = optional(lookup, "WORKER_COUNT")
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|e| IngestError::Config(format!("WORKER_COUNT must be an integer: {e}")))?
            .unwrap_or(DEFAULT_WORKER_COUNT);

        let max_file_size_mb = optional(lookup, "MAX_FILE_SIZE_MB")
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| IngestError::Config(format!("MAX_FILE_SIZE_MB must be an integer: {e}")))?
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);

        let storage_path = optional(lookup, "STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH));

        let database_url =
            optional(lookup, "DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let ioc_domains = optional(lookup, "IOC_DOMAINS").map(|v| split_csv(&v)).unwrap_or_default();
        let ioc_emails = optional(lookup, "IOC_EMAILS")
            .map(|v| split_csv(&v).into_iter().map(|e| e.trim_start_matches('@').to_string()).collect())
            .unwrap_or_default();
        let ioc_ipv4_cidrs = optional(lookup, "IOC_IPV4_CIDRS").map(|v| split_csv(&v)).unwrap_or_default();

        Ok(Self {
            remote_api_id,
            remote_api_hash,
            remote_phone,
            remote_channels,
            worker_count,
            max_file_size_mb,
            storage_path,
            database_url,
            ioc_domains,
            ioc_emails,
            ioc_ipv4_cidrs,
        })
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn required(
    lookup: &dyn Fn(&str) -> std::result::Result<String, std::env::VarError>,
    key: &str,
) -> Result<String> {
    lookup(key).map_err(|_| IngestError::Config(format!("missing required setting: {key}")))
}

fn optional(
    lookup: &dyn Fn(&str) -> std::result::Result<String, std::env::VarError>,
    key: &str,
) -> Option<String> {
    lookup(key).ok()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn lookup_fn(map: HashMap<String, String>) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| map.get(key).cloned().ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn loads_required_fields_and_applies_defaults() {
        let map = source(&[
            ("REMOTE_API_ID", "12345"),
            ("REMOTE_API_HASH", "abcdef"),
            ("REMOTE_PHONE", "+15551234567"),
            ("REMOTE_CHANNELS", "alpha, beta"),
        ]);
        let settings = Settings::from_source(&lookup_fn(map)).unwrap();

        assert_eq!(settings.remote_api_id, 12345);
        assert_eq!(settings.remote_channels, vec!["alpha", "beta"]);
        assert_eq!(settings.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(settings.max_file_size_bytes(), 100 * 1024 * 1024);
        assert_eq!(settings.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
    }

    #[test]
    fn missing_required_credential_is_a_config_error() {
        let map = source(&[("REMOTE_API_ID", "12345")]);
        let err = Settings::from_source(&lookup_fn(map)).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn empty_channel_list_is_rejected() {
        let map = source(&[
            ("REMOTE_API_ID", "1"),
            ("REMOTE_API_HASH", "h"),
            ("REMOTE_PHONE", "p"),
            ("REMOTE_CHANNELS", "  ,  "),
        ]);
        let err = Settings::from_source(&lookup_fn(map)).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn ioc_email_watchlist_strips_leading_at() {
        let map = source(&[
            ("REMOTE_API_ID", "1"),
            ("REMOTE_API_HASH", "h"),
            ("REMOTE_PHONE", "p"),
            ("REMOTE_CHANNELS", "alpha"),
            ("IOC_EMAILS", "@example.com, other.org"),
        ]);
        let settings = Settings::from_source(&lookup_fn(map)).unwrap();
        assert_eq!(settings.ioc_emails, vec!["example.com", "other.org"]);
    }
}
