//! Run configuration for the contracts extraction job.
//!
//! Every knob has a default except the bucket. Values are read from the
//! process environment by [`ExtractConfig::from_env`]; tests build the struct
//! directly or go through [`ExtractConfig::from_lookup`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConfigError, ConfigResult, ValidationError};

/// Socrata endpoint for the SECOP II contracts dataset
pub const DEFAULT_BASE_URL: &str = "https://www.datos.gov.co/resource/jbjy-vk9h.json";
pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/output.csv";
pub const DEFAULT_PAGE_SIZE: usize = 3000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 0.8;
pub const DEFAULT_DAYS_BACK: i64 = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_USER_AGENT: &str = concat!("contracts-extract/", env!("CARGO_PKG_VERSION"));
/// Largest accepted days-back offset, roughly a century
pub const MAX_DAYS_BACK: i64 = 36_500;

/// Where finished files are published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Amazon S3; `bucket` is the bucket name
    S3,
    /// A local directory; `bucket` is the directory path
    Local,
}

impl FromStr for StorageBackend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            other => Err(ValidationError::invalid_value(
                "OBJECT_STORE",
                &format!("unknown backend '{}', expected 's3' or 'local'", other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Destination bucket (or directory for the local backend)
    pub bucket: String,
    /// Local CSV written during the run
    pub output_path: PathBuf,
    /// Records requested per page
    pub page_size: usize,
    /// Attempts per page request, first one included
    pub max_retries: u32,
    /// Base of the exponential backoff between attempts
    pub backoff_base: Duration,
    /// How many days before today the extracted day is
    pub days_back: i64,
    pub base_url: String,
    pub request_timeout: Duration,
    /// User-Agent sent to the contracts API
    pub user_agent: String,
    pub storage_backend: StorageBackend,
    /// Leave the local CSV in place after the run
    pub keep_local_file: bool,
}

impl ExtractConfig {
    /// Config with defaults for everything but the bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_secs_f64(DEFAULT_BACKOFF_BASE_SECS),
            days_back: DEFAULT_DAYS_BACK,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            storage_backend: StorageBackend::S3,
            keep_local_file: false,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = lookup("BUCKET_NAME")
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ValidationError::required("BUCKET_NAME"))?;

        let mut config = Self::new(bucket);

        if let Some(path) = lookup("OUT_DIR") {
            config.output_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("PAGE_SIZE") {
            config.page_size = parse_var("PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            config.max_retries = parse_var("MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("BACKOFF_BASE") {
            let secs: f64 = parse_var("BACKOFF_BASE", &raw)?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(ValidationError::invalid_value("BACKOFF_BASE", "must be a non-negative number of seconds").into());
            }
            config.backoff_base = Duration::try_from_secs_f64(secs).map_err(|_| {
                ValidationError::invalid_value("BACKOFF_BASE", "too large to represent as a duration")
            })?;
        }
        if let Some(raw) = lookup("DAYS_BACK") {
            config.days_back = parse_var("DAYS_BACK", &raw)?;
        }
        if let Some(url) = lookup("CONTRACTS_API_URL") {
            config.base_url = url;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", &raw)?);
        }
        if let Some(agent) = lookup("CONTRACTS_API_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(raw) = lookup("OBJECT_STORE") {
            config.storage_backend = raw.parse()?;
        }
        if let Some(raw) = lookup("KEEP_LOCAL_FILE") {
            config.keep_local_file = parse_flag("KEEP_LOCAL_FILE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(ValidationError::required("BUCKET_NAME").into());
        }
        if self.page_size == 0 {
            return Err(ValidationError::invalid_value("PAGE_SIZE", "must be at least 1").into());
        }
        if self.max_retries == 0 {
            return Err(ValidationError::invalid_value("MAX_RETRIES", "must be at least 1").into());
        }
        if self.days_back < 0 {
            return Err(ValidationError::invalid_value("DAYS_BACK", "must not be negative").into());
        }
        if self.days_back > MAX_DAYS_BACK {
            return Err(ValidationError::invalid_value(
                "DAYS_BACK",
                &format!("must be at most {}", MAX_DAYS_BACK),
            )
            .into());
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Other("contracts API URL is empty".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ValidationError::required("CONTRACTS_API_USER_AGENT").into());
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(field: &str, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ValidationError::format(field, &format!("cannot parse '{}'", raw)))
}

fn parse_flag(field: &str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ValidationError::format(field, &format!("expected a boolean, got '{}'", raw))),
    }
}
