/// Configuration management for the EMD signer
use crate::error::{SignerError, SignerResult};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Runtime settings, loaded once at startup and never mutated afterwards
#[derive(Clone)]
pub struct Settings {
    pub login: String,
    pub password: String,
    /// Portal base URL (e.g. https://portal.example.org/)
    pub url: String,
    /// Pause between polling cycles
    pub pause_minutes: u64,
    /// How long a failed document is kept out of the signing queue
    pub cache_minutes: u64,
    /// Pacing delay after every processed document
    pub signing_interval_seconds: u64,
    /// Number of concurrent signing workers
    pub thread_count: usize,
    /// Document types (registry object names) that must be signed by hand
    pub ignore_doc_types: HashSet<String>,
    /// Minimum remaining certificate lifetime required to start a signature
    pub cert_safety_margin_ms: u64,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
    /// JSON file with the signing keys of the file-backed credential store
    pub keys_file: PathBuf,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("login", &self.login)
            .field("password", &"***")
            .field("url", &self.url)
            .field("pause_minutes", &self.pause_minutes)
            .field("cache_minutes", &self.cache_minutes)
            .field("signing_interval_seconds", &self.signing_interval_seconds)
            .field("thread_count", &self.thread_count)
            .field("ignore_doc_types", &self.ignore_doc_types)
            .field("cert_safety_margin_ms", &self.cert_safety_margin_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("keys_file", &self.keys_file)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            url: String::new(),
            pause_minutes: 1,
            cache_minutes: 60,
            signing_interval_seconds: 0,
            thread_count: 1,
            ignore_doc_types: HashSet::new(),
            cert_safety_margin_ms: 600,
            request_timeout_secs: 60,
            keys_file: PathBuf::from("keys.json"),
        }
    }
}

const PAUSE_MINUTES: (u64, u64) = (1, 1440);
const CACHE_MINUTES: (u64, u64) = (1, 10080);
const SIGNING_INTERVAL_SECONDS: (u64, u64) = (0, 3600);
const THREAD_COUNT: (usize, usize) = (1, 16);
const CERT_SAFETY_MARGIN_MS: (u64, u64) = (200, 60_000);
const REQUEST_TIMEOUT_SECS: (u64, u64) = (5, 600);

impl Settings {
    /// Load settings from environment variables (and `.env` if present),
    /// then clamp every numeric value into its safe range.
    pub fn from_env() -> SignerResult<Self> {
        dotenv::dotenv().ok();

        let defaults = Settings::default();

        let login = env::var("EMD_LOGIN")
            .map_err(|_| SignerError::Config("EMD_LOGIN is required".to_string()))?;
        let password = env::var("EMD_PASSWORD")
            .map_err(|_| SignerError::Config("EMD_PASSWORD is required".to_string()))?;
        let url = env::var("EMD_URL")
            .map_err(|_| SignerError::Config("EMD_URL is required".to_string()))?;

        let pause_minutes = parse_var("EMD_PAUSE_MINUTES", defaults.pause_minutes)?;
        let cache_minutes = parse_var("EMD_CACHE_MINUTES", defaults.cache_minutes)?;
        let signing_interval_seconds = parse_var(
            "EMD_SIGNING_INTERVAL_SECONDS",
            defaults.signing_interval_seconds,
        )?;
        let thread_count = parse_var("EMD_THREAD_COUNT", defaults.thread_count)?;
        let cert_safety_margin_ms =
            parse_var("EMD_CERT_SAFETY_MARGIN_MS", defaults.cert_safety_margin_ms)?;
        let request_timeout_secs =
            parse_var("EMD_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?;

        let ignore_doc_types = parse_list(&env::var("EMD_IGNORE_DOC_TYPES").unwrap_or_default());

        let keys_file = env::var("EMD_KEYS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.keys_file);

        let mut settings = Settings {
            login,
            password,
            url,
            pause_minutes,
            cache_minutes,
            signing_interval_seconds,
            thread_count,
            ignore_doc_types,
            cert_safety_margin_ms,
            request_timeout_secs,
            keys_file,
        };

        settings.validate()?;
        settings.clamp();

        Ok(settings)
    }

    /// Validate required values
    pub fn validate(&self) -> SignerResult<()> {
        if self.login.trim().is_empty() {
            return Err(SignerError::Config("Login cannot be empty".to_string()));
        }

        if self.password.is_empty() {
            return Err(SignerError::Config("Password cannot be empty".to_string()));
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(SignerError::Config(format!(
                "Portal URL must be http(s): {}",
                self.url
            )));
        }

        Ok(())
    }

    /// Pull every numeric setting back into its safe range, logging each
    /// adjustment.
    pub fn clamp(&mut self) {
        self.pause_minutes = clamp_value("pause_minutes", self.pause_minutes, PAUSE_MINUTES);
        self.cache_minutes = clamp_value("cache_minutes", self.cache_minutes, CACHE_MINUTES);
        self.signing_interval_seconds = clamp_value(
            "signing_interval_seconds",
            self.signing_interval_seconds,
            SIGNING_INTERVAL_SECONDS,
        );
        self.thread_count = clamp_value("thread_count", self.thread_count, THREAD_COUNT);
        self.cert_safety_margin_ms = clamp_value(
            "cert_safety_margin_ms",
            self.cert_safety_margin_ms,
            CERT_SAFETY_MARGIN_MS,
        );
        self.request_timeout_secs = clamp_value(
            "request_timeout_secs",
            self.request_timeout_secs,
            REQUEST_TIMEOUT_SECS,
        );
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_minutes * 60)
    }

    pub fn signing_interval(&self) -> Duration {
        Duration::from_secs(self.signing_interval_seconds)
    }

    pub fn cert_safety_margin(&self) -> Duration {
        Duration::from_millis(self.cert_safety_margin_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether documents of this type must be left for manual signing
    pub fn is_ignored_doc_type(&self, doc_type: &str) -> bool {
        self.ignore_doc_types.contains(doc_type)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> SignerResult<T> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| SignerError::Config(format!("Invalid value for {}: {}", name, value))),
        _ => Ok(default),
    }
}

fn parse_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn clamp_value<T>(name: &str, value: T, (min, max): (T, T)) -> T
where
    T: PartialOrd + Copy + fmt::Display,
{
    if value < min {
        warn!("{} = {} is below the minimum, using {}", name, value, min);
        min
    } else if value > max {
        warn!("{} = {} is above the maximum, using {}", name, value, max);
        max
    } else {
        value
    }
}
