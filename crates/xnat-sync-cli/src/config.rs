//! Configuration management for xnat-sync
//!
//! Layers, lowest precedence first: defaults, environment (`XNAT_SYNC_*`,
//! including a `.env` file loaded by the binary), command-line flags.

use crate::error::{Result, SyncError};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use xnat_sync_common::credentials::{Credentials, Netrc};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Ceiling for waiting on a bulk import.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 600;

/// Longest import wait accepted from configuration (one day).
pub const MAX_POLL_TIMEOUT_SECS: u64 = 86_400;

/// How often the import wait reports time remaining.
pub const DEFAULT_POLL_REPORT_SECS: u64 = 15;

/// Scheme used when the host carries none.
pub const DEFAULT_SCHEME: &str = "https";

/// Import poll cadence and backoff shape
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Give up waiting after this long
    pub timeout: Duration,
    /// Interval between "time remaining" reports
    pub report_interval: Duration,
    /// First delay between polls
    pub base_delay: Duration,
    /// Each delay is the previous one (in seconds) raised to this power
    pub growth_exponent: f64,
    /// Upper bound of the random term added to each delay
    pub max_jitter: Duration,
    /// No delay exceeds this
    pub max_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            report_interval: Duration::from_secs(DEFAULT_POLL_REPORT_SECS),
            base_delay: Duration::from_secs(2),
            growth_exponent: 1.25,
            max_jitter: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl PollSettings {
    /// Reject shapes that would make the backoff shrink or stall.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay < Duration::from_secs(1) {
            return Err(SyncError::config("poll base delay must be at least 1 second"));
        }
        if !(self.growth_exponent >= 1.0) {
            return Err(SyncError::config("poll growth exponent must be at least 1.0"));
        }
        if self.max_delay < self.base_delay {
            return Err(SyncError::config("poll max delay must not be below the base delay"));
        }
        if self.report_interval.is_zero() {
            return Err(SyncError::config("poll report interval must be positive"));
        }
        let ceiling = Duration::from_secs(MAX_POLL_TIMEOUT_SECS);
        if self.timeout > ceiling || self.report_interval > ceiling || self.max_delay > ceiling {
            return Err(SyncError::config(format!(
                "poll durations must not exceed {} seconds",
                MAX_POLL_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Archive host as given (`name`, `name:port`, `scheme://name[:port]`)
    pub host: Option<String>,

    /// Explicit port, overriding one embedded in `host`
    pub port: Option<u16>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Credentials file searched by hostname
    pub netrc_path: Option<PathBuf>,

    /// Verify TLS certificates
    pub verify_tls: bool,

    pub request_timeout: Duration,

    pub poll: PollSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            netrc_path: Netrc::default_path(),
            verify_tls: true,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll: PollSettings::default(),
        }
    }
}

impl Config {
    /// Defaults overlaid with `XNAT_SYNC_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("XNAT_SYNC_HOST") {
            config.host = Some(host);
        }

        if let Ok(port) = std::env::var("XNAT_SYNC_PORT") {
            config.port = Some(parse_env("XNAT_SYNC_PORT", &port)?);
        }

        if let Ok(user) = std::env::var("XNAT_SYNC_USER") {
            config.username = Some(user);
        }

        if let Ok(password) = std::env::var("XNAT_SYNC_PASSWORD") {
            config.password = Some(password);
        }

        if let Ok(path) = std::env::var("XNAT_SYNC_NETRC") {
            config.netrc_path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("XNAT_SYNC_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_env("XNAT_SYNC_TIMEOUT_SECS", &secs)?);
        }

        if let Ok(secs) = std::env::var("XNAT_SYNC_POLL_TIMEOUT_SECS") {
            config.poll.timeout =
                Duration::from_secs(parse_env("XNAT_SYNC_POLL_TIMEOUT_SECS", &secs)?);
        }

        if let Ok(flag) = std::env::var("XNAT_SYNC_INSECURE") {
            config.verify_tls = !matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Normalized base URL: `scheme://host[:port]`.
    pub fn base_url(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| SyncError::config("no archive host given (use --host or XNAT_SYNC_HOST)"))?;
        base_url(host, self.port)
    }

    /// Basic-auth credentials: explicit values win, the credentials file
    /// fills in whatever is missing. `None` when neither yields anything.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let from_file = match (&self.netrc_path, self.hostname()?) {
            (Some(path), Some(host)) if path.exists() => Netrc::load(path)?
                .authenticator(&host)
                .cloned()
                .unwrap_or_default(),
            _ => Credentials::default(),
        };

        let credentials = Credentials {
            login: self.username.clone().unwrap_or(from_file.login),
            password: self.password.clone().unwrap_or(from_file.password),
        };

        if credentials.login.is_empty() && credentials.password.is_empty() {
            Ok(None)
        } else {
            Ok(Some(credentials))
        }
    }

    fn hostname(&self) -> Result<Option<String>> {
        match self.host {
            Some(_) => {
                let url = Url::parse(&self.base_url()?)
                    .map_err(|e| SyncError::config(format!("invalid host: {}", e)))?;
                Ok(url.host_str().map(str::to_string))
            }
            None => Ok(None),
        }
    }
}

/// Normalize `host` (with optional embedded port and scheme) into a base URL.
pub fn base_url(host: &str, port: Option<u16>) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(SyncError::config("archive host is empty"));
    }

    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("{}://{}", DEFAULT_SCHEME, host)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| SyncError::config(format!("invalid host '{}': {}", host, e)))?;
    if port.is_some() {
        url.set_port(port)
            .map_err(|_| SyncError::config(format!("cannot set a port on '{}'", host)))?;
    }

    let name = url
        .host_str()
        .ok_or_else(|| SyncError::config(format!("no hostname in '{}'", host)))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), name, port),
        None => format!("{}://{}", url.scheme(), name),
    })
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SyncError::config(format!("{} has an invalid value '{}'", name, raw)))
}
