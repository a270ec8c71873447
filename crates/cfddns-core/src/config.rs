//! Configuration types for cfddns
//!
//! Configuration arrives from up to three layers (YAML file, environment,
//! command-line flags). Each layer is parsed into a [`PartialConfig`] where
//! every field is optional; layers are combined with
//! [`PartialConfig::overlay`] and then validated once into a
//! [`CfddnsConfig`], which is passed explicitly to everything that needs it.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// File name looked up in the home directory when no config path is given
pub const DEFAULT_CONFIG_FILE_NAME: &str = ".cfddns.yaml";

/// Default polling interval (one hour)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default IP lookup endpoint
pub const DEFAULT_IP_LOOKUP_URL: &str = "http://checkip.dyndns.org/";

/// Default IP lookup request timeout
pub const DEFAULT_IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted polling interval (one year)
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default capacity of the daemon's event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_LOG_LEVEL: &str = "info";

/// A credential string that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Only API clients should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// Provider credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Global API key plus account email
    ApiKey { email: String, key: Secret },
    /// Scoped API token
    ApiToken(Secret),
}

/// Duration as written in a config file: either bare seconds or a
/// Go-style duration string such as `1h30m`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration(text),
        }
    }
}

/// One configuration layer; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    /// Managed domain name
    pub domain: Option<String>,
    /// Polling interval
    pub interval: Option<DurationValue>,
    /// Global API key
    pub key: Option<Secret>,
    /// Account email paired with `key`
    pub email: Option<String>,
    /// Scoped API token, alternative to `key` + `email`
    pub token: Option<Secret>,
    /// IP lookup endpoint
    pub ip_lookup_url: Option<String>,
    /// IP lookup request timeout
    pub ip_lookup_timeout: Option<DurationValue>,
    /// Log intended updates instead of sending them
    pub dry_run: Option<bool>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Capacity of the daemon's event channel
    pub event_channel_capacity: Option<usize>,
}

impl PartialConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML config file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
            .map_err(|e| Error::config(format!("invalid config file {}: {}", path.display(), e)))
    }

    /// Combine two layers; fields set in `higher` win
    pub fn overlay(self, higher: PartialConfig) -> PartialConfig {
        PartialConfig {
            domain: higher.domain.or(self.domain),
            interval: higher.interval.or(self.interval),
            key: higher.key.or(self.key),
            email: higher.email.or(self.email),
            token: higher.token.or(self.token),
            ip_lookup_url: higher.ip_lookup_url.or(self.ip_lookup_url),
            ip_lookup_timeout: higher.ip_lookup_timeout.or(self.ip_lookup_timeout),
            dry_run: higher.dry_run.or(self.dry_run),
            log_level: higher.log_level.or(self.log_level),
            event_channel_capacity: higher.event_channel_capacity.or(self.event_channel_capacity),
        }
    }

    /// Apply defaults and validate
    pub fn into_config(self) -> Result<CfddnsConfig> {
        let domain = self
            .domain
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::config("domain is required"))?;
        validate_domain_name(&domain)?;

        let interval = match self.interval {
            Some(value) => value.to_duration()?,
            None => DEFAULT_INTERVAL,
        };

        let credentials = resolve_credentials(self.key, self.email, self.token)?;

        let ip_lookup = IpLookupConfig {
            url: self
                .ip_lookup_url
                .unwrap_or_else(|| DEFAULT_IP_LOOKUP_URL.to_string()),
            timeout: match self.ip_lookup_timeout {
                Some(value) => value.to_duration()?,
                None => DEFAULT_IP_LOOKUP_TIMEOUT,
            },
        };

        let config = CfddnsConfig {
            domain,
            credentials,
            ip_lookup,
            dry_run: self.dry_run.unwrap_or(false),
            log_level: self
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
            daemon: DaemonConfig {
                interval,
                event_channel_capacity: self
                    .event_channel_capacity
                    .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY),
            },
        };
        config.validate()?;

        Ok(config)
    }
}

fn resolve_credentials(
    key: Option<Secret>,
    email: Option<String>,
    token: Option<Secret>,
) -> Result<Credentials> {
    let key = key.filter(|k| !k.is_empty());
    let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
    let token = token.filter(|t| !t.is_empty());

    match (key, email, token) {
        (None, None, Some(token)) => Ok(Credentials::ApiToken(token)),
        (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => Err(Error::config(
            "token cannot be combined with key/email; pick one authentication method",
        )),
        (Some(key), Some(email), None) => {
            if !email.contains('@') {
                return Err(Error::config(format!("email does not look valid: {}", email)));
            }
            Ok(Credentials::ApiKey { email, key })
        }
        (Some(_), None, None) => Err(Error::config("key is set but email is missing")),
        (None, Some(_), None) => Err(Error::config("email is set but key is missing")),
        (None, None, None) => Err(Error::config(
            "credentials are required: set key and email, or token",
        )),
    }
}

/// Validated process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfddnsConfig {
    /// Managed domain name (lower-cased, no trailing dot)
    pub domain: String,
    /// Provider credentials
    pub credentials: Credentials,
    /// IP lookup settings
    pub ip_lookup: IpLookupConfig,
    /// Log intended updates instead of sending them
    pub dry_run: bool,
    /// Log level name
    pub log_level: String,
    /// Update loop settings
    pub daemon: DaemonConfig,
}

impl CfddnsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_domain_name(&self.domain)?;
        self.daemon.validate()?;
        self.ip_lookup.validate()?;

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::config(format!(
                    "log level '{}' is not valid; valid levels: trace, debug, info, warn, error",
                    other
                )));
            }
        }

        Ok(())
    }
}

/// IP lookup settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpLookupConfig {
    /// Endpoint to query
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl IpLookupConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(Error::config(format!(
                "ip_lookup_url must use the http or https scheme, got: {}",
                self.url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("ip_lookup_timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_IP_LOOKUP_URL.to_string(),
            timeout: DEFAULT_IP_LOOKUP_TIMEOUT,
        }
    }
}

/// Update loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Ticker period
    pub interval: Duration,

    /// Capacity of the event channel
    ///
    /// When full, events are dropped rather than stalling the loop.
    pub event_channel_capacity: usize,
}

impl DaemonConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config("interval must be > 0"));
        }
        if self.interval > MAX_INTERVAL {
            return Err(Error::config(format!(
                "interval {:?} is too long (max {:?})",
                self.interval, MAX_INTERVAL
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Parse a Go-style duration (`1h`, `30m`, `1h30m`, `1.5h`, `90s`, `500ms`)
///
/// A bare integer is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    if text.is_empty() {
        return Err(Error::config("duration cannot be empty"));
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let invalid = || Error::config(format!("invalid duration: '{}'", input));

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| Error::config(format!("missing unit in duration: '{}'", input)))?;
        if number_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_end].parse().map_err(|_| invalid())?;

        let unit_part = &rest[number_end..];
        let unit_end = unit_part
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(unit_part.len());
        let scale = match &unit_part[..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => {
                return Err(Error::config(format!(
                    "unknown unit '{}' in duration '{}' (expected ms, s, m or h)",
                    unit, input
                )));
            }
        };

        let part = Duration::try_from_secs_f64(value * scale).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = &unit_part[unit_end..];
    }

    Ok(total)
}

/// Validate that a string is a plausible DNS domain name (RFC 1035 label rules)
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(Error::config(format!(
            "domain name too long: {} chars (max 253)",
            domain.len()
        )));
    }

    if !domain.contains('.') {
        return Err(Error::config(format!(
            "domain name must have at least two labels: '{}'",
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(Error::config(format!("domain name has empty label: '{}'", domain)));
        }

        if label.len() > 63 {
            return Err(Error::config(format!(
                "domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::config(format!(
                "domain label contains invalid characters: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "domain label cannot start or end with hyphen: '{}'",
                label
            )));
        }
    }

    Ok(())
}
