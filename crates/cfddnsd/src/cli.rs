//! Command-line surface
//!
//! Every option can also be given through an environment variable of the
//! same name, upper-cased. Values set here form the highest-precedence
//! configuration layer.

use cfddns_core::config::{DurationValue, PartialConfig, Secret};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "cfddnsd",
    version,
    about = "Keep Cloudflare A records pointed at this host's public IPv4 address"
)]
pub struct Cli {
    /// Config file (default is $HOME/.cfddns.yaml)
    #[arg(long, env = "CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Domain whose zone is managed
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// Update interval, e.g. 90s, 30m, 1h (default 1h)
    #[arg(long, env = "INTERVAL", value_name = "DURATION")]
    pub interval: Option<String>,

    /// Cloudflare global API key
    #[arg(long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Cloudflare account email
    #[arg(long, env = "EMAIL")]
    pub email: Option<String>,

    /// Cloudflare API token (instead of key and email)
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Public IP lookup endpoint
    #[arg(long, env = "IP_LOOKUP_URL", value_name = "URL")]
    pub ip_lookup_url: Option<String>,

    /// Public IP lookup timeout
    #[arg(long, env = "IP_LOOKUP_TIMEOUT", value_name = "DURATION")]
    pub ip_lookup_timeout: Option<String>,

    /// Log updates instead of sending them
    #[arg(
        long,
        env = "DRY_RUN",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub dry_run: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// The flag/env layer
    pub fn to_layer(&self) -> PartialConfig {
        PartialConfig {
            domain: self.domain.clone(),
            interval: self.interval.clone().map(DurationValue::Text),
            key: self.key.clone().map(Secret::new),
            email: self.email.clone(),
            token: self.token.clone().map(Secret::new),
            ip_lookup_url: self.ip_lookup_url.clone(),
            ip_lookup_timeout: self.ip_lookup_timeout.clone().map(DurationValue::Text),
            dry_run: self.dry_run,
            log_level: self.log_level.clone(),
            event_channel_capacity: None,
        }
    }
}
