// # cfddnsd - Cloudflare DDNS Daemon
//
// Thin bootstrap around cfddns-core. All update logic lives in the library;
// this binary only:
// 1. Assembles configuration from flags, environment and a YAML file
// 2. Initializes tracing and the runtime
// 3. Resolves the domain's zone id (fatal on failure)
// 4. Starts the update loop and stops it on SIGINT/SIGTERM
//
// ## Configuration
//
// Precedence is flag > environment > config file > default.
//
// | Flag                  | Environment         | Default                      |
// |-----------------------|---------------------|------------------------------|
// | `--config`            | `CONFIG`            | `$HOME/.cfddns.yaml`         |
// | `--domain`            | `DOMAIN`            | (required)                   |
// | `--interval`          | `INTERVAL`          | `1h`                         |
// | `--key` + `--email`   | `KEY` + `EMAIL`     | (these, or a token)          |
// | `--token`             | `TOKEN`             |                              |
// | `--ip-lookup-url`     | `IP_LOOKUP_URL`     | `http://checkip.dyndns.org/` |
// | `--ip-lookup-timeout` | `IP_LOOKUP_TIMEOUT` | `10s`                        |
// | `--dry-run`           | `DRY_RUN`           | `false`                      |
// | `--log-level`         | `LOG_LEVEL`         | `info`                       |
//
// ## Example
//
// ```bash
// export KEY=your_global_api_key
// export EMAIL=you@example.com
//
// cfddnsd --domain example.com --interval 15m
// ```

mod cli;

use anyhow::{Context, Result};
use cfddns_core::config::{CfddnsConfig, DEFAULT_CONFIG_FILE_NAME, PartialConfig};
use cfddns_core::{Daemon, DaemonEvent, DaemonHandle, DnsProvider};
use cfddns_ip_http::CheckIpResolver;
use cfddns_provider_cloudflare::CloudflareProvider;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use cli::Cli;

/// How long the update loop may take to finish its in-flight work
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CfddnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CfddnsExitCode> for ExitCode {
    fn from(code: CfddnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Where the file layer was read from
fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => dirs::home_dir()
            .map(|home| home.join(DEFAULT_CONFIG_FILE_NAME))
            .filter(|path| path.is_file()),
    }
}

/// Merge all layers into a validated configuration
///
/// An explicitly named config file must exist; the default one is optional.
fn load_config(cli: &Cli) -> Result<(CfddnsConfig, Option<PathBuf>)> {
    let path = config_file_path(cli.config.as_deref());

    let file_layer = match &path {
        Some(path) => PartialConfig::from_yaml_file(path)?,
        None => PartialConfig::default(),
    };

    let config = file_layer
        .overlay(cli.to_layer())
        .into_config()
        .context("invalid configuration")?;

    Ok((config, path))
}

fn log_level(name: &str) -> Level {
    match name {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, config_path) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CfddnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&config.log_level))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CfddnsExitCode::ConfigError.into();
    }

    info!("Starting cfddnsd");
    match &config_path {
        Some(path) => info!("Using config file: {}", path.display()),
        None => debug!("No config file found, using flags and environment only"),
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CfddnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let handle = match start_daemon(&config).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return CfddnsExitCode::ConfigError;
            }
        };

        match supervise(handle, wait_for_shutdown_signal()).await {
            Ok(()) => CfddnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                CfddnsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Build the collaborators, resolve the zone and spawn the update loop
async fn start_daemon(config: &CfddnsConfig) -> Result<DaemonHandle> {
    let provider = CloudflareProvider::from_config(config)?;

    let zone_id = provider
        .zone_id_for_domain(&config.domain)
        .await
        .with_context(|| format!("cannot resolve zone for {}", config.domain))?;
    info!("Managing zone {} ({})", config.domain, zone_id);

    let resolver = CheckIpResolver::from_config(&config.ip_lookup)?;
    info!("Resolving public address via {}", resolver.url());

    let (daemon, events) = Daemon::new(
        zone_id,
        Box::new(provider),
        Box::new(resolver),
        config.daemon.clone(),
    )?;

    tokio::spawn(log_events(events));

    Ok(daemon.spawn(CancellationToken::new()))
}

/// Consume daemon events; per-record outcomes are already logged by the loop
async fn log_events(mut events: mpsc::Receiver<DaemonEvent>) {
    while let Some(event) = events.recv().await {
        if let DaemonEvent::TickCompleted(report) = event {
            debug!(
                "Pass finished: {} listed, {} A, {} updated, {} unchanged, {} failed",
                report.records_listed,
                report.address_records,
                report.updated,
                report.unchanged,
                report.failed
            );
        }
    }
}

/// Wait for a shutdown signal, then stop the loop within the drain timeout
///
/// If the loop task exits before any signal arrives, that is a runtime
/// failure: the process must not linger without updating DNS.
async fn supervise<S>(mut handle: DaemonHandle, shutdown_signal: S) -> Result<()>
where
    S: Future<Output = Result<&'static str>>,
{
    let signal = tokio::select! {
        signal = shutdown_signal => signal?,
        exited = handle.wait() => {
            return Err(match exited {
                Ok(()) => anyhow::anyhow!("update loop exited before a shutdown signal"),
                Err(e) => anyhow::Error::new(e).context("update loop died"),
            });
        }
    };
    info!("Received shutdown signal: {}", signal);

    tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle.shutdown())
        .await
        .map_err(|_| anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_DRAIN_TIMEOUT))??;

    info!("cfddnsd stopped");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfddns_core::config::DaemonConfig;
    use cfddns_core::{DnsRecord, IpResolver, ZoneId};
    use std::net::Ipv4Addr;

    /// Provider whose first listing takes the loop task down
    struct PanickingProvider;

    #[async_trait::async_trait]
    impl DnsProvider for PanickingProvider {
        async fn zone_id_for_domain(&self, _domain: &str) -> cfddns_core::Result<ZoneId> {
            Ok(ZoneId::new("zone"))
        }

        async fn list_records(&self, _zone_id: &ZoneId) -> cfddns_core::Result<Vec<DnsRecord>> {
            panic!("listing blew up");
        }

        async fn update_record(
            &self,
            _: &ZoneId,
            _: &str,
            _: &DnsRecord,
        ) -> cfddns_core::Result<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "panicking"
        }
    }

    /// Provider with an empty zone
    struct EmptyProvider;

    #[async_trait::async_trait]
    impl DnsProvider for EmptyProvider {
        async fn zone_id_for_domain(&self, _domain: &str) -> cfddns_core::Result<ZoneId> {
            Ok(ZoneId::new("zone"))
        }

        async fn list_records(&self, _zone_id: &ZoneId) -> cfddns_core::Result<Vec<DnsRecord>> {
            Ok(Vec::new())
        }

        async fn update_record(
            &self,
            _: &ZoneId,
            _: &str,
            _: &DnsRecord,
        ) -> cfddns_core::Result<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "empty"
        }
    }

    struct FixedResolver;

    #[async_trait::async_trait]
    impl IpResolver for FixedResolver {
        async fn resolve(&self) -> cfddns_core::Result<Ipv4Addr> {
            Ok(Ipv4Addr::new(1, 2, 3, 4))
        }

        fn resolver_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn spawn_with(provider: Box<dyn DnsProvider>) -> DaemonHandle {
        let (daemon, _events) = Daemon::new(
            ZoneId::new("zone"),
            provider,
            Box::new(FixedResolver),
            DaemonConfig::new(Duration::from_secs(60)),
        )
        .unwrap();
        daemon.spawn(CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_fails_when_loop_dies() {
        let handle = spawn_with(Box::new(PanickingProvider));

        let never = std::future::pending::<Result<&'static str>>();
        let err = supervise(handle, never).await.unwrap_err();

        assert!(format!("{:#}", err).contains("update loop died"), "got {:#}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_stops_loop_on_signal() {
        let handle = spawn_with(Box::new(EmptyProvider));
        let token = handle.shutdown_token();

        let signal = async {
            tokio::time::sleep(Duration::from_secs(150)).await;
            Ok("SIGTERM")
        };
        supervise(handle, signal).await.unwrap();

        assert!(token.is_cancelled());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CfddnsExitCode::CleanShutdown as u8, 0);
        assert_eq!(CfddnsExitCode::ConfigError as u8, 1);
        assert_eq!(CfddnsExitCode::RuntimeError as u8, 2);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level("trace"), Level::TRACE);
        assert_eq!(log_level("warn"), Level::WARN);
        assert_eq!(log_level("info"), Level::INFO);
    }

    #[test]
    fn test_explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfddns.yaml");
        std::fs::write(
            &path,
            "domain: example.com\ninterval: 10m\nkey: abcdef\nemail: ops@example.com\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "cfddnsd",
            "--config",
            path.to_str().unwrap(),
            "--interval",
            "5m",
        ])
        .unwrap();
        let (config, used) = load_config(&cli).unwrap();

        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.daemon.interval, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let cli = Cli::try_parse_from(["cfddnsd", "--config", path.to_str().unwrap()]).unwrap();

        assert!(load_config(&cli).is_err());
    }
}
