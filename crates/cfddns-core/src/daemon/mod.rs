//! Update loop
//!
//! The [`Daemon`] is responsible for:
//! - Waking up once per interval
//! - Listing the zone's records via [`DnsProvider`]
//! - Resolving the public address via [`IpResolver`]
//! - Updating every A record whose content has drifted
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────┐  tick   ┌──────────────┐  list/update  ┌─────────────┐
//!   │  Ticker  │────────▶│    Daemon    │──────────────▶│ DnsProvider │
//!   └──────────┘         └──────────────┘               └─────────────┘
//!        ▲                  │        │
//!        │ cancelled()      │        │ resolve          ┌─────────────┐
//!   ┌───────────────────┐   │        └─────────────────▶│ IpResolver  │
//!   │ CancellationToken │   │                           └─────────────┘
//!   └───────────────────┘   ▼
//!                     DaemonEvent (bounded mpsc)
//! ```
//!
//! ## States
//!
//! 1. **Waiting**: suspended on `select!` between the ticker and the token
//! 2. **Reconciling**: processing one tick's record set, strictly in order
//! 3. **Stopped**: the token was cancelled; terminal
//!
//! Nothing inside the loop is fatal. A failed listing skips the tick, a
//! failed lookup skips the tick's address records, a failed update skips
//! that record. The next tick is the retry.

use crate::config::DaemonConfig;
use crate::error::{Error, Result};
use crate::record::{DnsRecord, ZoneId};
use crate::traits::{DnsProvider, IpResolver};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the daemon for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Loop started
    Started {
        zone_id: ZoneId,
        interval: Duration,
    },

    /// Listing the zone failed; the tick was skipped
    ListFailed {
        error: String,
    },

    /// Public address lookup failed; the tick's address records were skipped
    ResolveFailed {
        error: String,
    },

    /// A record was rewritten with the resolved address
    RecordUpdated {
        record_id: String,
        record_name: String,
        previous_content: String,
        new_content: String,
    },

    /// The provider rejected or failed an update
    UpdateFailed {
        record_id: String,
        record_name: String,
        error: String,
    },

    /// One reconciliation pass finished
    TickCompleted(TickReport),

    /// Loop stopped
    Stopped {
        reason: String,
    },
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records returned by the listing
    pub records_listed: usize,
    /// A records examined
    pub address_records: usize,
    /// Records rewritten
    pub updated: usize,
    /// A records already pointing at the resolved address
    pub unchanged: usize,
    /// Updates the provider failed
    pub failed: usize,
    /// Address resolved during this tick, if any
    pub resolved_ip: Option<Ipv4Addr>,
    /// Listing failed; nothing else was attempted
    pub list_failed: bool,
    /// Address lookup failed; no A record was touched
    pub resolve_failed: bool,
    /// Cancellation was observed mid-pass
    pub interrupted: bool,
}

/// Dynamic DNS update loop for one zone
///
/// ## Lifecycle
///
/// 1. Create with [`Daemon::new()`]
/// 2. Drive with [`Daemon::run()`] or [`Daemon::spawn()`]
/// 3. Cancel the token to stop
///
/// The first tick fires one full interval after start. If a pass overruns
/// the interval, missed ticks are skipped rather than replayed.
pub struct Daemon {
    /// Zone whose records are managed
    zone_id: ZoneId,

    /// DNS provider for listing and updating records
    provider: Box<dyn DnsProvider>,

    /// Public address discovery strategy
    resolver: Box<dyn IpResolver>,

    /// Ticker period
    interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<DaemonEvent>,
}

impl Daemon {
    /// Create a new daemon
    ///
    /// # Returns
    ///
    /// A tuple of (daemon, event_receiver). Dropping the receiver is fine;
    /// events are then discarded.
    pub fn new(
        zone_id: ZoneId,
        provider: Box<dyn DnsProvider>,
        resolver: Box<dyn IpResolver>,
        config: DaemonConfig,
    ) -> Result<(Self, mpsc::Receiver<DaemonEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let daemon = Self {
            zone_id,
            provider,
            resolver,
            interval: config.interval,
            event_tx: tx,
        };

        Ok((daemon, rx))
    }

    /// Zone whose records this daemon manages
    pub fn zone_id(&self) -> &ZoneId {
        &self.zone_id
    }

    /// Time between reconciliation passes
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting update loop for zone {} via {} (interval: {:?})",
            self.zone_id,
            self.provider.provider_name(),
            self.interval
        );
        self.emit_event(DaemonEvent::Started {
            zone_id: self.zone_id.clone(),
            interval: self.interval,
        });

        let Some(first_tick) = Instant::now().checked_add(self.interval) else {
            error!("Interval {:?} is out of range, update loop not started", self.interval);
            self.emit_event(DaemonEvent::Stopped {
                reason: "Interval out of range".to_string(),
            });
            return;
        };
        let mut ticker = time::interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping update loop");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.reconcile_until(&shutdown).await;
                    self.emit_event(DaemonEvent::TickCompleted(report));
                }
            }
        }

        self.emit_event(DaemonEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    /// Run on a new tokio task
    pub fn spawn(self, shutdown: CancellationToken) -> DaemonHandle {
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });

        DaemonHandle {
            shutdown,
            task: Some(task),
        }
    }

    /// Perform one reconciliation pass immediately
    pub async fn reconcile(&self) -> TickReport {
        self.reconcile_until(&CancellationToken::new()).await
    }

    async fn reconcile_until(&self, shutdown: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        let records = match self.provider.list_records(&self.zone_id).await {
            Ok(records) => records,
            Err(e) => {
                log_failure(&e, format_args!("Failed to list records for zone {}", self.zone_id));
                report.list_failed = true;
                self.emit_event(DaemonEvent::ListFailed {
                    error: e.to_string(),
                });
                return report;
            }
        };
        report.records_listed = records.len();
        debug!("Listed {} record(s) in zone {}", records.len(), self.zone_id);

        // Looked up lazily on the first A record, then reused for the tick.
        let mut resolved: Option<Option<Ipv4Addr>> = None;

        for record in &records {
            if shutdown.is_cancelled() {
                debug!("Cancelled mid-pass, leaving remaining records for a later run");
                report.interrupted = true;
                break;
            }

            if !record.is_managed() {
                continue;
            }
            report.address_records += 1;

            let ip = match resolved {
                Some(ip) => ip,
                None => {
                    let ip = self.resolve_current_ip(&mut report).await;
                    resolved = Some(ip);
                    ip
                }
            };
            let Some(ip) = ip else {
                continue;
            };

            self.reconcile_record(record, ip, &mut report).await;
        }

        report
    }

    async fn resolve_current_ip(&self, report: &mut TickReport) -> Option<Ipv4Addr> {
        match self.resolver.resolve().await {
            Ok(ip) => {
                debug!("Resolved public address {} via {}", ip, self.resolver.resolver_name());
                report.resolved_ip = Some(ip);
                Some(ip)
            }
            Err(e) => {
                log_failure(
                    &e,
                    format_args!(
                        "Failed to resolve public address via {}",
                        self.resolver.resolver_name()
                    ),
                );
                report.resolve_failed = true;
                self.emit_event(DaemonEvent::ResolveFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn reconcile_record(&self, record: &DnsRecord, ip: Ipv4Addr, report: &mut TickReport) {
        let current = ip.to_string();
        if record.content == current {
            debug!("Record {} ({}) already points at {}", record.name, record.id, current);
            report.unchanged += 1;
            return;
        }

        let desired = record.with_content(current.clone());
        match self
            .provider
            .update_record(&self.zone_id, &record.id, &desired)
            .await
        {
            Ok(()) => {
                info!(
                    "updated record {} ({}): {} -> {}",
                    record.name, record.id, record.content, current
                );
                report.updated += 1;
                self.emit_event(DaemonEvent::RecordUpdated {
                    record_id: record.id.clone(),
                    record_name: record.name.clone(),
                    previous_content: record.content.clone(),
                    new_content: current,
                });
            }
            Err(e) => {
                log_failure(
                    &e,
                    format_args!("Failed to update record {} ({})", record.name, record.id),
                );
                report.failed += 1;
                self.emit_event(DaemonEvent::UpdateFailed {
                    record_id: record.id.clone(),
                    record_name: record.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit an event without ever blocking the loop
    fn emit_event(&self, event: DaemonEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn log_failure(e: &Error, context: std::fmt::Arguments<'_>) {
    if e.is_transient() {
        warn!("{}: {}", context, e);
    } else {
        error!("{}: {}", context, e);
    }
}

/// Handle to a daemon running on its own task
pub struct DaemonHandle {
    shutdown: CancellationToken,
    /// `None` once the task's exit has been observed
    task: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Token that stops the daemon when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Wait for the task to exit without cancelling or consuming the handle
    ///
    /// Cancel safe, so it can race other futures in `select!`. Once the exit
    /// has been observed, later calls return `Ok(())` immediately.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await.map_err(|e| Error::Task(e.to_string()));
        self.task = None;
        result
    }

    /// Cancel the daemon and wait for the task to exit
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        self.wait().await
    }

    /// Wait for the task to exit without cancelling it
    pub async fn join(mut self) -> Result<()> {
        self.wait().await
    }
}
