//! Test doubles and common utilities for daemon contract tests
//!
//! The doubles keep their counters behind `Arc`s so a test can hand one
//! instance to the daemon and keep a sibling (see `sharing_counters_with`)
//! to make assertions after the daemon has taken ownership.

#![allow(dead_code)]

use cfddns_core::config::DaemonConfig;
use cfddns_core::error::{Error, Result};
use cfddns_core::record::{DnsRecord, ZoneId};
use cfddns_core::traits::{DnsProvider, IpResolver};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ZONE: &str = "023e105f4ecef8ad9ca31a8372d0c353";

pub fn zone() -> ZoneId {
    ZoneId::new(ZONE)
}

/// Daemon config with the given tick period
pub fn daemon_config(interval: Duration) -> DaemonConfig {
    DaemonConfig {
        interval,
        event_channel_capacity: 256,
    }
}

/// `[{id:1,A,"1.2.3.4"}, {id:2,CNAME,"example.com"}]`
pub fn scenario_records() -> Vec<DnsRecord> {
    vec![
        zoned(DnsRecord::new("1", "A", "home.example.com", "1.2.3.4")),
        zoned(DnsRecord::new("2", "CNAME", "www.example.com", "example.com")),
    ]
}

pub fn zoned(mut record: DnsRecord) -> DnsRecord {
    record.zone_id = Some(zone());
    record
}

/// One recorded `update_record` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub zone_id: ZoneId,
    pub record_id: String,
    pub record: DnsRecord,
}

/// An in-memory provider that tracks calls and can be told to fail
pub struct MockDnsProvider {
    records: Arc<Mutex<Vec<DnsRecord>>>,
    list_call_count: Arc<AtomicUsize>,
    updates: Arc<Mutex<Vec<UpdateCall>>>,
    fail_listing: Arc<AtomicBool>,
    failing_record_ids: Arc<Mutex<HashSet<String>>>,
    list_delay: Arc<Mutex<Option<Duration>>>,
    update_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockDnsProvider {
    pub fn new(records: Vec<DnsRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(Mutex::new(Vec::new())),
            fail_listing: Arc::new(AtomicBool::new(false)),
            failing_record_ids: Arc::new(Mutex::new(HashSet::new())),
            list_delay: Arc::new(Mutex::new(None)),
            update_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a new MockDnsProvider that shares state with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            records: Arc::clone(&other.records),
            list_call_count: Arc::clone(&other.list_call_count),
            updates: Arc::clone(&other.updates),
            fail_listing: Arc::clone(&other.fail_listing),
            failing_record_ids: Arc::clone(&other.failing_record_ids),
            list_delay: Arc::clone(&other.list_delay),
            update_delay: Arc::clone(&other.update_delay),
        }
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.updates.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make `update_record` fail for this record id
    pub fn fail_updates_for(&self, record_id: &str) {
        self.failing_record_ids
            .lock()
            .unwrap()
            .insert(record_id.to_string());
    }

    /// Delay the next `list_records` call (simulates a slow API)
    pub fn delay_next_list(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    /// Delay every `update_record` call
    pub fn delay_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn zone_id_for_domain(&self, _domain: &str) -> Result<ZoneId> {
        Ok(zone())
    }

    async fn list_records(&self, zone_id: &ZoneId) -> Result<Vec<DnsRecord>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);

        let delay = self.list_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::http("connection refused"));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.zone_id.as_ref().is_none_or(|z| z == zone_id))
            .cloned()
            .collect())
    }

    async fn update_record(
        &self,
        zone_id: &ZoneId,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<()> {
        self.updates.lock().unwrap().push(UpdateCall {
            zone_id: zone_id.clone(),
            record_id: record_id.to_string(),
            record: record.clone(),
        });

        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_record_ids.lock().unwrap().contains(record_id) {
            return Err(Error::provider("mock", "invalid record state"));
        }

        let mut records = self.records.lock().unwrap();
        if let Some(stored) = records.iter_mut().find(|r| r.id == record_id) {
            *stored = record.clone();
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A resolver whose answer the test controls
pub struct MockResolver {
    answer: Arc<Mutex<Option<Ipv4Addr>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockResolver {
    pub fn returning(ip: Ipv4Addr) -> Self {
        Self {
            answer: Arc::new(Mutex::new(Some(ip))),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A resolver that fails like a malformed lookup response
    pub fn failing() -> Self {
        Self {
            answer: Arc::new(Mutex::new(None)),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            answer: Arc::clone(&other.answer),
            call_count: Arc::clone(&other.call_count),
        }
    }

    pub fn set_answer(&self, ip: Option<Ipv4Addr>) {
        *self.answer.lock().unwrap() = ip;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpResolver for MockResolver {
    async fn resolve(&self) -> Result<Ipv4Addr> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock().unwrap();
        answer.ok_or_else(|| Error::address_not_found("no <body> marker in response"))
    }

    fn resolver_name(&self) -> &'static str {
        "mock"
    }
}
