// # DNS Provider Trait
//
// Defines the interface for reading and updating zone records via a DNS
// hosting provider's API.
//
// ## Implementations
//
// - Cloudflare: `cfddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone_id = provider.zone_id_for_domain("example.com").await?;
//     for record in provider.list_records(&zone_id).await? {
//         println!("{} {} {}", record.name, record.record_type, record.content);
//     }
//
//     Ok(())
// }
// ```

use crate::record::{DnsRecord, ZoneId};
use async_trait::async_trait;

/// Trait for DNS provider implementations
///
/// Providers are thin API clients. Deciding *whether* a record needs an
/// update is the daemon's job; a provider does exactly what it is told.
///
/// ## Allowed
/// - HTTP/HTTPS calls to the provider's own endpoints
/// - Parsing provider-specific responses
/// - Following pagination inside a single `list_records` call
///
/// ## Not allowed
/// - Retry or backoff loops (the daemon's next tick is the retry)
/// - Spawning tasks
/// - Caching records between calls
/// - Creating or deleting records
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Resolve a domain name to the provider's zone identifier
    ///
    /// Called once at startup. A failure here is fatal to the process.
    async fn zone_id_for_domain(&self, domain: &str) -> Result<ZoneId, crate::Error>;

    /// List every record in a zone, in provider order
    async fn list_records(&self, zone_id: &ZoneId) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Replace an existing record with `record`
    ///
    /// # Parameters
    ///
    /// - `zone_id`: The owning zone
    /// - `record_id`: The provider id of the record to overwrite
    /// - `record`: The full desired record state
    async fn update_record(
        &self,
        zone_id: &ZoneId,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
