// # IP Resolver Trait
//
// Defines the interface for discovering the host's public IPv4 address.
//
// ## Implementations
//
// - checkip-style HTML scraping: `cfddns-ip-http` crate
// - Future: structured JSON/plain-text lookup services
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::IpResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* IpResolver implementation */;
//
//     let ip = resolver.resolve().await?;
//     println!("public address: {}", ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public IP discovery strategies
///
/// The daemon calls [`IpResolver::resolve`] at most once per tick and never
/// caches the answer across ticks, so implementations should not cache
/// either.
///
/// # Contract
///
/// - One lookup per call; no retries (the next tick is the retry)
/// - Returns a syntactically valid address or an error, never a best guess
/// - Transport failures map to [`crate::Error::Http`]
/// - Unexpected response bodies map to [`crate::Error::AddressNotFound`]
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Look up the current public IPv4 address
    async fn resolve(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Short name for logs (e.g., "checkip")
    fn resolver_name(&self) -> &'static str;
}
