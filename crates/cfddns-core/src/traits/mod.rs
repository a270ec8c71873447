//! Core traits for cfddns
//!
//! - [`IpResolver`]: Discover the host's public IPv4 address
//! - [`DnsProvider`]: List and update zone records via a provider API

pub mod dns_provider;
pub mod ip_resolver;

pub use dns_provider::DnsProvider;
pub use ip_resolver::IpResolver;
