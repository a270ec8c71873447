// # cfddns-core
//
// Core library for the cfddns dynamic DNS updater.
//
// ## Architecture Overview
//
// - **IpResolver**: Trait for discovering the host's public IPv4 address
// - **DnsProvider**: Trait for listing and updating zone records via a provider API
// - **Daemon**: Timer-driven loop that reconciles A records with the resolved address
// - **CfddnsConfig**: Layered, validated process configuration
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The loop knows nothing about HTTP; providers
//    and resolvers know nothing about scheduling
// 2. **No Gratuitous Writes**: A record is only updated when its content differs
// 3. **Nothing Fatal In The Loop**: Every runtime failure is logged and skipped
// 4. **Library-First**: The binary is a thin bootstrap around this crate

pub mod config;
pub mod daemon;
pub mod error;
pub mod record;
pub mod traits;

// Re-export core types for convenience
pub use config::{CfddnsConfig, Credentials, DaemonConfig, IpLookupConfig, PartialConfig, Secret};
pub use daemon::{Daemon, DaemonEvent, DaemonHandle, TickReport};
pub use error::{Error, Result};
pub use record::{DnsRecord, RecordType, ZoneId};
pub use traits::{DnsProvider, IpResolver};
