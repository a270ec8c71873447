//! DNS data model shared by providers and the daemon

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque provider-assigned zone identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// DNS record type
///
/// Only [`RecordType::A`] is managed; everything else is carried through
/// untouched so that listing a zone never fails on an unfamiliar type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical name record
    Cname,
    /// Any other type, kept verbatim
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Other(other) => other,
        }
    }
}

impl From<String> for RecordType {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            _ => RecordType::Other(s),
        }
    }
}

impl From<&str> for RecordType {
    fn from(s: &str) -> Self {
        RecordType::from(s.to_string())
    }
}

impl From<RecordType> for String {
    fn from(t: RecordType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as published by the DNS provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record id
    pub id: String,

    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Fully-qualified record name
    pub name: String,

    /// Record content; a dotted-quad address for A records
    pub content: String,

    /// Owning zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<ZoneId>,

    /// Time-to-live in seconds (1 means "automatic" on Cloudflare)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,

    /// Whether the provider proxies traffic for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
}

impl DnsRecord {
    /// Create a record with only the fields the daemon looks at
    pub fn new(
        id: impl Into<String>,
        record_type: impl Into<RecordType>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            name: name.into(),
            content: content.into(),
            zone_id: None,
            ttl: None,
            proxied: None,
        }
    }

    /// Whether this is an address record the daemon manages
    pub fn is_managed(&self) -> bool {
        self.record_type == RecordType::A
    }

    /// Copy of this record with `content` replaced and every other field kept
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }
}
