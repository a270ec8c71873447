// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare API v4 client used by cfddns.
//
// ## What it does
//
// - Resolves a domain name to a zone id (once, at startup)
// - Lists every record of a zone, following pagination
// - Replaces a single record with the state the daemon asks for
//
// ## What it does not do
//
// - Decide whether an update is needed (owned by `Daemon`)
// - Retry, back off or rate limit (the daemon's next tick is the retry)
// - Create or delete records
// - Spawn tasks or cache anything between calls
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or `Debug` output
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=N&per_page=100`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use cfddns_core::config::{CfddnsConfig, Credentials};
use cfddns_core::record::{DnsRecord, ZoneId};
use cfddns_core::traits::DnsProvider;
use cfddns_core::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for record listing (Cloudflare's documented default)
const RECORDS_PER_PAGE: u32 = 100;

/// TTL value Cloudflare interprets as "automatic"
const AUTOMATIC_TTL: u32 = 1;

/// Longest slice of an unexpected response body quoted in errors
const MAX_QUOTED_BODY: usize = 200;

/// Response envelope shared by every Cloudflare v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

/// Body of a record replacement
#[derive(Debug, Serialize)]
struct UpdatePayload<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

impl<'a> From<&'a DnsRecord> for UpdatePayload<'a> {
    fn from(record: &'a DnsRecord) -> Self {
        Self {
            record_type: record.record_type.as_str(),
            name: &record.name,
            content: &record.content,
            ttl: record.ttl.unwrap_or(AUTOMATIC_TTL),
            proxied: record.proxied,
        }
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended PUT payload
/// - **NOT** modify DNS records
pub struct CloudflareProvider {
    /// API credentials
    /// ⚠️ NEVER log these
    credentials: Credentials,

    /// API base URL
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip PUT updates
    dry_run: bool,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.credentials {
            Credentials::ApiKey { .. } => "api_key",
            Credentials::ApiToken(_) => "api_token",
        };
        f.debug_struct("CloudflareProvider")
            .field("auth", &auth)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `credentials`: API key + email, or a token with Zone:Read and DNS:Edit
    /// - `dry_run`: If true, perform GET requests but skip PUT updates
    pub fn new(credentials: Credentials, dry_run: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Create a provider from the validated process configuration
    pub fn from_config(config: &CfddnsConfig) -> Result<Self> {
        if config.dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }
        Self::new(config.credentials.clone(), config.dry_run)
    }

    /// Point the provider at a different API root (testing, API gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use an existing HTTP client
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::ApiKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key.expose()),
            Credentials::ApiToken(token) => request.bearer_auth(token.expose()),
        }
    }

    /// Send an authorized request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = self
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read response: {}", context, e)))?;

        if !status.is_success() {
            return Err(status_error(status, &body, context));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider(
                "cloudflare",
                format!("{}: unexpected response format: {}", context, e),
            )
        })?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("{}: {}", context, describe_errors(&envelope.errors, &body)),
            ));
        }

        Ok(envelope)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// ```
    async fn zone_id_for_domain(&self, domain: &str) -> Result<ZoneId> {
        tracing::debug!("Looking up zone ID for domain: {}", domain);

        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", domain)]);
        let envelope: Envelope<Vec<Zone>> = self.send(request, "zone lookup").await?;

        let zone = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(domain))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no zone named {} is visible to these credentials (use the apex domain of the zone)",
                    domain
                ))
            })?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(ZoneId::new(zone.id))
    }

    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?page=1&per_page=100
    /// GET /zones/:zone_id/dns_records?page=2&per_page=100
    /// ...
    /// ```
    async fn list_records(&self, zone_id: &ZoneId) -> Result<Vec<DnsRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = self.client.get(&url).query(&[
                ("page", page.to_string()),
                ("per_page", RECORDS_PER_PAGE.to_string()),
            ]);
            let envelope: Envelope<Vec<DnsRecord>> = self.send(request, "list records").await?;

            let batch = envelope.result.unwrap_or_default();
            let fetched = batch.len();
            records.extend(batch.into_iter().map(|mut record| {
                record.zone_id.get_or_insert_with(|| zone_id.clone());
                record
            }));

            let total_pages = envelope.result_info.map_or(1, |info| info.total_pages);
            if fetched == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} record(s) in zone {}", records.len(), zone_id);
        Ok(records)
    }

    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// { "type": "A", "name": "...", "content": "1.2.3.4", "ttl": 1, "proxied": false }
    /// ```
    async fn update_record(
        &self,
        zone_id: &ZoneId,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id);
        let payload = UpdatePayload::from(record);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                serde_json::to_string(&payload)?
            );
            return Ok(());
        }

        let request = self.client.put(&url).json(&payload);
        let _: Envelope<serde_json::Value> = self.send(request, "update record").await?;

        tracing::debug!("Cloudflare accepted update of {} ({})", record.name, record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid credentials or insufficient permissions ({})",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, api_error_detail(body))),
        429 => Error::rate_limited(format!("{}: Cloudflare rate limit exceeded ({})", context, status)),
        500..=599 => Error::http(format!(
            "{}: Cloudflare server error (transient): {}",
            context, status
        )),
        _ => Error::provider(
            "cloudflare",
            format!("{}: {} - {}", context, status, api_error_detail(body)),
        ),
    }
}

/// Best-effort description of an error response body
fn api_error_detail(body: &str) -> String {
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) if !envelope.errors.is_empty() => describe_errors(&envelope.errors, body),
        _ => quote(body.trim()).to_string(),
    }
}

fn describe_errors(errors: &[ApiMessage], body: &str) -> String {
    if errors.is_empty() {
        return format!("request unsuccessful: {}", quote(body.trim()));
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

fn quote(s: &str) -> &str {
    match s.char_indices().nth(MAX_QUOTED_BODY) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
