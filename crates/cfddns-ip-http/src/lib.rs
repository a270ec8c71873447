// # checkip HTTP Resolver
//
// This crate provides the public address lookup used by cfddns.
//
// ## Protocol
//
// One plain HTTP GET against a checkip-style service. The service answers
// with a tiny HTML page:
//
// ```text
// <html><head><title>Current IP Check</title></head>
// <body>Current IP Address: 203.0.113.7</body></html>
// ```
//
// The address is taken from between the `<body>` markers, after the
// `Current IP Address:` label, and must parse as an IPv4 address. Anything
// else is an error; a malformed page never turns into a DNS update.

use cfddns_core::config::{DEFAULT_IP_LOOKUP_TIMEOUT, DEFAULT_IP_LOOKUP_URL, IpLookupConfig};
use cfddns_core::traits::IpResolver;
use cfddns_core::{Error, Result};

use std::net::Ipv4Addr;
use std::time::Duration;

const BODY_OPEN: &str = "<body>";
const BODY_CLOSE: &str = "</body>";

/// Longest snippet of a bad response quoted in an error message
const MAX_QUOTED_LEN: usize = 64;

/// Resolver for checkip-style HTML responses
#[derive(Debug, Clone)]
pub struct CheckIpResolver {
    /// URL to fetch the page from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl CheckIpResolver {
    /// Create a resolver for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(url, client))
    }

    /// Create a resolver that uses an existing HTTP client
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// Resolver for the default checkip endpoint
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_IP_LOOKUP_URL, DEFAULT_IP_LOOKUP_TIMEOUT)
    }

    /// Resolver built from the validated lookup settings
    pub fn from_config(config: &IpLookupConfig) -> Result<Self> {
        Self::new(config.url.clone(), config.timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_body(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read response from {}: {}", self.url, e)))
    }
}

#[async_trait::async_trait]
impl IpResolver for CheckIpResolver {
    async fn resolve(&self) -> Result<Ipv4Addr> {
        let body = self.fetch_body().await?;
        let ip = parse_checkip_body(&body)?;
        tracing::debug!("{} reported public address {}", self.url, ip);
        Ok(ip)
    }

    fn resolver_name(&self) -> &'static str {
        "checkip"
    }
}

/// Extract the IPv4 address embedded in a checkip HTML page
///
/// Markers are matched case-insensitively. When the body has no `:` label
/// the whole body text is taken as the candidate.
pub fn parse_checkip_body(page: &str) -> Result<Ipv4Addr> {
    // ASCII lower-casing keeps byte offsets identical.
    let lowered = page.to_ascii_lowercase();

    let start = lowered
        .find(BODY_OPEN)
        .map(|i| i + BODY_OPEN.len())
        .ok_or_else(|| Error::address_not_found("response has no <body> element"))?;
    let len = lowered[start..]
        .find(BODY_CLOSE)
        .ok_or_else(|| Error::address_not_found("response has no closing </body> tag"))?;
    let inner = &page[start..start + len];

    let candidate = match inner.rfind(':') {
        Some(i) => &inner[i + 1..],
        None => inner,
    }
    .trim();

    candidate.parse::<Ipv4Addr>().map_err(|_| {
        Error::address_not_found(format!(
            "'{}' is not an IPv4 address",
            quote(candidate)
        ))
    })
}

fn quote(s: &str) -> &str {
    match s.char_indices().nth(MAX_QUOTED_LEN) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const DYNDNS_PAGE: &str = "<html><head><title>Current IP Check</title></head>\
        <body>Current IP Address: 9.9.9.9</body></html>\r\n";

    #[test]
    fn test_parse_checkip_page() {
        assert_eq!(parse_checkip_body(DYNDNS_PAGE).unwrap(), Ipv4Addr::new(9, 9, 9, 9));
    }

    #[test]
    fn test_parse_minimal_page() {
        let ip = parse_checkip_body("...<body>Current IP Address: 9.9.9.9</body>...").unwrap();
        assert_eq!(ip, Ipv4Addr::new(9, 9, 9, 9));
    }

    #[test]
    fn test_parse_tolerates_case_and_whitespace() {
        let page = "<HTML><BODY>\n  Current IP Address:   198.51.100.23 \n</BODY></HTML>";
        assert_eq!(parse_checkip_body(page).unwrap(), Ipv4Addr::new(198, 51, 100, 23));
    }

    #[test]
    fn test_parse_unlabelled_body() {
        assert_eq!(
            parse_checkip_body("<body>203.0.113.1</body>").unwrap(),
            Ipv4Addr::new(203, 0, 113, 1)
        );
    }

    #[test]
    fn test_missing_markers_is_an_error() {
        let err = parse_checkip_body("Current IP Address: 9.9.9.9").unwrap_err();
        assert!(matches!(err, Error::AddressNotFound(_)));

        let err = parse_checkip_body("<body>Current IP Address: 9.9.9.9").unwrap_err();
        assert!(matches!(err, Error::AddressNotFound(_)));
    }

    #[test]
    fn test_garbage_address_is_an_error() {
        for page in [
            "<body>Current IP Address: </body>",
            "<body>Current IP Address: 300.1.1.1</body>",
            "<body>Current IP Address: 9.9.9</body>",
            "<body>Current IP Address: 2001:db8::1</body>",
            "<body>Service Unavailable</body>",
            "",
        ] {
            let err = parse_checkip_body(page).unwrap_err();
            assert!(matches!(err, Error::AddressNotFound(_)), "page: {:?}", page);
        }
    }

    #[test]
    fn test_long_garbage_is_truncated_in_error() {
        let page = format!("<body>{}</body>", "x".repeat(500));
        let err = parse_checkip_body(&page).unwrap_err().to_string();
        assert!(err.len() < 200);
    }

    /// Serve a single canned HTTP response on a loopback port
    async fn serve_once(status_line: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "{}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{}/", addr)
    }

    fn loopback_resolver(url: String) -> CheckIpResolver {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        CheckIpResolver::with_client(url, client)
    }

    #[tokio::test]
    async fn test_resolve_over_http() {
        let url = serve_once("HTTP/1.1 200 OK", DYNDNS_PAGE).await;
        let resolver = loopback_resolver(url);

        assert_eq!(resolver.resolve().await.unwrap(), Ipv4Addr::new(9, 9, 9, 9));
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "<body>busy</body>").await;
        let resolver = loopback_resolver(url);

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unparseable_page_is_address_error() {
        let url = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>").await;
        let resolver = loopback_resolver(url);

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::AddressNotFound(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resolver = loopback_resolver(format!("http://{}/", addr));
        let err = resolver.resolve().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_config() {
        let config = IpLookupConfig {
            url: "http://dns.loopia.se/checkip/checkip.php".to_string(),
            timeout: Duration::from_secs(3),
        };
        let resolver = CheckIpResolver::from_config(&config).unwrap();

        assert_eq!(resolver.url(), "http://dns.loopia.se/checkip/checkip.php");
        assert_eq!(resolver.resolver_name(), "checkip");
    }
}
