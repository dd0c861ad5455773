use dashmap::DashMap;
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// ── Types ──────────────────────────────────────────────────────────────────

/// Where a visitor's IP resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

/// Optional IP → location lookup against ip-api.com.
///
/// Results (including misses) are memoised per IP for the life of the process
/// so the same address is never looked up twice. When disabled, every lookup
/// returns `None` without touching the network and click metadata falls back
/// to proxy headers.
#[derive(Clone, Debug)]
pub struct GeoResolver {
    enabled: bool,
    client: reqwest::Client,
    cache: Arc<DashMap<String, Option<GeoInfo>>>,
}

impl GeoResolver {
    pub fn new(enabled: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_default();

        Self {
            enabled,
            client,
            cache: Arc::new(DashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve `ip`, consulting the memo first.
    ///
    /// Returns `None` when disabled, for private / loopback / link-local
    /// addresses, on failed or rate-limited API responses, and for IPs that
    /// previously returned no useful data.
    pub async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        if !self.enabled || is_private(ip) {
            return None;
        }

        if let Some(entry) = self.cache.get(ip) {
            return entry.clone();
        }

        let result = self.fetch(ip).await;
        self.cache.insert(ip.to_owned(), result.clone());
        result
    }

    async fn fetch(&self, ip: &str) -> Option<GeoInfo> {
        let url = format!("http://ip-api.com/json/{}?fields=status,country,city", ip);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| tracing::debug!("geo lookup network error for {}: {}", ip, e))
            .ok()?;

        let body: IpApiResponse = resp
            .json()
            .await
            .map_err(|e| tracing::debug!("geo lookup parse error for {}: {}", ip, e))
            .ok()?;

        if body.status != "success" {
            tracing::debug!("geo lookup returned non-success status for {}", ip);
            return None;
        }

        let country = body.country.filter(|s| !s.is_empty()).unwrap_or_default();
        let city = body.city.filter(|s| !s.is_empty()).unwrap_or_default();
        if country.is_empty() && city.is_empty() {
            return None;
        }

        Some(GeoInfo { country, city })
    }
}

impl Default for GeoResolver {
    fn default() -> Self {
        Self::disabled()
    }
}

// ── ip-api.com response shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    city: Option<String>,
}

/// Addresses that must never be sent to a public geolocation API.
fn is_private(ip_str: &str) -> bool {
    // "::ffff:1.2.3.4" → "1.2.3.4"
    let ip_str = ip_str.strip_prefix("::ffff:").unwrap_or(ip_str);

    match IpAddr::from_str(ip_str) {
        Ok(IpAddr::V4(addr)) => {
            let octets = addr.octets();
            addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_broadcast()
                || octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
        }
        Ok(IpAddr::V6(addr)) => {
            addr.is_loopback()
                || addr.is_unspecified()
                // fe80::/10
                || (addr.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7
                || (addr.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_skipped() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.20.0.1", "192.168.1.1", "::1", "fe80::1", "::ffff:10.0.0.1", "unknown"] {
            assert!(is_private(ip), "{ip} should be private");
        }
        for ip in ["8.8.8.8", "2001:4860:4860::8888", "172.32.0.1"] {
            assert!(!is_private(ip), "{ip} should be public");
        }
    }

    #[tokio::test]
    async fn disabled_resolver_never_resolves() {
        let resolver = GeoResolver::disabled();
        assert!(!resolver.is_enabled());
        assert_eq!(resolver.lookup("8.8.8.8").await, None);
    }
}
