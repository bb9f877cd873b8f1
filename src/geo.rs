//! Geolocation enrichment with a bounded per-address cache
//!
//! Looks an address up against an ip-api.com-compatible service and caches
//! successful answers in an LRU. Every failure mode (timeout, non-success
//! status, malformed body) degrades to an empty record; a lookup can never
//! fail the caller.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use serde::Deserialize;
use tracing::debug;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const UNKNOWN: &str = "Unknown";

/// Coarse geographic/network metadata for a source address. Every field is
/// optional; display accessors substitute `Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
}

impl GeoRecord {
    pub fn country(&self) -> &str {
        self.country.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn city(&self) -> &str {
        self.city.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn isp(&self) -> &str {
        self.isp.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Wire format of the lookup service.
#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
    #[serde(default, rename = "regionName")]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    isp: Option<String>,
}

impl GeoResponse {
    /// Convert a wire response into a record, or `None` when the service
    /// reports the lookup itself failed.
    fn into_record(self) -> Option<GeoRecord> {
        if self.status != "success" {
            return None;
        }
        Some(GeoRecord {
            country: self.country,
            country_code: self.country_code,
            region: self.region,
            city: self.city,
            isp: self.isp,
        })
    }
}

/// Geolocation client memoizing successful lookups per address.
pub struct GeoClient {
    client: reqwest::Client,
    api_base: String,
    cache: Mutex<LruCache<String, GeoRecord>>,
}

impl GeoClient {
    pub fn new(api_base: String, capacity: NonZeroUsize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolve an address to a record. Returns an empty record on any
    /// failure; only successful lookups are cached.
    pub async fn lookup(&self, addr: &str) -> GeoRecord {
        if let Some(record) = self
            .cache
            .lock()
            .expect("geo cache mutex poisoned")
            .get(addr)
        {
            return record.clone();
        }

        match self.fetch(addr).await {
            Some(record) => {
                self.cache
                    .lock()
                    .expect("geo cache mutex poisoned")
                    .put(addr.to_string(), record.clone());
                record
            }
            None => GeoRecord::default(),
        }
    }

    async fn fetch(&self, addr: &str) -> Option<GeoRecord> {
        let url = format!(
            "{}/json/{}?fields=status,country,countryCode,regionName,city,isp",
            self.api_base, addr
        );

        let response = match self.client.get(&url).timeout(LOOKUP_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%addr, "geolocation lookup failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(%addr, status = %response.status(), "geolocation lookup rejected");
            return None;
        }

        match response.json::<GeoResponse>().await {
            Ok(body) => body.into_record(),
            Err(e) => {
                debug!(%addr, "malformed geolocation response: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_response() {
        let body = r#"{
            "status": "success",
            "country": "Germany",
            "countryCode": "DE",
            "regionName": "Berlin",
            "city": "Berlin",
            "isp": "Example Carrier"
        }"#;
        let record = serde_json::from_str::<GeoResponse>(body)
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record.country(), "Germany");
        assert_eq!(record.city(), "Berlin");
        assert_eq!(record.isp(), "Example Carrier");
    }

    #[test]
    fn failed_status_yields_no_record() {
        let body = r#"{"status": "fail"}"#;
        let parsed = serde_json::from_str::<GeoResponse>(body).unwrap();
        assert!(parsed.into_record().is_none());
    }

    #[test]
    fn missing_fields_render_as_unknown() {
        let record = GeoRecord::default();
        assert_eq!(record.country(), "Unknown");
        assert_eq!(record.city(), "Unknown");
        assert_eq!(record.isp(), "Unknown");
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_empty_record() {
        // Nothing listens on port 1; the connection is refused immediately.
        let geo = GeoClient::new("http://127.0.0.1:1".to_string(), NonZeroUsize::new(4).unwrap());
        // Must not error or panic, just come back empty.
        let record = geo.lookup("1.2.3.4").await;
        assert_eq!(record, GeoRecord::default());
    }

    #[tokio::test]
    async fn cache_capacity_is_bounded() {
        let geo = GeoClient::new("http://127.0.0.1:1".to_string(), NonZeroUsize::new(2).unwrap());
        {
            let mut cache = geo.cache.lock().unwrap();
            for i in 0..5 {
                cache.put(format!("10.0.0.{i}"), GeoRecord::default());
            }
            assert_eq!(cache.len(), 2);
        }
    }
}
