//! Geolocation and user-agent enrichment of parsed lines.
//!
//! Both lookups sit behind traits so the pipeline can run with a MaxMind
//! database, without one, or with fixed tables in tests.

pub mod geoip;
pub mod user_agent;

use derive_more::Display;

pub use geoip::{MaxMindGeoLookup, NullGeoLookup};
pub use user_agent::{build_ua_engine, UaEngine, UaEngineKind};

pub const UNKNOWN_CITY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum EnrichmentError {
    #[display(fmt = "'{}' is not a valid IP address", _0)]
    InvalidAddress(String),

    #[display(fmt = "no geolocation record for {}", _0)]
    NotFound(String),

    #[display(fmt = "geolocation lookup for {} failed: {}", _0, _1)]
    Lookup(String, String),
}

impl std::error::Error for EnrichmentError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    /// English country name, empty when the database has none
    pub country: String,
    /// English city name, `"Unknown"` when the database has none
    pub city: String,
}

impl Default for GeoInfo {
    fn default() -> Self {
        GeoInfo {
            country: String::new(),
            city: UNKNOWN_CITY.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserAgentInfo {
    pub browser_family: String,
    pub browser_version: String,
    pub platform_family: String,
    pub platform_version: String,
    pub device_family: String,
    pub device_brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedFields {
    pub geo: GeoInfo,
    pub ua: UserAgentInfo,
}

/// Resolves an address to a country and city.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<GeoInfo, EnrichmentError>;
}

/// Breaks a user-agent string into browser, platform and device. Never fails.
pub trait UserAgentLookup: Send + Sync {
    fn lookup(&self, user_agent: &str) -> UserAgentInfo;
}

pub struct Enricher {
    geo: Box<dyn GeoLookup>,
    ua: Box<dyn UserAgentLookup>,
}

impl Enricher {
    pub fn new(geo: impl GeoLookup + 'static, ua: impl UserAgentLookup + 'static) -> Self {
        Enricher {
            geo: Box::new(geo),
            ua: Box::new(ua),
        }
    }

    pub fn enrich(&self, ip: &str, user_agent: &str) -> Result<EnrichedFields, EnrichmentError> {
        let geo = self.geo.lookup(ip)?;
        let ua = self.ua.lookup(user_agent);
        Ok(EnrichedFields { geo, ua })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyLocalhost;

    impl GeoLookup for OnlyLocalhost {
        fn lookup(&self, ip: &str) -> Result<GeoInfo, EnrichmentError> {
            if ip == "127.0.0.1" {
                Ok(GeoInfo {
                    country: "Nowhere".to_owned(),
                    city: "Home".to_owned(),
                })
            } else {
                Err(EnrichmentError::NotFound(ip.to_owned()))
            }
        }
    }

    struct EchoAgent;

    impl UserAgentLookup for EchoAgent {
        fn lookup(&self, user_agent: &str) -> UserAgentInfo {
            UserAgentInfo {
                browser_family: user_agent.to_owned(),
                ..UserAgentInfo::default()
            }
        }
    }

    #[test]
    fn combines_both_lookups() {
        let enricher = Enricher::new(OnlyLocalhost, EchoAgent);
        let fields = enricher.enrich("127.0.0.1", "curl").unwrap();
        assert_eq!(fields.geo.city, "Home");
        assert_eq!(fields.ua.browser_family, "curl");
    }

    #[test]
    fn geo_failure_is_propagated() {
        let enricher = Enricher::new(OnlyLocalhost, EchoAgent);
        assert_eq!(
            enricher.enrich("8.8.8.8", "curl"),
            Err(EnrichmentError::NotFound("8.8.8.8".to_owned()))
        );
    }

    #[test]
    fn default_geo_has_unknown_city() {
        let geo = GeoInfo::default();
        assert_eq!(geo.country, "");
        assert_eq!(geo.city, UNKNOWN_CITY);
    }
}
