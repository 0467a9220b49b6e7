use std::net::IpAddr;
use std::path::Path;

use maxminddb::PathElement;

use super::{EnrichmentError, GeoInfo, GeoLookup, UNKNOWN_CITY};

/// Geolocation backed by a MaxMind GeoLite2/GeoIP2 City database.
pub struct MaxMindGeoLookup {
    city_reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindGeoLookup {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let city_reader = maxminddb::Reader::open_readfile(path).map_err(|e| {
            anyhow::anyhow!("Failed to open GeoIP database '{}': {}", path.display(), e)
        })?;
        Ok(Self { city_reader })
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn lookup(&self, ip: &str) -> Result<GeoInfo, EnrichmentError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| EnrichmentError::InvalidAddress(ip.to_owned()))?;

        let lookup = self
            .city_reader
            .lookup(addr)
            .map_err(|e| EnrichmentError::Lookup(ip.to_owned(), e.to_string()))?;
        if !lookup.has_data() {
            return Err(EnrichmentError::NotFound(ip.to_owned()));
        }

        let english_name = |key: &str| {
            lookup
                .decode_path::<String>(&[
                    PathElement::Key(key),
                    PathElement::Key("names"),
                    PathElement::Key("en"),
                ])
                .map_err(|e| EnrichmentError::Lookup(ip.to_owned(), e.to_string()))
        };

        Ok(geo_info(english_name("country")?, english_name("city")?))
    }
}

/// A found record may lack either name, e.g. one that only carries a
/// continent or registered country.
fn geo_info(country: Option<String>, city: Option<String>) -> GeoInfo {
    GeoInfo {
        country: country.unwrap_or_default(),
        city: city.unwrap_or_else(|| UNKNOWN_CITY.to_owned()),
    }
}

/// Used when no GeoIP database is configured: every address resolves to an
/// empty country and the unknown city.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeoLookup;

impl GeoLookup for NullGeoLookup {
    fn lookup(&self, ip: &str) -> Result<GeoInfo, EnrichmentError> {
        ip.parse::<IpAddr>()
            .map_err(|_| EnrichmentError::InvalidAddress(ip.to_owned()))?;
        Ok(GeoInfo::default())
    }
}
