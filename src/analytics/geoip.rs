//! Geolocation using a local MaxMind GeoLite2/GeoIP2 City database
//!
//! Memory-mapped and shared behind an `Arc`, so clones are cheap and
//! lookups never leave the process.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;
use crate::analytics::resolver::GeoResolver;

#[derive(Clone)]
pub struct MmdbGeoResolver {
    city_reader: Arc<Reader<Mmap>>,
}

impl MmdbGeoResolver {
    /// Open a GeoLite2-City or GeoIP2-City `.mmdb` file
    pub fn new(city_path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;

        Ok(Self {
            city_reader: Arc::new(reader),
        })
    }

    /// Synchronous lookup; `None` when the database has no record for `ip`
    pub fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let result = self.city_reader.lookup(ip).ok()?;

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            let mut location = GeoLocation::default();
            extract_from_city(&city, &mut location);
            return Some(location);
        }

        // The City database is a superset of Country data
        if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
            let mut location = GeoLocation::default();
            extract_from_country(&country, &mut location);
            return Some(location);
        }

        None
    }
}

#[async_trait]
impl GeoResolver for MmdbGeoResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation> {
        self.lookup(ip)
            .ok_or_else(|| anyhow!("No GeoIP record for {}", ip))
    }
}

fn extract_from_city(city: &geoip2::City, location: &mut GeoLocation) {
    location.country_code = city.country.iso_code.map(|s| s.to_string());
    location.country_name = city.country.names.english.map(|s| s.to_string());

    if let Some(subdivision) = city.subdivisions.first() {
        location.region = subdivision.names.english.map(|s| s.to_string());
    }

    location.city = city.city.names.english.map(|s| s.to_string());
}

fn extract_from_country(country: &geoip2::Country, location: &mut GeoLocation) {
    location.country_code = country.country.iso_code.map(|s| s.to_string());
    location.country_name = country.country.names.english.map(|s| s.to_string());
}
