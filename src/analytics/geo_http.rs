//! Geolocation through a third-party HTTP lookup service
//!
//! The service URL is a template containing `{ip}`, e.g.
//! `https://ipapi.co/{ip}/json/`. Responses are read leniently: both the
//! ipapi.co (`country_name`, `country_code`) and ip-api.com (`country`,
//! `countryCode`) shapes are understood.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::analytics::models::GeoLocation;
use crate::analytics::resolver::GeoResolver;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default, alias = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default, alias = "countryCode")]
    country_code: Option<String>,
    /// ipapi.co reports failures in-band
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    /// ip-api.com reports `"fail"` here
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpGeoResolver {
    client: reqwest::Client,
    url_template: String,
}

impl HttpGeoResolver {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build geolocation HTTP client")?;

        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn lookup_url(&self, ip: IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation> {
        let url = self.lookup_url(ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Geolocation request to {} failed", url))?
            .error_for_status()
            .context("Geolocation service returned an error status")?;

        let body: LookupResponse = response
            .json()
            .await
            .context("Failed to decode geolocation response")?;

        if body.error.unwrap_or(false) {
            return Err(anyhow!(
                "Geolocation service rejected {}: {}",
                ip,
                body.reason.unwrap_or_default()
            ));
        }
        if body.status.as_deref() == Some("fail") {
            return Err(anyhow!(
                "Geolocation service rejected {}: {}",
                ip,
                body.message.unwrap_or_default()
            ));
        }

        // ip-api.com puts the country name under `country`; ipapi.co puts the code there
        let (country_name, country_code) = match body.country_name {
            Some(name) => (Some(name), body.country_code.or(body.country)),
            None => (body.country, body.country_code),
        };

        Ok(GeoLocation {
            country_code,
            country_name,
            region: body.region_name.or(body.region),
            city: body.city,
        })
    }
}
