//! Data models for analytics

use serde::{Deserialize, Serialize};

/// Geographic location information derived from an IP address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "CN")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,

    /// Region/state/province
    pub region: Option<String>,

    /// City name
    pub city: Option<String>,
}

impl GeoLocation {
    /// Market label in the `"<city>, <country>"` form.
    ///
    /// Falls back to the country alone when the city is unknown; `None`
    /// when the lookup produced no country at all.
    pub fn market_label(&self) -> Option<String> {
        let country = non_blank(self.country_name.as_deref())
            .or_else(|| non_blank(self.country_code.as_deref()))?;

        match non_blank(self.city.as_deref()) {
            Some(city) => Some(format!("{}, {}", city, country)),
            None => Some(country.to_string()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
