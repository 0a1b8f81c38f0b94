use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label used when a visit carries no usable platform.
pub const UNKNOWN_PLATFORM: &str = "unknown platform";

/// Device snapshot captured when a visit is recorded.
///
/// Field order is fixed, so `serde_json::to_string` of the same snapshot
/// always yields the same text. That text doubles as the anonymous visitor
/// fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
}

impl DeviceInfo {
    /// Parse stored device info text, falling back to an empty snapshot.
    ///
    /// Accepts a JSON object or a JSON string holding an object (double
    /// encoded rows). Anything else yields `DeviceInfo::default()`.
    pub fn parse_lenient(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::default(),
        }
    }

    /// Normalize an already-decoded JSON value (object or serialized string).
    ///
    /// Fields are read one by one; a field of the wrong type is dropped
    /// without discarding the rest of the snapshot.
    pub fn from_value(value: Value) -> Self {
        let map = match value {
            Value::Object(map) => map,
            Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
                Ok(Value::Object(map)) => map,
                _ => return Self::default(),
            },
            _ => return Self::default(),
        };

        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let dimension = |key: &str| {
            map.get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };

        Self {
            user_agent: text("userAgent"),
            platform: text("platform"),
            language: text("language"),
            screen_width: dimension("screenWidth"),
            screen_height: dimension("screenHeight"),
        }
    }

    /// Normalize optional stored text.
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.map(Self::parse_lenient).unwrap_or_default()
    }

    /// Platform label used for grouping.
    ///
    /// Only spaces are trimmed, matching SQL `TRIM` in the store rollups.
    pub fn platform_label(&self) -> &str {
        self.platform
            .as_deref()
            .map(|p| p.trim_matches(' '))
            .filter(|p| !p.is_empty())
            .unwrap_or(UNKNOWN_PLATFORM)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Deterministic serialization, `None` for an empty snapshot.
    pub fn fingerprint(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }

    /// Fill gaps from request headers.
    pub fn complete_from_headers(
        mut self,
        user_agent: Option<&str>,
        accept_language: Option<&str>,
    ) -> Self {
        if self.user_agent.is_none() {
            self.user_agent = user_agent.map(str::to_string);
        }
        if self.language.is_none() {
            self.language = accept_language
                .and_then(|v| v.split(',').next())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                .filter(|v| !v.is_empty());
        }
        if self.platform.is_none() {
            self.platform = self
                .user_agent
                .as_deref()
                .and_then(platform_from_user_agent)
                .map(str::to_string);
        }
        self
    }
}

/// Coarse platform guess from a user agent string.
pub fn platform_from_user_agent(ua: &str) -> Option<&'static str> {
    let ua = ua.to_lowercase();

    // iPadOS and iOS must win over the "mac os x" token they also carry
    if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        Some("iOS")
    } else if ua.contains("android") {
        Some("Android")
    } else if ua.contains("windows") {
        Some("Windows")
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        Some("macOS")
    } else if ua.contains("cros ") {
        Some("ChromeOS")
    } else if ua.contains("linux") {
        Some("Linux")
    } else {
        None
    }
}
