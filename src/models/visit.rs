use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::device::DeviceInfo;

/// Label used for visits whose market could not be resolved.
pub const UNKNOWN_MARKET: &str = "unknown market";

/// Identifier of a visit event (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitId(pub String);

impl VisitId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VisitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VisitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Row of the `visit_records` table. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VisitEvent {
    pub id: String,
    pub user_email: Option<String>,
    pub path: String,
    pub market: Option<String>,
    pub device_info: Option<String>,
    pub visit_start_time: i64,
    pub visit_end_time: Option<i64>,
    pub created_at: i64,
}

/// Who a visit belongs to, for counting purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VisitorIdentity<'a> {
    Email(&'a str),
    Fingerprint(&'a str),
    Unidentified,
}

impl VisitEvent {
    pub fn email(&self) -> Option<&str> {
        self.user_email.as_deref().filter(|e| !e.is_empty())
    }

    /// Stored device info text, used verbatim as the anonymous fingerprint.
    pub fn fingerprint(&self) -> Option<&str> {
        self.device_info.as_deref().filter(|d| !d.is_empty())
    }

    pub fn identity(&self) -> VisitorIdentity<'_> {
        if let Some(email) = self.email() {
            VisitorIdentity::Email(email)
        } else if let Some(fp) = self.fingerprint() {
            VisitorIdentity::Fingerprint(fp)
        } else {
            VisitorIdentity::Unidentified
        }
    }

    /// Identity used for market dedup: email, then fingerprint, then the event id.
    pub fn dedup_identity(&self) -> &str {
        self.email()
            .or_else(|| self.fingerprint())
            .unwrap_or(self.id.as_str())
    }

    /// Calendar day of the visit start in the reporting timezone.
    pub fn local_day(&self, offset: &FixedOffset) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(self.visit_start_time)
            .map(|ts| ts.with_timezone(offset).date_naive())
    }

    /// Session length in seconds, `None` when unfinished or inconsistent.
    pub fn duration_secs(&self) -> Option<f64> {
        let end = self.visit_end_time?;
        let millis = end.checked_sub(self.visit_start_time)?;
        if millis < 0 {
            return None;
        }
        Some(millis as f64 / 1000.0)
    }

    pub fn market_label(&self) -> &str {
        self.market
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MARKET)
    }

    pub fn device(&self) -> DeviceInfo {
        DeviceInfo::from_stored(self.device_info.as_deref())
    }
}

/// Event about to be inserted.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub id: VisitId,
    pub user_email: Option<String>,
    pub path: String,
    pub market: Option<String>,
    pub device_info: Option<String>,
    pub visit_start_time: i64,
}

impl NewVisit {
    pub fn new(path: impl Into<String>, visit_start_time: i64) -> Self {
        Self {
            id: VisitId::new(),
            user_email: None,
            path: path.into(),
            market: None,
            device_info: None,
            visit_start_time,
        }
    }

    pub fn with_email(mut self, email: Option<impl Into<String>>) -> Self {
        self.user_email = email.map(Into::into).filter(|e: &String| !e.trim().is_empty());
        self
    }

    pub fn with_market(mut self, market: Option<impl Into<String>>) -> Self {
        self.market = market.map(Into::into).filter(|m: &String| !m.is_empty());
        self
    }

    /// Store the deterministic serialization of `device`.
    pub fn with_device(mut self, device: &DeviceInfo) -> Self {
        self.device_info = device.fingerprint();
        self
    }

    /// Store raw device text as-is (importers, tests with legacy rows).
    pub fn with_raw_device_info(mut self, raw: Option<impl Into<String>>) -> Self {
        self.device_info = raw.map(Into::into).filter(|d: &String| !d.is_empty());
        self
    }
}

/// Visit as shown in the log table, device info already normalized.
#[derive(Debug, Clone, Serialize)]
pub struct VisitRecord {
    pub id: String,
    pub user_email: Option<String>,
    pub path: String,
    pub market: Option<String>,
    pub device_info: DeviceInfo,
    pub visit_start_time: i64,
    pub visit_end_time: Option<i64>,
    pub created_at: i64,
}

impl From<VisitEvent> for VisitRecord {
    fn from(event: VisitEvent) -> Self {
        let device_info = event.device();
        Self {
            id: event.id,
            user_email: event.user_email,
            path: event.path,
            market: event.market,
            device_info,
            visit_start_time: event.visit_start_time,
            visit_end_time: event.visit_end_time,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordVisitRequest {
    pub path: String,
    #[serde(default)]
    pub user_email: Option<String>,
    /// Device snapshot as an object or as serialized text.
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordVisitResponse {
    pub id: VisitId,
}
