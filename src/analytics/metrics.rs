//! In-process reducers over raw visit events
//!
//! These mirror the database rollups in `storage` exactly, so either side
//! can be checked against the other.

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{VisitEvent, VisitorIdentity};
use crate::storage::DimensionCount;

/// One bar of a distribution chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub name: String,
    pub value: u64,
}

impl From<DimensionCount> for DistributionEntry {
    fn from(row: DimensionCount) -> Self {
        Self {
            name: row.dimension,
            value: row.visit_count.max(0) as u64,
        }
    }
}

/// Distinct emails plus distinct fingerprints among events without an email.
///
/// A signed-in visitor who also browsed anonymously is counted twice; this
/// matches the database rollup.
pub fn unique_visitors(events: &[VisitEvent]) -> u64 {
    let mut emails = HashSet::new();
    let mut fingerprints = HashSet::new();

    for event in events {
        match event.identity() {
            VisitorIdentity::Email(email) => {
                emails.insert(email);
            }
            VisitorIdentity::Fingerprint(fp) => {
                fingerprints.insert(fp);
            }
            VisitorIdentity::Unidentified => {}
        }
    }

    (emails.len() + fingerprints.len()) as u64
}

/// Mean session length in seconds over finished visits, `None` if there are none
pub fn average_duration_secs(events: &[VisitEvent]) -> Option<f64> {
    let (sum, count) = events
        .iter()
        .filter_map(VisitEvent::duration_secs)
        .fold((0.0_f64, 0_u64), |(sum, count), d| (sum + d, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn distinct_paths(events: &[VisitEvent]) -> u64 {
    events
        .iter()
        .map(|e| e.path.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Visits per platform, most common first; ties keep first-seen order
pub fn device_distribution(events: &[VisitEvent]) -> Vec<DistributionEntry> {
    let mut counts = OrderedCounts::default();
    for event in events {
        counts.add(event.device().platform_label(), 1);
    }
    counts.into_sorted()
}

/// Visitor-days per market, most common first.
///
/// A visitor (email, else fingerprint, else the event itself) counts once
/// per market per calendar day in `offset`.
pub fn market_distribution(events: &[VisitEvent], offset: &FixedOffset) -> Vec<DistributionEntry> {
    let mut seen: HashMap<&str, HashSet<(&str, Option<NaiveDate>)>> = HashMap::new();
    let mut counts = OrderedCounts::default();

    for event in events {
        let market = event.market_label();
        let key = (event.dedup_identity(), event.local_day(offset));
        if seen.entry(market).or_default().insert(key) {
            counts.add(market, 1);
        }
    }

    counts.into_sorted()
}

/// Counter that remembers first-seen order for stable tie-breaking
#[derive(Default)]
struct OrderedCounts {
    index: HashMap<String, usize>,
    entries: Vec<DistributionEntry>,
}

impl OrderedCounts {
    fn add(&mut self, name: &str, amount: u64) {
        match self.index.get(name) {
            Some(&i) => self.entries[i].value += amount,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(DistributionEntry {
                    name: name.to_string(),
                    value: amount,
                });
            }
        }
    }

    fn into_sorted(mut self) -> Vec<DistributionEntry> {
        // `sort_by` is stable
        self.entries.sort_by(|a, b| b.value.cmp(&a.value));
        self.entries
    }
}

/// Human-readable average duration, e.g. `"3m 05s"`
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return "n/a".to_string();
    };

    let total = seconds.max(0.0).floor() as u64;
    let (minutes, secs) = (total / 60, total % 60);
    if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
