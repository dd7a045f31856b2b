use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::catalog::CatalogItem;

/// Trending time bucket: one ISO week, rendered `YYYY-Www`.
///
/// Any two instants in the same ISO week map to the same bucket. The year is
/// the ISO week-numbering year, so late-December days can land in week 1 of
/// the following year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

impl BucketId {
    pub fn for_time(at: DateTime<Utc>) -> Self {
        let week = at.iso_week();
        Self(format!("{}-W{:02}", week.year(), week.week()))
    }

    pub fn current() -> Self {
        Self::for_time(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BucketId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BucketId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRow {
    pub bucket: BucketId,
    pub item_id: String,
    pub count: u64,
}

/// A ranked trending item with its play count over the horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingEntry {
    pub item: CatalogItem,
    pub plays: u64,
}
