//! Reading data models.
//!
//! Persisted readings are immutable. `consumption` is fixed when the row is
//! appended and never recomputed afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meter::{CommodityType, Floor};

/// Historical sample used for comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSample {
    pub value: f64,
    /// `value` minus the immediately preceding reading; `None` for the first one.
    pub consumption: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// A reading ready to be appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    pub commodity: CommodityType,
    pub meter_name: String,
    pub building: String,
    pub floor: Floor,
    pub value: f64,
    pub captured_at: DateTime<Utc>,
    pub evidence_url: String,
    pub annotation: String,
    pub operator: String,
}

/// A persisted reading row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRecord {
    pub id: i64,
    pub commodity: CommodityType,
    pub meter_name: String,
    pub building: String,
    pub floor: Floor,
    pub value: f64,
    pub consumption: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub evidence_url: String,
    pub annotation: String,
    pub operator: String,
}

impl From<&ReadingRecord> for ReadingSample {
    fn from(record: &ReadingRecord) -> Self {
        Self {
            value: record.value,
            consumption: record.consumption,
            captured_at: record.captured_at,
        }
    }
}

/// Optional filters for listing persisted readings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingFilter {
    pub building: Option<String>,
    pub floor: Option<Floor>,
    /// Case-insensitive substring of the meter name.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPage {
    pub records: Vec<ReadingRecord>,
    pub total: u64,
}
