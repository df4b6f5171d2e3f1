//! History Retriever: recent readings of one meter, newest first.
//!
//! Samples inside the trailing window are preferred. When the window is
//! empty the most recent `fallback_count` samples are used regardless of age,
//! so rarely read meters still get a baseline.

use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

use crate::{
    baseline::{estimate, Baseline},
    db::{CommodityType, Database, ReadingSample},
    error::{ReadingError, Result},
};

pub const DEFAULT_WINDOW_DAYS: u32 = 10;
pub const DEFAULT_FALLBACK_COUNT: usize = 10;

/// Read access to persisted reading samples.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn samples_between(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnyResult<Vec<ReadingSample>>;

    async fn latest_samples(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        limit: usize,
    ) -> AnyResult<Vec<ReadingSample>>;
}

#[async_trait]
impl SampleSource for Database {
    async fn samples_between(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnyResult<Vec<ReadingSample>> {
        self.readings_between(commodity, meter_name, since, until).await
    }

    async fn latest_samples(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        limit: usize,
    ) -> AnyResult<Vec<ReadingSample>> {
        self.latest_readings(commodity, meter_name, limit).await
    }
}

/// What the classifier needs from a meter's history.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub samples: Vec<ReadingSample>,
    /// Latest persisted value, `None` when the meter has no history.
    pub previous: Option<f64>,
    pub baseline: Baseline,
}

impl HistorySnapshot {
    pub fn from_samples(samples: Vec<ReadingSample>) -> Self {
        let previous = samples.first().map(|sample| sample.value);
        let baseline = estimate(&samples);
        Self {
            samples,
            previous,
            baseline,
        }
    }
}

#[derive(Clone)]
pub struct HistoryRetriever {
    source: Arc<dyn SampleSource>,
    window_days: u32,
    fallback_count: usize,
}

impl HistoryRetriever {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self::with_limits(source, DEFAULT_WINDOW_DAYS, DEFAULT_FALLBACK_COUNT)
    }

    pub fn with_limits(source: Arc<dyn SampleSource>, window_days: u32, fallback_count: usize) -> Self {
        Self {
            source,
            window_days,
            fallback_count,
        }
    }

    pub async fn fetch_history(
        &self,
        meter_name: &str,
        commodity: CommodityType,
    ) -> Result<Vec<ReadingSample>> {
        self.fetch_history_at(meter_name, commodity, Utc::now()).await
    }

    pub async fn fetch_history_at(
        &self,
        meter_name: &str,
        commodity: CommodityType,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReadingSample>> {
        let since = now - Duration::days(i64::from(self.window_days));
        let mut samples = self
            .source
            .samples_between(commodity, meter_name, since, now)
            .await
            .map_err(ReadingError::storage)?;

        if samples.is_empty() {
            debug!(
                "No {} readings for {meter_name} in the last {} days; using latest {}",
                commodity.as_str(),
                self.window_days,
                self.fallback_count
            );
            samples = self
                .source
                .latest_samples(commodity, meter_name, self.fallback_count)
                .await
                .map_err(ReadingError::storage)?;
            samples.truncate(self.fallback_count);
        }

        // Stable sort keeps the source's order for equal timestamps.
        samples.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(samples)
    }

    pub async fn snapshot(&self, meter_name: &str, commodity: CommodityType) -> Result<HistorySnapshot> {
        let samples = self.fetch_history(meter_name, commodity).await?;
        Ok(HistorySnapshot::from_samples(samples))
    }
}
