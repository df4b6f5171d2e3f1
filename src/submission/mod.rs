//! Submission Assembler: uploads the evidence, then appends one immutable
//! reading record.
//!
//! Either both steps succeed or nothing attributable to the submission is
//! left behind: when the record write fails the uploaded object is removed.

pub mod evidence;

use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::{Database, Meter, NewReading, ReadingRecord},
    error::{ReadingError, Result},
    storage::ObjectStore,
};

pub use evidence::{object_name, Evidence};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub type RecordId = i64;

/// Append-only destination of reading records.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn append(&self, reading: &NewReading) -> AnyResult<ReadingRecord>;
}

#[async_trait]
impl ReadingSink for Database {
    async fn append(&self, reading: &NewReading) -> AnyResult<ReadingRecord> {
        self.append_reading(reading).await
    }
}

/// Everything needed to persist one reading.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub meter: Meter,
    pub value: f64,
    pub evidence: Evidence,
    pub annotation: String,
    pub operator: String,
}

#[derive(Clone)]
pub struct SubmissionAssembler {
    objects: Arc<dyn ObjectStore>,
    sink: Arc<dyn ReadingSink>,
}

impl SubmissionAssembler {
    pub fn new(objects: Arc<dyn ObjectStore>, sink: Arc<dyn ReadingSink>) -> Self {
        Self { objects, sink }
    }

    pub async fn submit(&self, request: SubmissionRequest) -> Result<ReadingRecord> {
        self.submit_at(request, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        request: SubmissionRequest,
        captured_at: DateTime<Utc>,
    ) -> Result<ReadingRecord> {
        let SubmissionRequest {
            meter,
            value,
            evidence,
            annotation,
            operator,
        } = request;

        let name = object_name(&evidence, captured_at);
        let evidence_url = self
            .objects
            .put(evidence.into_bytes(), &name)
            .await
            .map_err(|err| {
                log_error!("Evidence upload for {} failed: {err:#}", meter.name);
                ReadingError::UploadFailure(format!("{err:#}"))
            })?;

        let reading = NewReading {
            commodity: meter.commodity,
            meter_name: meter.name.clone(),
            building: meter.building.clone(),
            floor: meter.floor.clone(),
            value,
            captured_at,
            evidence_url,
            annotation,
            operator,
        };

        match self.sink.append(&reading).await {
            Ok(record) => {
                log_info!(
                    "Saved {} reading {} for {} (id {})",
                    record.commodity.as_str(),
                    record.value,
                    record.meter_name,
                    record.id
                );
                Ok(record)
            }
            Err(err) => {
                log_error!("Saving reading for {} failed: {err:#}", meter.name);
                if let Err(cleanup_err) = self.objects.remove(&name).await {
                    log_warn!("Could not remove orphaned evidence {name}: {cleanup_err:#}");
                }
                Err(ReadingError::PersistFailure(format!("{err:#}")))
            }
        }
    }
}
