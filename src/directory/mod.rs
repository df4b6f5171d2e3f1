//! Meter Directory: resolves scan tokens and manual selections to meters.

pub mod options;

use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use log::debug;

use crate::{
    db::{CommodityType, Database, Meter},
    error::{ReadingError, Result},
};

pub use options::{buildings, floor_options, meters_at, FloorOption};

/// Read access to meter records.
#[async_trait]
pub trait MeterSource: Send + Sync {
    async fn meter_by_token(&self, token: &str) -> AnyResult<Option<Meter>>;
    async fn meter_by_id(&self, meter_id: &str) -> AnyResult<Option<Meter>>;
    async fn meters_by_commodity(&self, commodity: CommodityType) -> AnyResult<Vec<Meter>>;
}

#[async_trait]
impl MeterSource for Database {
    async fn meter_by_token(&self, token: &str) -> AnyResult<Option<Meter>> {
        self.get_meter_by_token(token).await
    }

    async fn meter_by_id(&self, meter_id: &str) -> AnyResult<Option<Meter>> {
        self.get_meter(meter_id).await
    }

    async fn meters_by_commodity(&self, commodity: CommodityType) -> AnyResult<Vec<Meter>> {
        self.list_meters_by_commodity(commodity).await
    }
}

#[derive(Clone)]
pub struct MeterDirectory {
    source: Arc<dyn MeterSource>,
}

impl MeterDirectory {
    pub fn new(source: Arc<dyn MeterSource>) -> Self {
        Self { source }
    }

    pub async fn resolve_by_token(&self, token: &str) -> Result<Meter> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ReadingError::NotFound("empty scan token".into()));
        }
        debug!("Resolving scan token {token}");
        self.source
            .meter_by_token(token)
            .await
            .map_err(ReadingError::storage)?
            .ok_or_else(|| ReadingError::NotFound(format!("no meter registered for token {token}")))
    }

    pub async fn resolve_by_id(&self, meter_id: &str) -> Result<Meter> {
        self.source
            .meter_by_id(meter_id)
            .await
            .map_err(ReadingError::storage)?
            .ok_or_else(|| ReadingError::NotFound(format!("no meter with id {meter_id}")))
    }

    /// Active meters of one commodity ordered by display name.
    pub async fn list_by_type(&self, commodity: CommodityType) -> Result<Vec<Meter>> {
        let mut meters = self
            .source
            .meters_by_commodity(commodity)
            .await
            .map_err(ReadingError::storage)?;
        meters.retain(|meter| meter.active && meter.commodity == commodity);
        meters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(meters)
    }
}
