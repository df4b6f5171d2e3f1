//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use meterdesk_lib::{
    auth::StaticIdentity,
    db::{
        AccessFlags, CommodityType, CurrentUser, Floor, Meter, NewReading, ReadingRecord,
        ReadingSample, Role, SignInMethod,
    },
    directory::{MeterDirectory, MeterSource},
    history::{HistoryRetriever, SampleSource},
    session::{ReadingSession, SessionConfig},
    storage::ObjectStore,
    submission::{Evidence, ReadingSink, SubmissionAssembler},
};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub fn evidence() -> Evidence {
    Evidence::new(PNG.to_vec(), "meter.png").unwrap()
}

pub fn meter(id: &str, name: &str, commodity: CommodityType) -> Meter {
    Meter {
        id: id.into(),
        token: Some(format!("tok-{id}")),
        name: name.into(),
        commodity,
        building: "Tower A".into(),
        floor: Floor::Level("2".into()),
        active: true,
    }
}

pub fn operator(role: Role, readings: bool) -> CurrentUser {
    CurrentUser {
        id: "op-1".into(),
        display_name: "Ana Field".into(),
        email: Some("ana@example.com".into()),
        role,
        access: AccessFlags {
            readings,
            ..AccessFlags::default()
        },
        method: SignInMethod::Password,
    }
}

/// One sample per day, newest first, the newest captured a day ago.
pub fn samples(values: &[f64]) -> Vec<ReadingSample> {
    let now = Utc::now();
    let mut out = Vec::new();
    for (index, value) in values.iter().enumerate() {
        let next = values.get(index + 1);
        out.push(ReadingSample {
            value: *value,
            consumption: next.map(|older| value - older),
            captured_at: now - Duration::days(index as i64 + 1),
        });
    }
    out
}

pub struct FixedMeters(pub Vec<Meter>);

#[async_trait]
impl MeterSource for FixedMeters {
    async fn meter_by_token(&self, token: &str) -> Result<Option<Meter>> {
        Ok(self
            .0
            .iter()
            .find(|meter| meter.active && meter.token.as_deref() == Some(token))
            .cloned())
    }

    async fn meter_by_id(&self, meter_id: &str) -> Result<Option<Meter>> {
        Ok(self.0.iter().find(|meter| meter.id == meter_id).cloned())
    }

    async fn meters_by_commodity(&self, commodity: CommodityType) -> Result<Vec<Meter>> {
        Ok(self
            .0
            .iter()
            .filter(|meter| meter.commodity == commodity)
            .cloned()
            .collect())
    }
}

/// History source whose answers for a meter are held back until released.
#[derive(Default)]
pub struct GatedSamples {
    samples: Mutex<HashMap<String, Vec<ReadingSample>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl GatedSamples {
    pub fn with_history(self, meter_name: &str, values: &[f64]) -> Self {
        self.samples
            .lock()
            .unwrap()
            .insert(meter_name.to_string(), samples(values));
        self
    }

    fn gate(&self, meter_name: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .unwrap()
            .entry(meter_name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn release(&self, meter_name: &str) {
        self.gate(meter_name).notify_one();
    }
}

#[async_trait]
impl SampleSource for GatedSamples {
    async fn samples_between(
        &self,
        _commodity: CommodityType,
        meter_name: &str,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<ReadingSample>> {
        self.gate(meter_name).notified().await;
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(meter_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_samples(
        &self,
        _commodity: CommodityType,
        _meter_name: &str,
        _limit: usize,
    ) -> Result<Vec<ReadingSample>> {
        Ok(Vec::new())
    }
}

/// Object store that can be told to fail or to hold uploads until released.
#[derive(Default)]
pub struct TestObjects {
    pub fail: AtomicBool,
    pub hold: AtomicBool,
    pub gate: Notify,
    pub puts: AtomicUsize,
    pub stored: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for TestObjects {
    async fn put(&self, _bytes: Vec<u8>, name: &str) -> Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("object storage unavailable");
        }
        self.stored.lock().unwrap().push(name.to_string());
        Ok(format!("https://objects.test/{name}"))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.stored.lock().unwrap().retain(|stored| stored != name);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub rows: Mutex<Vec<NewReading>>,
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn append(&self, reading: &NewReading) -> Result<ReadingRecord> {
        let mut rows = self.rows.lock().unwrap();
        rows.push(reading.clone());
        Ok(ReadingRecord {
            id: rows.len() as i64,
            commodity: reading.commodity,
            meter_name: reading.meter_name.clone(),
            building: reading.building.clone(),
            floor: reading.floor.clone(),
            value: reading.value,
            consumption: None,
            captured_at: reading.captured_at,
            evidence_url: reading.evidence_url.clone(),
            annotation: reading.annotation.clone(),
            operator: reading.operator.clone(),
        })
    }
}

pub struct Fixture {
    pub session: ReadingSession,
    pub history: Arc<GatedSamples>,
    pub objects: Arc<TestObjects>,
    pub sink: Arc<MemorySink>,
}

pub fn fixture(meters: Vec<Meter>, history: GatedSamples, user: Option<CurrentUser>) -> Fixture {
    let history = Arc::new(history);
    let objects = Arc::new(TestObjects::default());
    let sink = Arc::new(MemorySink::default());

    let session = ReadingSession::new(
        CommodityType::Water,
        MeterDirectory::new(Arc::new(FixedMeters(meters))),
        HistoryRetriever::new(history.clone()),
        SubmissionAssembler::new(objects.clone(), sink.clone()),
        Arc::new(StaticIdentity::new(user)),
        SessionConfig::default(),
    );

    Fixture {
        session,
        history,
        objects,
        sink,
    }
}
