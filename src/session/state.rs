use serde::Serialize;

use crate::{
    baseline::Baseline,
    classifier::{evaluate, ClassifierInput, Evaluation, Justification},
    db::{CommodityType, Meter},
    history::HistorySnapshot,
    submission::Evidence,
};

/// History of the selected meter as last resolved.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "status", content = "detail")]
pub enum HistoryStatus {
    Idle,
    Loading,
    Loaded(HistorySnapshot),
    Failed(String),
}

impl HistoryStatus {
    pub fn snapshot(&self) -> Option<&HistorySnapshot> {
        match self {
            HistoryStatus::Loaded(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// The in-memory reading being prepared. Never partially persisted.
#[derive(Debug, Clone, Default)]
pub struct PendingSubmission {
    pub meter: Option<Meter>,
    pub value_text: String,
    pub value: Option<f64>,
    pub evidence: Option<Evidence>,
    pub justification: Option<Justification>,
}

impl PendingSubmission {
    pub fn for_meter(meter: Meter) -> Self {
        Self {
            meter: Some(meter),
            ..Self::default()
        }
    }
}

pub(crate) struct SessionInner {
    pub commodity: CommodityType,
    pub pending: PendingSubmission,
    pub history: HistoryStatus,
    /// Bumped on every selection change and every history reload; history
    /// results from an older generation are dropped.
    pub generation: u64,
    /// Bumped only when the Pending Submission is replaced by another one.
    pub selection: u64,
    pub submitting: bool,
}

impl SessionInner {
    pub fn new(commodity: CommodityType) -> Self {
        Self {
            commodity,
            pending: PendingSubmission::default(),
            history: HistoryStatus::Idle,
            generation: 0,
            selection: 0,
            submitting: false,
        }
    }

    pub fn previous(&self) -> Option<f64> {
        self.history.snapshot().and_then(|snapshot| snapshot.previous)
    }

    pub fn baseline(&self) -> Baseline {
        self.history
            .snapshot()
            .map(|snapshot| snapshot.baseline)
            .unwrap_or(Baseline::Unavailable)
    }

    /// Start over with `pending`, dropping any history of the old selection.
    pub fn replace_pending(&mut self, pending: PendingSubmission, history: HistoryStatus) -> u64 {
        self.pending = pending;
        self.history = history;
        self.generation += 1;
        self.selection += 1;
        self.generation
    }

    /// Not ready until the selected meter's history has loaded.
    pub fn evaluate(&self, alert_threshold_ratio: f64) -> Evaluation {
        let input = ClassifierInput {
            previous: self.previous(),
            candidate: self.pending.value,
            baseline: self.baseline(),
            justification: self.pending.justification,
            evidence_present: self.pending.evidence.is_some(),
        };
        let mut evaluation = evaluate(&input, alert_threshold_ratio);
        evaluation.ready &= matches!(self.history, HistoryStatus::Loaded(_));
        evaluation
    }

    pub fn view(&self, alert_threshold_ratio: f64) -> SessionView {
        SessionView {
            commodity: self.commodity,
            meter: self.pending.meter.clone(),
            value_text: self.pending.value_text.clone(),
            evidence_name: self
                .pending
                .evidence
                .as_ref()
                .map(|evidence| evidence.original_name().to_string()),
            justification: self.pending.justification,
            previous: self.previous(),
            baseline: self.baseline(),
            history: self.history.clone(),
            evaluation: self.evaluate(alert_threshold_ratio),
            submitting: self.submitting,
        }
    }
}

/// Read-only snapshot for the front end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub commodity: CommodityType,
    pub meter: Option<Meter>,
    pub value_text: String,
    pub evidence_name: Option<String>,
    pub justification: Option<Justification>,
    pub previous: Option<f64>,
    pub baseline: Baseline,
    pub history: HistoryStatus,
    pub evaluation: Evaluation,
    pub submitting: bool,
}
