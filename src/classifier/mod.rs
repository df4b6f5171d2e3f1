//! Reading Classifier.
//!
//! Classification is a pure function of the current inputs and is recomputed
//! on every edit. Only a Regression without a justification blocks
//! submission; HighConsumption changes the annotation and nothing else.

pub mod value;

use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;

pub use value::parse_reading;

pub const DEFAULT_ALERT_THRESHOLD_RATIO: f64 = 0.60;

/// Operator-supplied reason for a reading lower than the previous one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Justification {
    MeterRollover,
    ManualCorrection,
}

impl Justification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Justification::MeterRollover => "meter_rollover",
            Justification::ManualCorrection => "manual_correction",
        }
    }

    pub fn annotation(&self) -> &'static str {
        match self {
            Justification::MeterRollover => "meter rollover",
            Justification::ManualCorrection => "manual correction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "meter_rollover" | "rollover" => Some(Justification::MeterRollover),
            "manual_correction" | "correction" => Some(Justification::ManualCorrection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Incomplete,
    Regression,
    HighConsumption,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierInput {
    /// Latest persisted reading; absent means the meter starts at zero.
    pub previous: Option<f64>,
    pub candidate: Option<f64>,
    pub baseline: Baseline,
    pub justification: Option<Justification>,
    pub evidence_present: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub classification: Classification,
    pub consumption: Option<f64>,
    /// Increase over the baseline, only for HighConsumption with a non-zero baseline.
    pub increase_percent: Option<i64>,
    pub annotation: String,
    /// Regression with no justification chosen.
    pub blocked: bool,
    pub ready: bool,
}

/// Threshold ratio 0.60 means "more than 160% of the baseline".
pub fn classify(
    previous: Option<f64>,
    candidate: Option<f64>,
    baseline: Baseline,
    alert_threshold_ratio: f64,
) -> Classification {
    let Some(candidate) = candidate else {
        return Classification::Incomplete;
    };
    let previous = previous.unwrap_or(0.0);

    if candidate < previous {
        return Classification::Regression;
    }

    let consumption = candidate - previous;
    match baseline {
        Baseline::Available(base) if base == 0.0 => {
            if consumption > 0.0 {
                Classification::HighConsumption
            } else {
                Classification::Normal
            }
        }
        Baseline::Available(base) if base > 0.0 => {
            if consumption > base * (1.0 + alert_threshold_ratio) {
                Classification::HighConsumption
            } else {
                Classification::Normal
            }
        }
        _ => Classification::Normal,
    }
}

pub fn evaluate(input: &ClassifierInput, alert_threshold_ratio: f64) -> Evaluation {
    let classification = classify(
        input.previous,
        input.candidate,
        input.baseline,
        alert_threshold_ratio,
    );
    let consumption = input
        .candidate
        .map(|candidate| candidate - input.previous.unwrap_or(0.0));

    let increase_percent = match (classification, consumption, input.baseline) {
        (Classification::HighConsumption, Some(used), Baseline::Available(base)) if base > 0.0 => {
            Some(((used / base - 1.0) * 100.0).round() as i64)
        }
        _ => None,
    };

    let annotation = match classification {
        Classification::Regression => input
            .justification
            .map(|reason| reason.annotation().to_string())
            .unwrap_or_default(),
        Classification::HighConsumption => match increase_percent {
            Some(percent) => format!("ALERT: high consumption (+{percent}%)"),
            None => "ALERT: high consumption".to_string(),
        },
        Classification::Normal | Classification::Incomplete => String::new(),
    };

    let blocked = classification == Classification::Regression && input.justification.is_none();
    let ready = classification != Classification::Incomplete && input.evidence_present && !blocked;

    Evaluation {
        classification,
        consumption,
        increase_percent,
        annotation,
        blocked,
        ready,
    }
}

/// A chosen justification survives edits only while the reading stays below
/// the previous one.
pub fn retain_justification(
    previous: Option<f64>,
    candidate: Option<f64>,
    current: Option<Justification>,
) -> Option<Justification> {
    match candidate {
        Some(value) if value >= previous.unwrap_or(0.0) => None,
        _ => current,
    }
}
