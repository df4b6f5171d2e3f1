use serde::{Deserialize, Serialize};

use crate::db::ReadingSample;

/// Mean consumption of a meter's recent history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "status", content = "value")]
pub enum Baseline {
    Available(f64),
    Unavailable,
}

impl Baseline {
    pub fn value(&self) -> Option<f64> {
        match self {
            Baseline::Available(value) => Some(*value),
            Baseline::Unavailable => None,
        }
    }
}

/// Arithmetic mean of the non-null, non-negative consumption deltas.
/// Negative deltas come from rollovers or corrections and are ignored.
pub fn estimate(samples: &[ReadingSample]) -> Baseline {
    let valid: Vec<f64> = samples
        .iter()
        .filter_map(|sample| sample.consumption)
        .filter(|delta| delta.is_finite() && *delta >= 0.0)
        .collect();

    if valid.is_empty() {
        return Baseline::Unavailable;
    }

    Baseline::Available(valid.iter().sum::<f64>() / valid.len() as f64)
}
