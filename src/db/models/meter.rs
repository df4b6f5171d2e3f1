//! Meter data models.
//!
//! Meters are administered outside the reading workflow; the core only reads
//! them.

use serde::{Deserialize, Serialize};

/// The two parallel data tracks the system records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommodityType {
    #[default]
    Water,
    Energy,
}

impl CommodityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommodityType::Water => "water",
            CommodityType::Energy => "energy",
        }
    }

    /// Append-only table holding this commodity's readings.
    pub fn readings_table(&self) -> &'static str {
        match self {
            CommodityType::Water => "water_readings",
            CommodityType::Energy => "energy_readings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "water" => Some(CommodityType::Water),
            "energy" => Some(CommodityType::Energy),
            _ => None,
        }
    }
}

/// Floor label of a meter. `None` is the "no floor" category and is kept
/// distinct from any real label, including an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase", tag = "kind", content = "label")]
pub enum Floor {
    None,
    Level(String),
}

impl Floor {
    /// Storage treats NULL and blank as "no floor".
    pub fn from_column(value: Option<String>) -> Self {
        match value {
            Some(label) if !label.trim().is_empty() => Floor::Level(label),
            _ => Floor::None,
        }
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            Floor::None => None,
            Floor::Level(label) => Some(label.as_str()),
        }
    }

    pub fn display(&self) -> &str {
        match self {
            Floor::None => "General / no floor",
            Floor::Level(label) => label.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    pub id: String,
    pub token: Option<String>,
    pub name: String,
    pub commodity: CommodityType,
    pub building: String,
    pub floor: Floor,
    pub active: bool,
}
