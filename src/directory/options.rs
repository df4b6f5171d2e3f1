//! Option lists for manual meter selection (building, then floor, then meter).

use std::collections::BTreeSet;

use serde::Serialize;

use crate::db::{Floor, Meter};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FloorOption {
    pub floor: Floor,
    pub label: String,
}

/// Distinct non-empty building labels, sorted.
pub fn buildings(meters: &[Meter]) -> Vec<String> {
    meters
        .iter()
        .map(|meter| meter.building.as_str())
        .filter(|building| !building.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Floors present in `building`. "No floor" leads the list when any meter
/// there has none.
pub fn floor_options(meters: &[Meter], building: &str) -> Vec<FloorOption> {
    let floors: BTreeSet<&Floor> = meters
        .iter()
        .filter(|meter| meter.building == building)
        .map(|meter| &meter.floor)
        .collect();

    floors
        .into_iter()
        .map(|floor| FloorOption {
            floor: floor.clone(),
            label: floor.display().to_string(),
        })
        .collect()
}

pub fn meters_at(meters: &[Meter], building: &str, floor: &Floor) -> Vec<Meter> {
    meters
        .iter()
        .filter(|meter| meter.building == building && &meter.floor == floor)
        .cloned()
        .collect()
}
