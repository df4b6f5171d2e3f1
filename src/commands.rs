//! Operator-facing commands. Every error is flattened to a `String` so the
//! front end can show it verbatim and carry on.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use uuid::Uuid;

use crate::{
    auth::{SessionEstablisher, SessionState},
    classifier::{Evaluation, Justification},
    db::{
        AccessToken, CommodityType, Database, Floor, Meter, ReadingFilter, ReadingPage,
        ReadingRecord,
    },
    directory::options::{self, FloorOption},
    session::{ReadingSession, SessionView},
    settings::{Settings, SettingsStore},
    submission::Evidence,
};

pub struct AppState {
    pub db: Database,
    pub session: ReadingSession,
    pub auth: Arc<SessionEstablisher>,
    pub settings: SettingsStore,
    pub data_dir: PathBuf,
}

fn parse_commodity(commodity: &str) -> Result<CommodityType, String> {
    CommodityType::parse(commodity).ok_or_else(|| format!("Unknown commodity type: {commodity}"))
}

pub async fn get_session_view(state: &AppState) -> Result<SessionView, String> {
    Ok(state.session.view().await)
}

pub fn get_auth_state(state: &AppState) -> SessionState {
    state.auth.state()
}

pub async fn set_commodity(state: &AppState, commodity: &str) -> Result<CommodityType, String> {
    let commodity = parse_commodity(commodity)?;
    state.session.set_commodity(commodity).await;
    Ok(commodity)
}

pub fn begin_scan(state: &AppState) {
    state.session.begin_scan();
}

pub fn cancel_scan(state: &AppState) {
    state.session.cancel_scan();
}

/// `Ok(None)` means the token was ignored.
pub async fn offer_scan_token(state: &AppState, token: &str) -> Result<Option<Meter>, String> {
    state.session.offer_scan(token).await.map_err(|e| e.to_string())
}

async fn current_meters(state: &AppState) -> Result<Vec<Meter>, String> {
    let commodity = state.session.commodity().await;
    state
        .session
        .directory()
        .list_by_type(commodity)
        .await
        .map_err(|e| e.to_string())
}

pub async fn list_meters(state: &AppState) -> Result<Vec<Meter>, String> {
    current_meters(state).await
}

pub async fn list_buildings(state: &AppState) -> Result<Vec<String>, String> {
    let meters = current_meters(state).await?;
    Ok(options::buildings(&meters))
}

pub async fn list_floor_options(state: &AppState, building: &str) -> Result<Vec<FloorOption>, String> {
    let meters = current_meters(state).await?;
    Ok(options::floor_options(&meters, building))
}

pub async fn list_meters_at(
    state: &AppState,
    building: &str,
    floor: Option<&str>,
) -> Result<Vec<Meter>, String> {
    let meters = current_meters(state).await?;
    let floor = Floor::from_column(floor.map(str::to_string));
    Ok(options::meters_at(&meters, building, &floor))
}

pub async fn select_meter(state: &AppState, meter_id: &str) -> Result<Meter, String> {
    state
        .session
        .select_meter_by_id(meter_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn clear_selection(state: &AppState) -> Result<SessionView, String> {
    state.session.clear_selection().await;
    Ok(state.session.view().await)
}

pub async fn set_reading_value(state: &AppState, text: &str) -> Result<Evaluation, String> {
    state.session.set_value(text).await.map_err(|e| e.to_string())
}

pub async fn set_justification(
    state: &AppState,
    justification: Option<&str>,
) -> Result<Evaluation, String> {
    let justification = match justification {
        Some(raw) => Some(
            Justification::parse(raw).ok_or_else(|| format!("Unknown justification: {raw}"))?,
        ),
        None => None,
    };
    state
        .session
        .set_justification(justification)
        .await
        .map_err(|e| e.to_string())
}

pub async fn attach_evidence_file(state: &AppState, path: &Path) -> Result<Evaluation, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("evidence")
        .to_string();
    let evidence = Evidence::new(bytes, name).map_err(|e| e.to_string())?;
    state
        .session
        .attach_evidence(evidence)
        .await
        .map_err(|e| e.to_string())
}

pub async fn clear_evidence(state: &AppState) -> Result<Evaluation, String> {
    Ok(state.session.clear_evidence().await)
}

pub async fn reload_history(state: &AppState) -> Result<(), String> {
    state.session.reload_history().await.map_err(|e| e.to_string())
}

pub async fn submit_reading(state: &AppState) -> Result<ReadingRecord, String> {
    state.session.submit().await.map_err(|e| e.to_string())
}

pub async fn list_readings_paginated(
    state: &AppState,
    commodity: &str,
    filter: ReadingFilter,
    limit: usize,
    offset: usize,
) -> Result<ReadingPage, String> {
    let commodity = parse_commodity(commodity)?;
    state
        .db
        .list_readings_paginated(commodity, filter, limit, offset)
        .await
        .map_err(|e| e.to_string())
}

/// Register a meter with a fresh id and a fresh scan token to print as its
/// QR code.
pub async fn register_meter(
    state: &AppState,
    name: &str,
    commodity: &str,
    building: &str,
    floor: Option<&str>,
) -> Result<Meter, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Meter name is required".into());
    }
    let meter = Meter {
        id: Uuid::new_v4().to_string(),
        token: Some(Uuid::new_v4().simple().to_string()),
        name: name.to_string(),
        commodity: parse_commodity(commodity)?,
        building: building.trim().to_string(),
        floor: Floor::from_column(floor.map(str::to_string)),
        active: true,
    };
    state.db.upsert_meter(&meter).await.map_err(|e| e.to_string())?;
    Ok(meter)
}

/// Issue a field-operator access token; `description` becomes the
/// operator's display name.
pub async fn issue_access_token(state: &AppState, description: &str) -> Result<AccessToken, String> {
    let description = description.trim();
    if description.is_empty() {
        return Err("Description is required".into());
    }
    let access_token = AccessToken {
        id: Uuid::new_v4().to_string(),
        token: Uuid::new_v4().simple().to_string(),
        description: description.to_string(),
        active: true,
    };
    state
        .db
        .insert_access_token(&access_token)
        .await
        .map_err(|e| e.to_string())?;
    Ok(access_token)
}

pub fn get_settings(state: &AppState) -> Settings {
    state.settings.get()
}

/// Persisted for the next start; the running session keeps its threshold.
pub fn set_alert_threshold_ratio(state: &AppState, ratio: f64) -> Result<(), String> {
    state
        .settings
        .set_alert_threshold_ratio(ratio)
        .map_err(|e| e.to_string())
}
