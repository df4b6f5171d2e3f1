use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    classifier::DEFAULT_ALERT_THRESHOLD_RATIO,
    history::{DEFAULT_FALLBACK_COUNT, DEFAULT_WINDOW_DAYS},
    session::SessionConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub alert_threshold_ratio: f64,
    pub history_window_days: u32,
    pub history_fallback_count: usize,
    pub scan_dedup_window_ms: u64,
    pub session_timeout_ms: u64,
    /// Defaults to `<data dir>/evidence`.
    pub evidence_dir: Option<PathBuf>,
    /// Defaults to `file://<evidence dir>`.
    pub evidence_base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alert_threshold_ratio: DEFAULT_ALERT_THRESHOLD_RATIO,
            history_window_days: DEFAULT_WINDOW_DAYS,
            history_fallback_count: DEFAULT_FALLBACK_COUNT,
            scan_dedup_window_ms: 2_000,
            session_timeout_ms: 5_000,
            evidence_dir: None,
            evidence_base_url: None,
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            alert_threshold_ratio: self.alert_threshold_ratio,
            scan_dedup_window: Duration::from_millis(self.scan_dedup_window_ms),
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn evidence_dir(&self, data_dir: &Path) -> PathBuf {
        self.evidence_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("evidence"))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unparsable settings {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> Settings {
        self.read().clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        validate(&settings)?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn set_alert_threshold_ratio(&self, ratio: f64) -> Result<()> {
        let mut settings = self.get();
        settings.alert_threshold_ratio = ratio;
        self.update(settings)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn validate(settings: &Settings) -> Result<()> {
    if !settings.alert_threshold_ratio.is_finite() || settings.alert_threshold_ratio < 0.0 {
        anyhow::bail!(
            "alert_threshold_ratio must be a non-negative number, got {}",
            settings.alert_threshold_ratio
        );
    }
    if settings.history_fallback_count == 0 {
        anyhow::bail!("history_fallback_count must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), Settings::default());
        assert_eq!(store.get().session_config().scan_dedup_window, Duration::from_secs(2));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "alert_threshold_ratio": 0.25 }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.alert_threshold_ratio, 0.25);
        assert_eq!(settings.history_window_days, 10);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().get(), Settings::default());
    }

    #[test]
    fn update_persists_and_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store.set_alert_threshold_ratio(0.9).unwrap();
        assert!(store.set_alert_threshold_ratio(-1.0).is_err());
        assert_eq!(store.get().alert_threshold_ratio, 0.9);

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.get().alert_threshold_ratio, 0.9);
    }

    #[test]
    fn evidence_dir_defaults_under_data_dir() {
        let settings = Settings::default();
        assert_eq!(
            settings.evidence_dir(Path::new("/var/meterdesk")),
            PathBuf::from("/var/meterdesk/evidence")
        );
    }
}
