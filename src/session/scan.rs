use std::time::{Duration, Instant};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(2);

/// Filters the raw token stream of the scanner view.
///
/// Only the first well-formed token of an open scan is accepted; accepting
/// it closes the scan. The same token seen again within the dedup window is
/// ignored even if a new scan was opened.
#[derive(Debug)]
pub struct ScanGate {
    open: bool,
    last_accepted: Option<(String, Instant)>,
    dedup_window: Duration,
}

impl ScanGate {
    pub fn new(dedup_window: Duration) -> Self {
        Self {
            open: false,
            last_accepted: None,
            dedup_window,
        }
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn offer(&mut self, raw: &str) -> Option<String> {
        self.offer_at(raw, Instant::now())
    }

    pub fn offer_at(&mut self, raw: &str, now: Instant) -> Option<String> {
        if !self.open {
            return None;
        }

        let token = raw.trim();
        if !is_well_formed(token) {
            return None;
        }

        if let Some((last, at)) = &self.last_accepted {
            if last == token && now.saturating_duration_since(*at) < self.dedup_window {
                return None;
            }
        }

        self.open = false;
        self.last_accepted = Some((token.to_string(), now));
        Some(token.to_string())
    }
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

fn is_well_formed(token: &str) -> bool {
    !token.is_empty() && token.len() <= 256 && !token.chars().any(char::is_control)
}
