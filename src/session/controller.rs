use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::IdentityProvider,
    classifier::{parse_reading, retain_justification, Classification, Evaluation, Justification},
    db::{CommodityType, Meter, ReadingRecord},
    directory::MeterDirectory,
    error::{ReadingError, Result},
    history::{HistoryRetriever, HistorySnapshot},
    submission::{Evidence, SubmissionAssembler, SubmissionRequest},
};

use super::{
    scan::ScanGate,
    state::{HistoryStatus, PendingSubmission, SessionInner, SessionView},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub alert_threshold_ratio: f64,
    pub scan_dedup_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            alert_threshold_ratio: crate::classifier::DEFAULT_ALERT_THRESHOLD_RATIO,
            scan_dedup_window: super::scan::DEFAULT_DEDUP_WINDOW,
        }
    }
}

#[derive(Default)]
struct FetchSlot {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// One operator's reading-entry session.
///
/// Owns the single Pending Submission. History for the selected meter is
/// loaded in the background; whichever meter was selected last wins no
/// matter in which order fetches complete.
#[derive(Clone)]
pub struct ReadingSession {
    inner: Arc<Mutex<SessionInner>>,
    fetch: Arc<Mutex<FetchSlot>>,
    scan_gate: Arc<std::sync::Mutex<ScanGate>>,
    directory: MeterDirectory,
    history: HistoryRetriever,
    assembler: SubmissionAssembler,
    identity: Arc<dyn IdentityProvider>,
    config: SessionConfig,
}

impl ReadingSession {
    pub fn new(
        commodity: CommodityType,
        directory: MeterDirectory,
        history: HistoryRetriever,
        assembler: SubmissionAssembler,
        identity: Arc<dyn IdentityProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner::new(commodity))),
            fetch: Arc::new(Mutex::new(FetchSlot::default())),
            scan_gate: Arc::new(std::sync::Mutex::new(ScanGate::new(config.scan_dedup_window))),
            directory,
            history,
            assembler,
            identity,
            config,
        }
    }

    pub fn directory(&self) -> &MeterDirectory {
        &self.directory
    }

    pub async fn view(&self) -> SessionView {
        self.inner.lock().await.view(self.config.alert_threshold_ratio)
    }

    pub async fn evaluation(&self) -> Evaluation {
        self.inner.lock().await.evaluate(self.config.alert_threshold_ratio)
    }

    pub async fn commodity(&self) -> CommodityType {
        self.inner.lock().await.commodity
    }

    /// Switching commodity discards the current selection.
    pub async fn set_commodity(&self, commodity: CommodityType) {
        let changed = {
            let mut guard = self.inner.lock().await;
            if guard.commodity == commodity {
                false
            } else {
                guard.commodity = commodity;
                guard.replace_pending(PendingSubmission::default(), HistoryStatus::Idle);
                true
            }
        };
        if changed {
            self.cancel_fetch().await;
        }
    }

    pub async fn clear_selection(&self) {
        self.inner
            .lock()
            .await
            .replace_pending(PendingSubmission::default(), HistoryStatus::Idle);
        self.cancel_fetch().await;
    }

    pub fn begin_scan(&self) {
        self.lock_gate().open();
    }

    pub fn cancel_scan(&self) {
        self.lock_gate().close();
    }

    /// Feed one raw token from the scanner. Returns `Ok(None)` when the token
    /// was ignored (scan not open, malformed, or a recent duplicate).
    pub async fn offer_scan(&self, raw: &str) -> Result<Option<Meter>> {
        let accepted = self.lock_gate().offer(raw);
        let Some(token) = accepted else {
            return Ok(None);
        };

        let meter = self.directory.resolve_by_token(&token).await?;
        log_info!("Identified meter {} from scan", meter.name);
        self.select_meter(meter.clone()).await;
        Ok(Some(meter))
    }

    pub async fn select_meter_by_id(&self, meter_id: &str) -> Result<Meter> {
        let meter = self.directory.resolve_by_id(meter_id).await?;
        self.select_meter(meter.clone()).await;
        Ok(meter)
    }

    /// Start a fresh Pending Submission for `meter`. The session's commodity
    /// follows the meter's own type.
    pub async fn select_meter(&self, meter: Meter) {
        let name = meter.name.clone();
        let commodity = meter.commodity;

        let generation = {
            let mut guard = self.inner.lock().await;
            if guard.commodity != commodity {
                log_info!(
                    "Switching commodity from {} to {} for {}",
                    guard.commodity.as_str(),
                    commodity.as_str(),
                    name
                );
                guard.commodity = commodity;
            }
            guard.replace_pending(PendingSubmission::for_meter(meter), HistoryStatus::Loading)
        };

        self.spawn_fetch(name, commodity, generation).await;
    }

    /// Fetch the selected meter's history again, e.g. after a failed load.
    /// The typed value, evidence and justification are kept.
    pub async fn reload_history(&self) -> Result<()> {
        let (name, commodity, generation) = {
            let mut guard = self.inner.lock().await;
            let meter = guard
                .pending
                .meter
                .as_ref()
                .ok_or(ReadingError::Incomplete("no meter selected"))?;
            let (name, commodity) = (meter.name.clone(), meter.commodity);
            guard.history = HistoryStatus::Loading;
            guard.generation += 1;
            (name, commodity, guard.generation)
        };
        self.spawn_fetch(name, commodity, generation).await;
        Ok(())
    }

    /// Wait until the most recent history fetch has finished.
    pub async fn wait_for_history(&self) {
        let handle = self.fetch.lock().await.handle.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn history_snapshot(&self) -> Option<HistorySnapshot> {
        self.inner.lock().await.history.snapshot().cloned()
    }

    /// Update the typed reading. Invalid text is rejected and leaves the
    /// previous value in place.
    pub async fn set_value(&self, text: &str) -> Result<Evaluation> {
        let value = parse_reading(text)?;
        let mut guard = self.inner.lock().await;
        if guard.pending.meter.is_none() {
            return Err(ReadingError::Incomplete("no meter selected"));
        }
        guard.pending.value_text = text.trim().to_string();
        guard.pending.value = value;
        let previous = guard.previous();
        guard.pending.justification =
            retain_justification(previous, value, guard.pending.justification);
        Ok(guard.evaluate(self.config.alert_threshold_ratio))
    }

    pub async fn set_justification(&self, justification: Option<Justification>) -> Result<Evaluation> {
        let mut guard = self.inner.lock().await;
        let current = guard.evaluate(self.config.alert_threshold_ratio);
        if justification.is_some() && current.classification != Classification::Regression {
            return Err(ReadingError::JustificationNotApplicable);
        }
        guard.pending.justification = justification;
        Ok(guard.evaluate(self.config.alert_threshold_ratio))
    }

    pub async fn attach_evidence(&self, evidence: Evidence) -> Result<Evaluation> {
        let mut guard = self.inner.lock().await;
        if guard.pending.meter.is_none() {
            return Err(ReadingError::Incomplete("no meter selected"));
        }
        guard.pending.evidence = Some(evidence);
        Ok(guard.evaluate(self.config.alert_threshold_ratio))
    }

    pub async fn clear_evidence(&self) -> Evaluation {
        let mut guard = self.inner.lock().await;
        guard.pending.evidence = None;
        guard.evaluate(self.config.alert_threshold_ratio)
    }

    /// Persist the Pending Submission at most once.
    ///
    /// A second call while one is in flight fails with `SubmissionInFlight`.
    /// On failure the pending data stays intact for a manual retry; on
    /// success the form is reset for the next meter unless another meter was
    /// selected meanwhile. The upload runs on its own task, so dropping the
    /// returned future does not leave the session stuck in flight.
    pub async fn submit(&self) -> Result<ReadingRecord> {
        let (request, selection) = {
            let mut guard = self.inner.lock().await;
            if guard.submitting {
                return Err(ReadingError::SubmissionInFlight);
            }

            let meter = guard
                .pending
                .meter
                .clone()
                .ok_or(ReadingError::Incomplete("no meter selected"))?;
            match &guard.history {
                HistoryStatus::Loaded(_) => {}
                HistoryStatus::Loading => {
                    return Err(ReadingError::Incomplete("meter history is still loading"))
                }
                HistoryStatus::Idle | HistoryStatus::Failed(_) => {
                    return Err(ReadingError::Incomplete("meter history is unavailable"))
                }
            }

            let evaluation = guard.evaluate(self.config.alert_threshold_ratio);
            let value = guard
                .pending
                .value
                .ok_or(ReadingError::Incomplete("reading value is missing"))?;
            let evidence = guard
                .pending
                .evidence
                .clone()
                .ok_or(ReadingError::Incomplete("evidence photo is missing"))?;
            if evaluation.blocked {
                return Err(ReadingError::ValidationBlocked);
            }

            guard.submitting = true;
            (
                SubmissionRequest {
                    meter,
                    value,
                    evidence,
                    annotation: evaluation.annotation,
                    operator: String::new(),
                },
                guard.selection,
            )
        };

        let session = self.clone();
        let task = tokio::spawn(async move {
            let outcome = session.persist(request).await;
            session.finish_submit(selection, outcome).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.inner.lock().await.submitting = false;
                log_warn!("Submission task ended abnormally: {err}");
                Err(ReadingError::PersistFailure(err.to_string()))
            }
        }
    }

    async fn finish_submit(
        &self,
        selection: u64,
        outcome: Result<ReadingRecord>,
    ) -> Result<ReadingRecord> {
        let reset = {
            let mut guard = self.inner.lock().await;
            guard.submitting = false;
            match &outcome {
                Ok(_) if guard.selection == selection => {
                    guard.replace_pending(PendingSubmission::default(), HistoryStatus::Idle);
                    true
                }
                Ok(_) => false,
                Err(err) => {
                    log_warn!("Submission failed, keeping pending data: {err}");
                    false
                }
            }
        };
        if reset {
            self.cancel_fetch().await;
        }
        outcome
    }

    async fn persist(&self, mut request: SubmissionRequest) -> Result<ReadingRecord> {
        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(ReadingError::NotAuthenticated),
            Err(err) => {
                log_warn!("Identity lookup failed: {err:#}");
                return Err(ReadingError::NotAuthenticated);
            }
        };
        if !user.can_record_readings() {
            return Err(ReadingError::AccessDenied(user.display_name));
        }

        request.operator = user.display_name;
        self.assembler.submit(request).await
    }

    async fn spawn_fetch(&self, name: String, commodity: CommodityType, generation: u64) {
        let mut slot = self.fetch.lock().await;
        if let Some(previous) = slot.cancel.take() {
            previous.cancel();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = self.inner.clone();
        let retriever = self.history.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("History fetch for {name} cancelled");
                    return;
                }
                result = retriever.snapshot(&name, commodity) => result,
            };

            let mut guard = inner.lock().await;
            if guard.generation != generation {
                debug!("Discarding stale history for {name}");
                return;
            }

            guard.history = match result {
                Ok(snapshot) => HistoryStatus::Loaded(snapshot),
                Err(err) => {
                    log_warn!("History for {name} unavailable: {err}");
                    HistoryStatus::Failed(err.to_string())
                }
            };
            let previous = guard.previous();
            guard.pending.justification =
                retain_justification(previous, guard.pending.value, guard.pending.justification);
        });

        slot.cancel = Some(cancel);
        slot.handle = Some(handle);
    }

    async fn cancel_fetch(&self) {
        let mut slot = self.fetch.lock().await;
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        slot.handle = None;
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, ScanGate> {
        match self.scan_gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
