//! Per-message send state machine
//!
//! `Idle -> PreFlight -> Composing -> Locating -> Verifying -> Completed`.
//! The device lock is held from PreFlight until the attempt reaches its terminal
//! state; the history record is written after it is released.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::evidence::EvidenceStore;
use super::locator::{LocatorExhausted, SendButtonLocator, SendCandidate};
use super::verifier::{body_excerpt, SendVerifier, Verdict, VerificationMode};
use crate::config::AutomationConfig;
use crate::device::{DeviceHandle, DeviceSession, DriverError, HierarchySnapshot, ScreenSize, UiDriver};
use crate::error::SendError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::models::{AttemptOutcome, OutboundMessage, PendingAttempt, SendAttempt, SendStatus, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    PreFlight,
    Composing,
    Locating,
    Verifying,
    Completed(AttemptOutcome),
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptState::Idle => write!(f, "Idle"),
            AttemptState::PreFlight => write!(f, "PreFlight"),
            AttemptState::Composing => write!(f, "Composing"),
            AttemptState::Locating => write!(f, "Locating"),
            AttemptState::Verifying => write!(f, "Verifying"),
            AttemptState::Completed(AttemptOutcome::Sent) => write!(f, "Completed(Sent)"),
            AttemptState::Completed(AttemptOutcome::Failed) => write!(f, "Completed(Failed)"),
        }
    }
}

/// Mutable bookkeeping for one attempt in flight
struct AttemptRun<'a> {
    handle: &'a DeviceHandle,
    session: &'a DeviceSession,
    pending: PendingAttempt,
    state: AttemptState,
    excerpt: String,
    /// Most recent dump, kept as evidence if the attempt fails
    last_snapshot: Option<Arc<HierarchySnapshot>>,
}

impl AttemptRun<'_> {
    fn enter(&mut self, next: AttemptState) {
        tracing::info!("Attempt {}: {} -> {}", self.pending.id, self.state, next);
        self.state = next;
    }

    fn keep(&mut self, snapshot: &Arc<HierarchySnapshot>) {
        self.last_snapshot = Some(Arc::clone(snapshot));
    }
}

/// Drives one message through compose, locate, tap and verify
pub struct RetryController {
    driver: UiDriver,
    locator: SendButtonLocator,
    verifier: SendVerifier,
    history: HistoryStore,
    evidence: EvidenceStore,
    config: AutomationConfig,
}

impl RetryController {
    pub fn new(
        driver: UiDriver,
        history: HistoryStore,
        evidence: EvidenceStore,
        config: AutomationConfig,
    ) -> Self {
        Self {
            driver,
            locator: SendButtonLocator::new(config.heuristic_points.clone()),
            verifier: SendVerifier::from_config(&config),
            history,
            evidence,
            config,
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Run one attempt to its terminal state and record it
    ///
    /// Never fails: device trouble ends as a `Failed` attempt. Exactly one
    /// history record is appended per call; when that write fails the attempt
    /// comes back with `recorded == false` and the reason in `error`.
    pub async fn run(&self, session: &DeviceSession, message: OutboundMessage) -> SendAttempt {
        let handle = self.driver.acquire(&session.device).await;

        let mut run = AttemptRun {
            handle: &handle,
            session,
            excerpt: body_excerpt(message.body(), self.config.excerpt_chars),
            pending: PendingAttempt::start(message, session.device.clone()),
            state: AttemptState::Idle,
            last_snapshot: None,
        };

        let result = self.drive(&mut run).await;

        let mut attempt = match result {
            Ok(status) => {
                run.enter(AttemptState::Completed(AttemptOutcome::Sent));
                run.pending.sent(status)
            }
            Err((status, err)) => {
                run.enter(AttemptState::Completed(AttemptOutcome::Failed));
                let mut detail = err.to_string();
                if let Some(diagnostic) = err.diagnostic() {
                    detail = format!("{}\n{}", detail, diagnostic);
                }
                tracing::warn!("Attempt {} failed ({}): {}", run.pending.id, status.as_str(), err);

                let evidence = self
                    .evidence
                    .capture(&run.pending.id, &handle, run.last_snapshot.as_deref())
                    .await;
                run.pending.failed(status, detail, evidence)
            }
        };

        drop(handle);

        match self.history.append(&HistoryRecord::from_attempt(&attempt)) {
            Ok(()) => attempt.recorded = true,
            Err(e) => {
                tracing::error!("Failed to record attempt {}: {}", attempt.id, e);
                let note = format!("history record not written: {}", e);
                attempt.error = Some(match attempt.error.take() {
                    Some(error) => format!("{}\n{}", error, note),
                    None => note,
                });
            }
        }

        tracing::info!(
            "Attempt {} to {} finished: {}",
            attempt.id,
            attempt.message.recipient(),
            attempt.status.as_str()
        );
        attempt
    }

    async fn drive(&self, run: &mut AttemptRun<'_>) -> Result<SendStatus, (SendStatus, SendError)> {
        run.enter(AttemptState::PreFlight);
        self.preflight(run).await.map_err(|e| (SendStatus::Failed, e))?;

        run.enter(AttemptState::Composing);
        let composed = self.compose(run).await.map_err(|e| (SendStatus::Failed, e))?;

        run.enter(AttemptState::Locating);
        let plan = self.locate(run, composed.clone()).await.map_err(|e| (SendStatus::AutoClickFailed, e))?;

        run.enter(AttemptState::Verifying);
        self.tap_and_verify(run, &composed, plan)
            .await
            .map_err(|e| (SendStatus::AutoClickFailed, e))
    }

    /// Wake the screen, leave the messaging app and check storage
    async fn preflight(&self, run: &mut AttemptRun<'_>) -> Result<(), SendError> {
        let handle = run.handle;

        if self.retrying("wake", move || handle.wake()).await? {
            tokio::time::sleep(self.config.home_settle).await;
        }

        let foreground = self
            .retrying("foreground_package", move || handle.foreground_package())
            .await?;
        if let Some(package) = foreground.filter(|p| self.verifier.is_messaging_package(p)) {
            tracing::info!("{} is already open, returning to the home screen", package);
            self.retrying("press_home", move || handle.press_home()).await?;
            tokio::time::sleep(self.config.home_settle).await;
        }

        match self.retrying("free_storage_kb", move || handle.free_storage_kb()).await {
            Ok(free_kb) if free_kb < self.config.min_free_kb => {
                return Err(SendError::PreflightFailed(format!(
                    "only {} KiB free on device storage, need {} KiB for diagnostics",
                    free_kb, self.config.min_free_kb
                )));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not read free storage, continuing: {}", e),
        }

        Ok(())
    }

    /// Open the conversation and make sure the body is in the input field
    async fn compose(&self, run: &mut AttemptRun<'_>) -> Result<Arc<HierarchySnapshot>, SendError> {
        let handle = run.handle;
        let recipient = run.pending.message().recipient().to_string();
        let body = run.pending.message().body().to_string();

        let (number, text) = (recipient.as_str(), body.as_str());
        let launched = self
            .retrying("open_compose", move || handle.open_compose(number, text))
            .await?;
        if !launched {
            tracing::warn!("Compose intent did not report a successful launch");
        }
        tokio::time::sleep(self.config.compose_settle).await;

        let snapshot = self.retrying("dump_hierarchy", move || handle.dump_hierarchy()).await?;
        run.keep(&snapshot);
        if snapshot.field_contains(&run.excerpt) {
            return Ok(snapshot);
        }

        // Body not pre-filled: type it into the input ourselves
        let field = snapshot.compose_field().ok_or_else(|| {
            SendError::ComposeFailed(if launched {
                "compose screen has no visible input field".to_string()
            } else {
                "compose intent failed and no input field is visible".to_string()
            })
        })?;
        tracing::info!("Body not pre-filled, typing into field at {}", field.bounds.center());

        handle.tap(field.bounds.center()).await?;
        handle.type_text(&body).await?;
        tokio::time::sleep(self.config.tap_settle).await;

        let snapshot = self.retrying("dump_hierarchy", move || handle.dump_hierarchy()).await?;
        run.keep(&snapshot);
        if snapshot.field_contains(&run.excerpt) {
            Ok(snapshot)
        } else {
            Err(SendError::ComposeFailed(
                "message body did not appear in the input field after typing".to_string(),
            ))
        }
    }

    /// Build the candidate plan, re-dumping while it is empty
    async fn locate(
        &self,
        run: &mut AttemptRun<'_>,
        mut snapshot: Arc<HierarchySnapshot>,
    ) -> Result<Vec<SendCandidate>, SendError> {
        let handle = run.handle;
        let screen = self.screen_size(run).await;

        let mut redumps = 0;
        loop {
            let plan = self.locator.candidates(&snapshot, screen);
            if !plan.is_empty() {
                return Ok(plan);
            }
            if redumps >= self.config.locate_retries {
                return Err(LocatorExhausted {
                    elements: snapshot.len(),
                    screen_known: screen.is_some(),
                }
                .into());
            }

            redumps += 1;
            tracing::info!("No send candidates, re-dumping ({}/{})", redumps, self.config.locate_retries);
            tokio::time::sleep(self.config.tap_settle).await;
            snapshot = self.retrying("dump_hierarchy", move || handle.dump_hierarchy()).await?;
            run.keep(&snapshot);
        }
    }

    /// Screen size from the session cache, the bridge, or a screenshot
    async fn screen_size(&self, run: &AttemptRun<'_>) -> Option<ScreenSize> {
        if let Some(size) = run.session.cached_screen_size() {
            return Some(size);
        }

        let handle = run.handle;
        let size = match self.retrying("screen_size", move || handle.screen_size()).await {
            Ok(size) => Some(size),
            Err(e) => {
                tracing::warn!("Screen size unavailable ({}), measuring a screenshot", e);
                match handle.screenshot().await {
                    Ok(shot) => Some(shot.size()),
                    Err(e) => {
                        tracing::warn!("Screenshot unavailable, coordinate fallback disabled: {}", e);
                        None
                    }
                }
            }
        };

        if let Some(size) = size {
            run.session.remember_screen_size(size);
        }
        size
    }

    /// One tap per candidate, then verification rounds
    ///
    /// Once anything has been tapped the message may be out, so later device
    /// errors are treated as an unverifiable send rather than a failure.
    async fn tap_and_verify(
        &self,
        run: &mut AttemptRun<'_>,
        before: &HierarchySnapshot,
        plan: Vec<SendCandidate>,
    ) -> Result<SendStatus, SendError> {
        let handle = run.handle;
        let mut tapped = 0;

        for candidate in plan {
            tracing::info!("Tapping {} at {}", candidate.tier, candidate.point);
            run.pending.tapping(candidate.tier, candidate.point);
            if let Err(e) = handle.tap(candidate.point).await {
                if tapped == 0 {
                    return Err(e.into());
                }
                return self.unverifiable(tapped, &e);
            }
            tapped += 1;
            tokio::time::sleep(self.config.tap_settle).await;

            let mut after = match self.retrying("dump_hierarchy", move || handle.dump_hierarchy()).await {
                Ok(snapshot) => snapshot,
                Err(e) => return self.unverifiable(tapped, &e),
            };
            run.keep(&after);

            if candidate.tier == Tier::CoordinateHeuristic && after.field_contains(&run.excerpt) {
                tracing::debug!("Body still in field after tapping {}, trying next point", candidate.point);
                continue;
            }

            for round in 1..=self.config.verify_attempts {
                run.pending.count_verify_round();
                if self.verifier.verify(before, &after, &run.excerpt) == Verdict::Sent {
                    tracing::info!("Send confirmed on round {}", round);
                    return Ok(SendStatus::SentAutomatically);
                }
                if round < self.config.verify_attempts {
                    tokio::time::sleep(self.config.verify_wait).await;
                    after = match self.retrying("dump_hierarchy", move || handle.dump_hierarchy()).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => return self.unverifiable(tapped, &e),
                    };
                    run.keep(&after);
                }
            }

            match self.verifier.mode() {
                VerificationMode::Optimistic => {
                    tracing::info!("Send unconfirmed after {} rounds, assuming sent", self.config.verify_attempts);
                    return Ok(SendStatus::OpenedAutoClickAttempted);
                }
                VerificationMode::Strict if !self.verifier.in_messaging_app(&after) => {
                    // Whatever is on screen now is not ours to tap
                    tracing::warn!("Messaging app left the foreground after {}, stopping", candidate.tier);
                    return Err(SendError::Unconfirmed(tapped));
                }
                VerificationMode::Strict => {
                    tracing::warn!("Send unconfirmed via {}, trying next candidate", candidate.tier);
                }
            }
        }

        Err(SendError::Unconfirmed(tapped))
    }

    /// A tap went out but the screen can no longer be read
    fn unverifiable(&self, tapped: usize, err: &DriverError) -> Result<SendStatus, SendError> {
        tracing::warn!("Cannot verify send after {} tap(s): {}", tapped, err);
        match self.verifier.mode() {
            VerificationMode::Optimistic => Ok(SendStatus::OpenedAutoClickAttempted),
            VerificationMode::Strict => Err(SendError::Unconfirmed(tapped)),
        }
    }

    /// Retry a device command up to `max_retries` extra times
    async fn retrying<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let mut retries = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if retries < self.config.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        "{} failed, retry {}/{}: {}",
                        operation,
                        retries,
                        self.config.max_retries,
                        e
                    );
                    tokio::time::sleep(backoff(self.config.retry_backoff, retries)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Linear backoff
fn backoff(base: Duration, retry: u32) -> Duration {
    base * retry
}
