use std::{sync::Arc, time::Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    audit::AuditSink,
    capture::CaptureWorker,
    db::Database,
    error::ProctorError,
    escalation::{evaluate, normalize_labels, Action, EscalationCounters, ReservedLabel},
    session::{Session, TerminationReason},
    settings::{FrameFailurePolicy, ProctorSettings},
    timer::ExamTimer,
};

use super::state::{ProctorState, StatusSnapshot};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Result of one control loop iteration.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Continue(StatusSnapshot),
    Stopped(StatusSnapshot),
}

impl StepOutcome {
    pub fn snapshot(&self) -> &StatusSnapshot {
        match self {
            StepOutcome::Continue(snapshot) | StepOutcome::Stopped(snapshot) => snapshot,
        }
    }

    pub fn into_snapshot(self) -> StatusSnapshot {
        match self {
            StepOutcome::Continue(snapshot) | StepOutcome::Stopped(snapshot) => snapshot,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, StepOutcome::Stopped(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopPolicy {
    max_frame_failures: u32,
    frame_failure_policy: FrameFailurePolicy,
    heartbeat_every_ticks: u64,
}

/// One running exam: the sole owner and writer of the session, its timer
/// and its escalation counters.
///
/// `step` is the whole per-iteration state machine; whatever drives it
/// (the controller's ticker, or a test) only decides when to call it.
/// Cancelling the loop's token stops it even mid-capture.
pub struct ControlLoop {
    session: Session,
    timer: ExamTimer,
    counters: EscalationCounters,
    capture: CaptureWorker,
    audit: Arc<dyn AuditSink>,
    db: Database,
    policy: LoopPolicy,
    frame_failures: u32,
    ticks: u64,
    state: ProctorState,
    cancel: CancellationToken,
}

impl ControlLoop {
    /// Builds the loop for an already created session and starts its clock.
    pub fn new(
        session: Session,
        capture: CaptureWorker,
        audit: Arc<dyn AuditSink>,
        db: Database,
        settings: &ProctorSettings,
    ) -> Self {
        let mut timer = ExamTimer::new(settings.exam_duration());
        timer.start(Instant::now());

        log_info!(
            "Proctoring session {} for {}s",
            session.id(),
            settings.exam_duration_secs
        );

        Self {
            session,
            timer,
            counters: EscalationCounters::default(),
            capture,
            audit,
            db,
            policy: LoopPolicy {
                max_frame_failures: settings.max_frame_failures.max(1),
                frame_failure_policy: settings.frame_failure_policy,
                heartbeat_every_ticks: u64::from(settings.heartbeat_every_ticks.max(1)),
            },
            frame_failures: 0,
            ticks: 0,
            state: ProctorState::Running,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that requests a manual stop, observed even while a frame pull
    /// is in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn counters(&self) -> EscalationCounters {
        self.counters
    }

    pub fn state(&self) -> ProctorState {
        self.state
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot_with(Instant::now(), Vec::new(), Vec::new())
    }

    pub async fn step(&mut self, stop_requested: bool) -> StepOutcome {
        self.step_at(stop_requested, Instant::now()).await
    }

    /// Runs one iteration with `now` as the timer reading.
    ///
    /// Order: manual stop, then timer expiry, then one frame through the
    /// detector and escalation policy.
    pub(crate) async fn step_at(&mut self, stop_requested: bool, now: Instant) -> StepOutcome {
        if self.state.is_stopped() {
            return StepOutcome::Stopped(self.snapshot_with(now, Vec::new(), Vec::new()));
        }

        if stop_requested {
            return self.finish(TerminationReason::ManualStop, now, Vec::new()).await;
        }

        if self.timer.is_expired_at(now) {
            return self.finish(TerminationReason::TimeExpired, now, Vec::new()).await;
        }

        self.ticks += 1;
        let mut notices = Vec::new();

        let captured = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.capture.capture() => Some(result),
        };
        let Some(captured) = captured else {
            log_info!("stop requested during capture for session {}", self.session.id());
            return self.finish(TerminationReason::ManualStop, now, Vec::new()).await;
        };

        let raw_labels = match captured {
            Ok(labels) => {
                self.frame_failures = 0;
                labels
            }
            Err(err) if err.is_source_failure() => {
                self.frame_failures += 1;
                log_warn!(
                    "capture failed ({}/{}) for session {}: {err}",
                    self.frame_failures,
                    self.policy.max_frame_failures,
                    self.session.id()
                );
                notices.push(ProctorError::from(err).to_string());

                if self.frame_failures >= self.policy.max_frame_failures {
                    return self.finish(TerminationReason::SourceLost, now, notices).await;
                }

                match self.policy.frame_failure_policy {
                    FrameFailurePolicy::Ignore => Vec::new(),
                    FrameFailurePolicy::TreatAsNoFace => {
                        vec![ReservedLabel::NoFace.as_str().to_string()]
                    }
                }
            }
            Err(err) => {
                // The frame was read; only the detector failed.
                self.frame_failures = 0;
                log_warn!("detection failed for session {}: {err}", self.session.id());
                notices.push(ProctorError::from(err).to_string());
                Vec::new()
            }
        };

        let labels = normalize_labels(raw_labels);
        let evaluation = evaluate(&labels, self.counters);
        self.counters = evaluation.counters;
        let warnings: Vec<String> = evaluation.warnings.iter().map(ToString::to_string).collect();

        match evaluation.action {
            Action::Terminate(label) => {
                let audit_label = format!("{label} - auto terminated");
                self.log_violation(&audit_label, &mut notices).await;
                self.finish(TerminationReason::from(label), now, notices).await
            }
            Action::Continue => {
                let ad_hoc: Vec<String> = evaluation.ad_hoc_labels().map(str::to_string).collect();
                for label in &ad_hoc {
                    self.log_violation(label, &mut notices).await;
                }

                if self.ticks % self.policy.heartbeat_every_ticks == 0 {
                    self.heartbeat(&mut notices).await;
                }

                StepOutcome::Continue(self.snapshot_with(now, warnings, notices))
            }
        }
    }

    async fn log_violation(&mut self, label: &str, notices: &mut Vec<String>) {
        let recorded = self.session.record_violation(label, self.audit.as_ref());
        if let Some(err) = recorded.audit_error {
            notices.push(ProctorError::from(err).to_string());
        }

        if let Err(err) = self.db.append_violation(&recorded.event).await {
            log_error!(
                "failed to persist violation '{label}' for session {}: {err:#}",
                self.session.id()
            );
            notices.push(format!("session store write failed: {err}"));
        }
    }

    async fn heartbeat(&self, notices: &mut Vec<String>) {
        if let Err(err) = self
            .db
            .update_session_progress(self.session.id(), self.session.violation_total(), Utc::now())
            .await
        {
            log_error!("failed to persist progress for session {}: {err:#}", self.session.id());
            notices.push(format!("session store write failed: {err}"));
        }
    }

    async fn finish(
        &mut self,
        reason: TerminationReason,
        now: Instant,
        mut notices: Vec<String>,
    ) -> StepOutcome {
        self.session.terminate(reason);
        let reason = self.session.termination_reason().unwrap_or(reason);
        self.state = ProctorState::Stopped(reason);

        self.capture.release().await;

        if let Err(err) = self
            .db
            .mark_session_stopped(
                self.session.id(),
                reason,
                self.session.violation_total(),
                Utc::now(),
            )
            .await
        {
            log_error!("failed to persist outcome of session {}: {err:#}", self.session.id());
            notices.push(format!("session store write failed: {err}"));
        }

        let ran_for = Utc::now() - self.session.start_time();
        log_info!(
            "Session {} stopped: {reason} after {}s, {} iterations, {} violations",
            self.session.id(),
            ran_for.num_seconds(),
            self.ticks,
            self.session.violation_total()
        );

        StepOutcome::Stopped(self.snapshot_with(now, Vec::new(), notices))
    }

    fn snapshot_with(
        &self,
        now: Instant,
        last_warnings: Vec<String>,
        notices: Vec<String>,
    ) -> StatusSnapshot {
        StatusSnapshot::new(
            self.state,
            self.session.id(),
            self.timer.remaining_at(now),
            self.session.violation_total(),
            last_warnings,
            notices,
        )
    }
}
