use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    audit::AuditSink,
    capture::{CaptureWorker, Detector, FrameSource},
    db::Database,
    error::{ProctorError, ProctorResult},
    session::{Session, TerminationReason},
    settings::ProctorSettings,
};

use super::{
    engine::ControlLoop,
    state::{ProctorState, StatusSnapshot},
};

type Collaborators = (Box<dyn FrameSource>, Box<dyn Detector>);

enum Phase {
    Idle(Option<Collaborators>),
    Running {
        handle: JoinHandle<TerminationReason>,
        cancel: CancellationToken,
    },
    Stopping,
    Stopped(TerminationReason),
}

/// Owns one exam from start command to terminal state.
///
/// Cloning yields another handle to the same exam. Status snapshots are
/// published on a watch channel after every iteration.
#[derive(Clone)]
pub struct ProctorController {
    phase: Arc<Mutex<Phase>>,
    status_tx: Arc<watch::Sender<StatusSnapshot>>,
    db: Database,
    audit: Arc<dyn AuditSink>,
    settings: ProctorSettings,
}

impl ProctorController {
    pub fn new(
        db: Database,
        audit: Arc<dyn AuditSink>,
        mut settings: ProctorSettings,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
    ) -> Self {
        let debug_mode = std::env::var("PROCTOR_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            settings.heartbeat_every_ticks = 1;
        }

        let (status_tx, _) = watch::channel(StatusSnapshot::idle(settings.exam_duration()));

        Self {
            phase: Arc::new(Mutex::new(Phase::Idle(Some((source, detector))))),
            status_tx: Arc::new(status_tx),
            db,
            audit,
            settings,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    pub fn state(&self) -> ProctorState {
        self.status_tx.borrow().state
    }

    /// Idle -> Running: creates the session and spawns the polling loop.
    ///
    /// A store failure leaves the controller idle so the start can be retried.
    pub async fn start(&self) -> ProctorResult<ProctorState> {
        let mut phase = self.phase.lock().await;
        let collaborators = match &mut *phase {
            Phase::Idle(collaborators) => collaborators,
            Phase::Running { .. } | Phase::Stopping => return Err(ProctorError::AlreadyStarted),
            Phase::Stopped(_) => return Err(ProctorError::AlreadyStopped),
        };

        let session = Session::create(&self.db, self.settings.exam_duration()).await?;

        let (source, detector) = collaborators.take().ok_or(ProctorError::AlreadyStopped)?;
        let capture = CaptureWorker::new(source, detector, self.settings.frame_timeout());
        let engine = ControlLoop::new(
            session,
            capture,
            Arc::clone(&self.audit),
            self.db.clone(),
            &self.settings,
        );
        self.status_tx.send_replace(engine.snapshot());

        let cancel = engine.cancellation_token();
        let handle = tokio::spawn(run_loop(
            engine,
            cancel.clone(),
            Arc::clone(&self.status_tx),
            Arc::clone(&self.phase),
            self.settings.poll_interval(),
        ));

        *phase = Phase::Running { handle, cancel };
        info!("Exam started");
        Ok(ProctorState::Running)
    }

    /// Running -> Stopped(ManualStop). Stopping a finished exam returns its
    /// existing reason.
    pub async fn stop(&self) -> ProctorResult<TerminationReason> {
        let running = {
            let mut phase = self.phase.lock().await;
            match std::mem::replace(&mut *phase, Phase::Stopping) {
                Phase::Running { handle, cancel } => Some((handle, cancel)),
                Phase::Stopping => None,
                Phase::Stopped(reason) => {
                    *phase = Phase::Stopped(reason);
                    return Ok(reason);
                }
                idle @ Phase::Idle(_) => {
                    *phase = idle;
                    return Err(ProctorError::NotRunning);
                }
            }
        };

        // Another caller is already stopping the loop.
        let Some((handle, cancel)) = running else {
            return self.wait_for_stop().await;
        };

        cancel.cancel();
        let reason = match handle.await {
            Ok(reason) => reason,
            Err(join_err) => {
                error!("Proctoring loop failed to join: {join_err}");
                TerminationReason::ManualStop
            }
        };

        *self.phase.lock().await = Phase::Stopped(reason);
        Ok(reason)
    }

    /// Waits until the exam reaches its terminal state, however it gets there.
    pub async fn wait_for_stop(&self) -> ProctorResult<TerminationReason> {
        let mut rx = self.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().state.termination_reason() {
                return Ok(reason);
            }
            if rx.changed().await.is_err() {
                return Err(ProctorError::NotRunning);
            }
        }
    }
}

async fn run_loop(
    mut engine: ControlLoop,
    cancel: CancellationToken,
    status_tx: Arc<watch::Sender<StatusSnapshot>>,
    phase: Arc<Mutex<Phase>>,
    poll_interval: Duration,
) -> TerminationReason {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let final_snapshot = loop {
        let stop_requested = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = ticker.tick() => cancel.is_cancelled(),
        };

        let outcome = engine.step(stop_requested).await;
        if outcome.is_stopped() {
            break outcome.into_snapshot();
        }
        status_tx.send_replace(outcome.into_snapshot());
    };

    let reason = final_snapshot
        .state
        .termination_reason()
        .unwrap_or(TerminationReason::ManualStop);
    // Phase first, so observers of the final snapshot see a stopped controller.
    *phase.lock().await = Phase::Stopped(reason);
    status_tx.send_replace(final_snapshot);
    if reason.is_violation() {
        warn!("Exam auto-terminated: {reason}");
    } else {
        info!("Exam finished: {reason}");
    }

    reason
}
