//! The exam session: identity, start time, violation tally and outcome.

mod reason;

pub use reason::TerminationReason;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;

use crate::{
    audit::{AuditSink, ViolationEvent},
    db::Database,
    error::{LogError, ProctorError, ProctorResult},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    start_time: DateTime<Utc>,
    violation_total: u64,
    termination_reason: Option<TerminationReason>,
}

/// Outcome of logging one violation. The tally is bumped even when the
/// audit append fails; `audit_error` carries that failure for the operator.
#[derive(Debug)]
pub struct RecordedViolation {
    pub event: ViolationEvent,
    pub audit_error: Option<LogError>,
}

impl Session {
    /// Registers a new session with the store, which assigns its id.
    pub async fn create(db: &Database, duration: Duration) -> ProctorResult<Self> {
        let start_time = Utc::now();
        let id = db
            .create_session(start_time, duration.as_millis() as u64)
            .await
            .map_err(ProctorError::StoreUnavailable)?;

        info!("Created exam session {id}");
        Ok(Self::new(id, start_time))
    }

    pub fn new(id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            violation_total: 0,
            termination_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn violation_total(&self) -> u64 {
        self.violation_total
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn record_violation(&mut self, label: &str, audit: &dyn AuditSink) -> RecordedViolation {
        let event = ViolationEvent::new(self.id.clone(), label);
        self.violation_total += 1;

        let audit_error = match audit.append(&event) {
            Ok(()) => None,
            Err(err) => {
                warn!("Violation '{label}' for session {} not audited: {err}", self.id);
                Some(err)
            }
        };

        RecordedViolation { event, audit_error }
    }

    /// Sets the termination reason. Returns false, leaving the original
    /// reason in place, when the session was already terminated.
    pub fn terminate(&mut self, reason: TerminationReason) -> bool {
        if let Some(existing) = self.termination_reason {
            if existing != reason {
                warn!(
                    "Session {} already terminated ({existing}); ignoring {reason}",
                    self.id
                );
            }
            return false;
        }

        self.termination_reason = Some(reason);
        info!("Session {} terminated: {reason}", self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryAudit {
        events: Mutex<Vec<ViolationEvent>>,
    }

    impl AuditSink for MemoryAudit {
        fn append(&self, event: &ViolationEvent) -> Result<(), LogError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct BrokenAudit;

    impl AuditSink for BrokenAudit {
        fn append(&self, _event: &ViolationEvent) -> Result<(), LogError> {
            Err(LogError::WriteFailed(io::Error::new(
                io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[test]
    fn record_violation_counts_and_audits() {
        let audit = MemoryAudit::default();
        let mut session = Session::new("s-1".into(), Utc::now());

        let recorded = session.record_violation("Phone detected", &audit);
        session.record_violation("looking away", &audit);

        assert!(recorded.audit_error.is_none());
        assert_eq!(recorded.event.session_id, "s-1");
        assert_eq!(session.violation_total(), 2);

        let events = audit.events.lock().unwrap();
        let labels: Vec<_> = events.iter().map(|event| event.label.as_str()).collect();
        assert_eq!(labels, vec!["Phone detected", "looking away"]);
    }

    #[test]
    fn audit_failure_still_counts_the_violation() {
        let mut session = Session::new("s-2".into(), Utc::now());
        let recorded = session.record_violation("Phone detected", &BrokenAudit);

        assert!(matches!(recorded.audit_error, Some(LogError::WriteFailed(_))));
        assert_eq!(session.violation_total(), 1);
    }

    #[test]
    fn terminate_is_write_once() {
        let mut session = Session::new("s-3".into(), Utc::now());
        assert!(session.termination_reason().is_none());

        assert!(session.terminate(TerminationReason::TerminatedNoFace));
        assert!(!session.terminate(TerminationReason::ManualStop));
        assert!(!session.terminate(TerminationReason::TimeExpired));

        assert_eq!(
            session.termination_reason(),
            Some(TerminationReason::TerminatedNoFace)
        );
    }

    #[tokio::test]
    async fn create_registers_session_with_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("proctor.sqlite3")).unwrap();

        let session = Session::create(&db, Duration::from_secs(1800)).await.unwrap();
        let record = db.get_session(session.id()).await.unwrap().unwrap();

        assert_eq!(record.duration_ms, 1_800_000);
        assert_eq!(record.violation_total, 0);
        assert!(record.termination_reason.is_none());
    }
}
