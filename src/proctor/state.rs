use serde::Serialize;
use std::time::Duration;

use crate::{session::TerminationReason, timer::format_remaining};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum ProctorState {
    Idle,
    Running,
    Stopped(TerminationReason),
}

impl ProctorState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProctorState::Stopped(_))
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self {
            ProctorState::Stopped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Background tier the presentation layer styles the status banner with.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn from_violation_total(total: u64) -> Self {
        match total {
            0 => Severity::Normal,
            1..=2 => Severity::Warning,
            _ => Severity::Critical,
        }
    }
}

/// What the presentation layer renders after each iteration.
///
/// `last_warnings` are proctoring violations from the latest frame;
/// `notices` are operational problems (camera, detector, audit, store) and
/// must not be presented as violations.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: ProctorState,
    pub session_id: Option<String>,
    pub status_line: String,
    pub remaining_ms: u64,
    pub remaining_display: String,
    pub violation_total: u64,
    pub severity: Severity,
    pub last_warnings: Vec<String>,
    pub notices: Vec<String>,
}

impl StatusSnapshot {
    pub fn idle(duration: Duration) -> Self {
        Self {
            state: ProctorState::Idle,
            session_id: None,
            status_line: "Ready to start".into(),
            remaining_ms: duration.as_millis() as u64,
            remaining_display: format_remaining(duration),
            violation_total: 0,
            severity: Severity::Normal,
            last_warnings: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn new(
        state: ProctorState,
        session_id: &str,
        remaining: Duration,
        violation_total: u64,
        last_warnings: Vec<String>,
        notices: Vec<String>,
    ) -> Self {
        let status_line = match state {
            ProctorState::Idle => "Ready to start".to_string(),
            ProctorState::Running => match Severity::from_violation_total(violation_total) {
                Severity::Normal => "Exam in progress".to_string(),
                Severity::Warning => format!("Warning: {violation_total} violation(s) detected"),
                Severity::Critical => "Critical: maximum violations reached".to_string(),
            },
            ProctorState::Stopped(reason) => reason.describe().to_string(),
        };

        Self {
            state,
            session_id: Some(session_id.to_string()),
            status_line,
            remaining_ms: remaining.as_millis() as u64,
            remaining_display: format_remaining(remaining),
            violation_total,
            severity: Severity::from_violation_total(violation_total),
            last_warnings,
            notices,
        }
    }
}
