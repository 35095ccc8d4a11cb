use serde::{Deserialize, Serialize};
use std::fmt;

use crate::escalation::ReservedLabel;

/// Why a session left the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    ManualStop,
    TimeExpired,
    TerminatedMultiplePersons,
    TerminatedNoFace,
    /// The frame source failed too many times in a row.
    SourceLost,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::ManualStop => "ManualStop",
            TerminationReason::TimeExpired => "TimeExpired",
            TerminationReason::TerminatedMultiplePersons => "TerminatedMultiplePersons",
            TerminationReason::TerminatedNoFace => "TerminatedNoFace",
            TerminationReason::SourceLost => "SourceLost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ManualStop" => Some(TerminationReason::ManualStop),
            "TimeExpired" => Some(TerminationReason::TimeExpired),
            "TerminatedMultiplePersons" => Some(TerminationReason::TerminatedMultiplePersons),
            "TerminatedNoFace" => Some(TerminationReason::TerminatedNoFace),
            "SourceLost" => Some(TerminationReason::SourceLost),
            _ => None,
        }
    }

    /// Operator-facing description of the outcome.
    pub fn describe(&self) -> &'static str {
        match self {
            TerminationReason::ManualStop => "Exam ended",
            TerminationReason::TimeExpired => "Exam ended - time's up",
            TerminationReason::TerminatedMultiplePersons => {
                "Exam terminated - multiple persons detected"
            }
            TerminationReason::TerminatedNoFace => "Exam terminated - student not visible",
            TerminationReason::SourceLost => "Exam terminated - camera unavailable",
        }
    }

    /// Whether the proctoring policy, rather than the operator or clock, ended the exam.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            TerminationReason::TerminatedMultiplePersons | TerminationReason::TerminatedNoFace
        )
    }
}

impl From<ReservedLabel> for TerminationReason {
    fn from(label: ReservedLabel) -> Self {
        match label {
            ReservedLabel::MultiplePersons => TerminationReason::TerminatedMultiplePersons,
            ReservedLabel::NoFace => TerminationReason::TerminatedNoFace,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_storage_names() {
        for reason in [
            TerminationReason::ManualStop,
            TerminationReason::TimeExpired,
            TerminationReason::TerminatedMultiplePersons,
            TerminationReason::TerminatedNoFace,
            TerminationReason::SourceLost,
        ] {
            assert_eq!(TerminationReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(TerminationReason::parse("Exploded"), None);
    }

    #[test]
    fn reserved_labels_map_to_violation_reasons() {
        let reason = TerminationReason::from(ReservedLabel::NoFace);
        assert_eq!(reason, TerminationReason::TerminatedNoFace);
        assert!(reason.is_violation());
        assert!(!TerminationReason::TimeExpired.is_violation());
    }
}
