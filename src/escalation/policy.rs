use serde::{Deserialize, Serialize};
use std::fmt;

use super::labels::{ReservedLabel, ViolationLabel};

/// Occurrences of a reserved label needed before the session is terminated.
pub const TERMINATION_THRESHOLD: u32 = 3;

/// Per-label occurrence counters for the reserved labels.
///
/// Counters only ever grow during a session: a clean frame does not reset
/// them, so the threshold is "3 occurrences in this session" rather than
/// "3 frames in a row".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationCounters {
    pub multiple_persons: u32,
    pub no_face: u32,
}

impl EscalationCounters {
    pub fn get(&self, label: ReservedLabel) -> u32 {
        match label {
            ReservedLabel::MultiplePersons => self.multiple_persons,
            ReservedLabel::NoFace => self.no_face,
        }
    }

    fn increment(&mut self, label: ReservedLabel) -> u32 {
        let slot = match label {
            ReservedLabel::MultiplePersons => &mut self.multiple_persons,
            ReservedLabel::NoFace => &mut self.no_face,
        };
        *slot = slot.saturating_add(1);
        *slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Terminate(ReservedLabel),
}

/// A per-frame warning for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Reserved label seen; `count` of `TERMINATION_THRESHOLD` so far.
    Reserved { label: ReservedLabel, count: u32 },
    Other(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Reserved { label, count } => write!(
                f,
                "{} ({}/{})",
                label,
                (*count).min(TERMINATION_THRESHOLD),
                TERMINATION_THRESHOLD
            ),
            Warning::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub action: Action,
    pub counters: EscalationCounters,
    pub warnings: Vec<Warning>,
}

impl Evaluation {
    /// Ad-hoc labels in this frame; these are logged and never escalate.
    pub fn ad_hoc_labels(&self) -> impl Iterator<Item = &str> {
        self.warnings.iter().filter_map(|warning| match warning {
            Warning::Other(label) => Some(label.as_str()),
            Warning::Reserved { .. } => None,
        })
    }
}

/// Feeds one frame's labels through the escalation policy.
///
/// Every reserved label present is incremented; absent ones keep their
/// count. The first reserved label in `ReservedLabel::PRECEDENCE` whose
/// count is at or above the threshold terminates, so at most one terminal
/// action is produced per frame.
pub fn evaluate(labels: &[ViolationLabel], counters: EscalationCounters) -> Evaluation {
    let mut counters = counters;
    let mut warnings = Vec::with_capacity(labels.len());

    for reserved in ReservedLabel::PRECEDENCE {
        if labels.contains(&ViolationLabel::Reserved(reserved)) {
            let count = counters.increment(reserved);
            warnings.push(Warning::Reserved {
                label: reserved,
                count,
            });
        }
    }

    for label in labels {
        if let ViolationLabel::Other(raw) = label {
            warnings.push(Warning::Other(raw.clone()));
        }
    }

    let action = ReservedLabel::PRECEDENCE
        .into_iter()
        .find(|reserved| {
            labels.contains(&ViolationLabel::Reserved(*reserved))
                && counters.get(*reserved) >= TERMINATION_THRESHOLD
        })
        .map(Action::Terminate)
        .unwrap_or(Action::Continue);

    Evaluation {
        action,
        counters,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::normalize_labels;

    fn frame(labels: &[&str]) -> Vec<ViolationLabel> {
        normalize_labels(labels.iter().copied())
    }

    #[test]
    fn no_face_terminates_on_third_frame_exactly_once() {
        let mut counters = EscalationCounters::default();
        let mut terminations = Vec::new();

        for index in 1..=3 {
            let evaluation = evaluate(&frame(&["no-face"]), counters);
            assert_eq!(evaluation.counters.no_face, counters.no_face + 1);
            counters = evaluation.counters;
            if evaluation.action != Action::Continue {
                terminations.push((index, evaluation.action));
            }
        }

        assert_eq!(terminations, vec![(3, Action::Terminate(ReservedLabel::NoFace))]);
    }

    #[test]
    fn multiple_persons_takes_precedence_over_no_face() {
        let counters = EscalationCounters {
            multiple_persons: 2,
            no_face: 2,
        };
        let evaluation = evaluate(&frame(&["no-face", "multiple-persons"]), counters);
        assert_eq!(
            evaluation.action,
            Action::Terminate(ReservedLabel::MultiplePersons)
        );
        assert_eq!(evaluation.counters.no_face, 3);
    }

    #[test]
    fn clean_frames_do_not_reset_counters() {
        let mut counters = EscalationCounters::default();
        let sequence: [&[&str]; 5] = [&["no-face"], &[], &["no-face"], &[], &["no-face"]];
        let mut last = Action::Continue;

        for labels in sequence {
            let evaluation = evaluate(&frame(labels), counters);
            counters = evaluation.counters;
            last = evaluation.action;
        }

        assert_eq!(counters.no_face, 3);
        assert_eq!(last, Action::Terminate(ReservedLabel::NoFace));
    }

    #[test]
    fn counts_past_threshold_still_terminate() {
        let counters = EscalationCounters {
            multiple_persons: 0,
            no_face: 7,
        };
        let evaluation = evaluate(&frame(&["no-face"]), counters);
        assert_eq!(evaluation.action, Action::Terminate(ReservedLabel::NoFace));
    }

    #[test]
    fn absent_label_above_threshold_does_not_fire() {
        let counters = EscalationCounters {
            multiple_persons: 5,
            no_face: 0,
        };
        let evaluation = evaluate(&frame(&["phone"]), counters);
        assert_eq!(evaluation.action, Action::Continue);
        assert_eq!(evaluation.counters, counters);
    }

    #[test]
    fn ad_hoc_labels_never_escalate() {
        let mut counters = EscalationCounters::default();
        for _ in 0..10 {
            let evaluation = evaluate(&frame(&["Phone detected", "looking away"]), counters);
            assert_eq!(evaluation.action, Action::Continue);
            assert_eq!(
                evaluation.ad_hoc_labels().collect::<Vec<_>>(),
                vec!["Phone detected", "looking away"]
            );
            counters = evaluation.counters;
        }
        assert_eq!(counters, EscalationCounters::default());
    }

    #[test]
    fn empty_frame_is_a_no_op() {
        let counters = EscalationCounters {
            multiple_persons: 1,
            no_face: 2,
        };
        let evaluation = evaluate(&[], counters);
        assert_eq!(evaluation.action, Action::Continue);
        assert_eq!(evaluation.counters, counters);
        assert!(evaluation.warnings.is_empty());
    }

    #[test]
    fn reserved_warning_shows_progress() {
        let warning = Warning::Reserved {
            label: ReservedLabel::NoFace,
            count: 2,
        };
        assert_eq!(warning.to_string(), "no-face (2/3)");
    }
}
