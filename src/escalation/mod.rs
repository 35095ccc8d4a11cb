//! Turns per-frame violation labels into continue/terminate decisions.

pub mod labels;
pub mod policy;

pub use labels::{normalize_labels, ReservedLabel, ViolationLabel};
pub use policy::{evaluate, Action, EscalationCounters, Evaluation, Warning, TERMINATION_THRESHOLD};
