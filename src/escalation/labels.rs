use serde::{Deserialize, Serialize};
use std::fmt;

/// Labels with a dedicated escalation policy.
///
/// Declaration order is termination precedence: when several reserved
/// labels cross the threshold on the same frame, the first one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservedLabel {
    MultiplePersons,
    NoFace,
}

impl ReservedLabel {
    pub const PRECEDENCE: [ReservedLabel; 2] = [ReservedLabel::MultiplePersons, ReservedLabel::NoFace];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedLabel::MultiplePersons => "multiple-persons",
            ReservedLabel::NoFace => "no-face",
        }
    }

    fn from_detector(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "multiple-persons" | "multiple persons" | "multiple persons detected" => {
                Some(ReservedLabel::MultiplePersons)
            }
            "no-face" | "no face" | "no face detected" => Some(ReservedLabel::NoFace),
            _ => None,
        }
    }
}

impl fmt::Display for ReservedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector label, classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViolationLabel {
    Reserved(ReservedLabel),
    Other(String),
}

impl ViolationLabel {
    /// Classifies a raw detector label. Unrecognised strings become `Other`,
    /// keeping their original spelling for the audit trail.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match ReservedLabel::from_detector(trimmed) {
            Some(reserved) => ViolationLabel::Reserved(reserved),
            None => ViolationLabel::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ViolationLabel::Reserved(reserved) => reserved.as_str(),
            ViolationLabel::Other(label) => label,
        }
    }
}

impl fmt::Display for ViolationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies one frame's detector output as a label set: blank labels are
/// dropped and repeats collapse to their first occurrence.
pub fn normalize_labels<I, S>(raw: I) -> Vec<ViolationLabel>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut labels: Vec<ViolationLabel> = Vec::new();
    for item in raw {
        if item.as_ref().trim().is_empty() {
            continue;
        }
        let label = ViolationLabel::parse(item.as_ref());
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_detector_phrases() {
        assert_eq!(
            ViolationLabel::parse("no-face"),
            ViolationLabel::Reserved(ReservedLabel::NoFace)
        );
        assert_eq!(
            ViolationLabel::parse("No face detected"),
            ViolationLabel::Reserved(ReservedLabel::NoFace)
        );
        assert_eq!(
            ViolationLabel::parse("  Multiple persons detected "),
            ViolationLabel::Reserved(ReservedLabel::MultiplePersons)
        );
    }

    #[test]
    fn plain_detector_wording_is_reserved() {
        assert_eq!(
            ViolationLabel::parse("no face"),
            ViolationLabel::Reserved(ReservedLabel::NoFace)
        );
        assert_eq!(
            ViolationLabel::parse("Multiple Persons"),
            ViolationLabel::Reserved(ReservedLabel::MultiplePersons)
        );
    }

    #[test]
    fn unknown_labels_are_ad_hoc() {
        assert_eq!(
            ViolationLabel::parse("Phone detected"),
            ViolationLabel::Other("Phone detected".into())
        );
        assert_eq!(
            ViolationLabel::parse("no_face!!"),
            ViolationLabel::Other("no_face!!".into())
        );
    }

    #[test]
    fn normalize_drops_blanks_and_duplicates() {
        let labels = normalize_labels(["no-face", "", "No face detected", "phone", "phone", "   "]);
        assert_eq!(
            labels,
            vec![
                ViolationLabel::Reserved(ReservedLabel::NoFace),
                ViolationLabel::Other("phone".into()),
            ]
        );
    }

    #[test]
    fn precedence_puts_multiple_persons_first() {
        assert!(ReservedLabel::MultiplePersons < ReservedLabel::NoFace);
        assert_eq!(ReservedLabel::PRECEDENCE[0], ReservedLabel::MultiplePersons);
    }
}
