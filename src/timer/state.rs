use std::time::{Duration, Instant};

/// Countdown against a fixed exam duration.
///
/// The anchor is a monotonic `Instant` taken when the session starts
/// running; elapsed time is always derived from it, never accumulated.
#[derive(Debug, Clone, Copy)]
pub struct ExamTimer {
    duration: Duration,
    anchor: Option<Instant>,
}

impl ExamTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            anchor: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.anchor.is_none() {
            self.anchor = Some(now);
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_started(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.anchor
            .map(|anchor| now.saturating_duration_since(anchor))
            .unwrap_or_default()
    }

    /// `max(0, duration - elapsed)`. An unstarted timer reports the full duration.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.duration.saturating_sub(self.elapsed_at(now))
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.is_started() && self.remaining_at(now).is_zero()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Renders a remaining duration as `MM:SS`, truncating sub-second precision.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_timer_reports_full_duration() {
        let timer = ExamTimer::new(Duration::from_secs(1800));
        assert_eq!(timer.remaining(), Duration::from_secs(1800));
        assert!(!timer.is_expired());
    }

    #[test]
    fn remaining_counts_down_from_anchor() {
        let start = Instant::now();
        let mut timer = ExamTimer::new(Duration::from_secs(60));
        timer.start(start);

        let later = start + Duration::from_secs(25);
        assert_eq!(timer.remaining_at(later), Duration::from_secs(35));
        assert!(!timer.is_expired_at(later));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let start = Instant::now();
        let mut timer = ExamTimer::new(Duration::from_secs(10));
        timer.start(start);

        let past_end = start + Duration::from_secs(45);
        assert_eq!(timer.remaining_at(past_end), Duration::ZERO);
        assert!(timer.is_expired_at(past_end));
        assert!(timer.is_expired_at(start + Duration::from_secs(10)));
    }

    #[test]
    fn start_is_set_once() {
        let start = Instant::now();
        let mut timer = ExamTimer::new(Duration::from_secs(10));
        timer.start(start);
        timer.start(start + Duration::from_secs(5));

        assert_eq!(
            timer.remaining_at(start + Duration::from_secs(6)),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_remaining(Duration::from_secs(1800)), "30:00");
        assert_eq!(format_remaining(Duration::from_millis(61_999)), "01:01");
        assert_eq!(format_remaining(Duration::ZERO), "00:00");
    }
}
