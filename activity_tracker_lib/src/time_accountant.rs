use chrono::{DateTime, TimeDelta, Utc};

/// Active time between `started_at` and `now`, not counting paused time.
///
/// While paused (`pause_started_at` is set) the result is the value at the
/// pause instant, no matter how far `now` has moved on. Never negative.
pub fn elapsed_active(
    now: DateTime<Utc>,
    started_at: DateTime<Utc>,
    paused_total: TimeDelta,
    pause_started_at: Option<DateTime<Utc>>,
) -> TimeDelta {
    let until = pause_started_at.unwrap_or(now);
    (until - started_at - paused_total).max(TimeDelta::zero())
}

/// Stateful wrapper around [`elapsed_active`] owned by a session.
///
/// Remembers the largest value it has handed out, so a wall clock that
/// steps backwards cannot make elapsed time shrink.
#[derive(Debug, Clone)]
pub struct TimeAccountant {
    started_at: DateTime<Utc>,
    paused_total: TimeDelta,
    pause_started_at: Option<DateTime<Utc>>,
    high_water: TimeDelta,
}

impl TimeAccountant {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            paused_total: TimeDelta::zero(),
            pause_started_at: None,
            high_water: TimeDelta::zero(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn paused_total(&self) -> TimeDelta {
        self.paused_total
    }

    pub fn pause_started_at(&self) -> Option<DateTime<Utc>> {
        self.pause_started_at
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    pub fn elapsed_active(&self, now: DateTime<Utc>) -> TimeDelta {
        elapsed_active(now, self.started_at, self.paused_total, self.pause_started_at).max(self.high_water)
    }

    /// Same as [`Self::elapsed_active`], but records the result as the new floor.
    pub fn advance(&mut self, now: DateTime<Utc>) -> TimeDelta {
        self.high_water = self.elapsed_active(now);
        self.high_water
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.advance(now);
        self.pause_started_at = Some(now);
    }

    /// Ends the current pause and returns how long it lasted.
    pub fn resume(&mut self, now: DateTime<Utc>) -> TimeDelta {
        let Some(pause_started_at) = self.pause_started_at.take() else {
            return TimeDelta::zero();
        };

        let paused_for = (now - pause_started_at).max(TimeDelta::zero());
        self.paused_total += paused_for;
        paused_for
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn active_time_excludes_pauses() {
        assert_eq!(elapsed_active(t(25), t(0), TimeDelta::seconds(5), None), TimeDelta::seconds(20));
    }

    #[test]
    fn paused_time_is_frozen_at_pause_instant() {
        let frozen = elapsed_active(t(500), t(0), TimeDelta::seconds(5), Some(t(30)));
        assert_eq!(frozen, TimeDelta::seconds(25));
    }

    #[test]
    fn never_negative() {
        assert_eq!(elapsed_active(t(0), t(10), TimeDelta::zero(), None), TimeDelta::zero());
    }

    #[test]
    fn pause_resume_cycle() {
        let mut accountant = TimeAccountant::new(t(0));

        assert_eq!(accountant.advance(t(10)), TimeDelta::seconds(10));
        accountant.pause(t(10));
        assert!(accountant.is_paused());
        assert_eq!(accountant.elapsed_active(t(14)), TimeDelta::seconds(10));

        assert_eq!(accountant.resume(t(15)), TimeDelta::seconds(5));
        assert!(!accountant.is_paused());
        assert_eq!(accountant.elapsed_active(t(15)), TimeDelta::seconds(10));
        assert_eq!(accountant.elapsed_active(t(25)), TimeDelta::seconds(20));
        assert_eq!(accountant.paused_total(), TimeDelta::seconds(5));
    }

    #[test]
    fn resume_without_pause_changes_nothing() {
        let mut accountant = TimeAccountant::new(t(0));
        assert_eq!(accountant.resume(t(5)), TimeDelta::zero());
        assert_eq!(accountant.paused_total(), TimeDelta::zero());
    }

    #[test]
    fn clock_stepping_back_does_not_shrink_elapsed() {
        let mut accountant = TimeAccountant::new(t(0));
        accountant.advance(t(60));
        assert_eq!(accountant.elapsed_active(t(30)), TimeDelta::seconds(60));
        assert_eq!(accountant.advance(t(90)), TimeDelta::seconds(90));
    }
}
