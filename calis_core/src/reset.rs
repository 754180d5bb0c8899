//! Daily reset policy.
//!
//! A completed exercise is cleared once the calendar day that contains its
//! last completion lies strictly before the calendar day of "now". Days are
//! bucketed at midnight in the timezone of the supplied `now`; the trigger
//! hour only decides when the recurring check bothers to look and where the
//! next deferred wake-up lands.
//!
//! The decision depends on wall-clock day difference alone, never on whether
//! a reset already ran, so checks may be repeated, delayed or skipped without
//! double-applying or losing a boundary.

use crate::{Error, Exercise, Result};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// Default local hour for the daily reset check
pub const DEFAULT_TRIGGER_HOUR: u32 = 4;

/// Decides when completion flags roll back to "not done"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetPolicy {
    trigger_hour: u32,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            trigger_hour: DEFAULT_TRIGGER_HOUR,
        }
    }
}

impl ResetPolicy {
    /// Create a policy checking at `trigger_hour` (0..=23, local time)
    pub fn new(trigger_hour: u32) -> Result<Self> {
        if trigger_hour > 23 {
            return Err(Error::Config(format!(
                "trigger_hour must be within 0..=23, got {}",
                trigger_hour
            )));
        }
        Ok(Self { trigger_hour })
    }

    pub fn trigger_hour(&self) -> u32 {
        self.trigger_hour
    }

    /// Whether a completion recorded at `last_completed` must be cleared at `now`
    pub fn should_reset<Tz: TimeZone>(
        &self,
        is_completed: bool,
        last_completed: Option<DateTime<Utc>>,
        now: &DateTime<Tz>,
    ) -> bool {
        if !is_completed {
            return false;
        }
        match last_completed {
            Some(completed_at) => {
                completed_at.with_timezone(&now.timezone()).date_naive() < now.date_naive()
            }
            None => false,
        }
    }

    /// Whether `now` falls inside the hour the recurring check acts on
    pub fn is_check_hour<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        now.hour() == self.trigger_hour
    }

    /// Next instant strictly after `now` at `trigger_hour:00:00` local time
    pub fn next_trigger_instant<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let today = now.date_naive();

        let candidate = self.trigger_on(&tz, today);
        if candidate > *now {
            return candidate;
        }

        match today.succ_opt() {
            Some(tomorrow) => self.trigger_on(&tz, tomorrow),
            None => now.clone() + Duration::days(1),
        }
    }

    /// Trigger instant on a given local date
    ///
    /// Ambiguous local times (clocks going back) take the earlier mapping.
    /// A trigger inside a DST gap moves to the first whole hour after it.
    fn trigger_on<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
        let time = NaiveTime::from_hms_opt(self.trigger_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let local = date.and_time(time);

        match tz.from_local_datetime(&local) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => (1..=3)
                .find_map(|h| tz.from_local_datetime(&(local + Duration::hours(h))).earliest())
                .unwrap_or_else(|| tz.from_utc_datetime(&local)),
        }
    }
}

/// Clear completion on every exercise the policy says is stale
///
/// Returns how many exercises changed. Applying it twice with the same `now`
/// has the same effect as applying it once.
pub fn apply_reset_policy<Tz: TimeZone>(
    exercises: &mut [Exercise],
    policy: &ResetPolicy,
    now: &DateTime<Tz>,
) -> usize {
    let mut changed = 0;
    for exercise in exercises.iter_mut() {
        if policy.should_reset(exercise.is_completed, exercise.last_completed_date, now) {
            exercise.reset_completion_status();
            changed += 1;
        }
    }
    changed
}
