//! Daily reset scheduler.
//!
//! Two independent triggers feed the same reset pass:
//! - a recurring check on a background thread while the process runs, which
//!   acts only during the trigger hour;
//! - a deferred wake-up registered with the host, delivered at or after the
//!   next trigger instant even if this process was not running.
//!
//! The pass never touches the interactive [`crate::ExerciseStore`]. It loads
//! a fresh snapshot through the gateway's critical section, applies the reset
//! policy and writes back only if something changed. Because the policy is
//! boundary based, redundant or late passes are harmless.
//!
//! One scheduler is meant to exist per process. The host builds it at start
//! and hands out references; the deferred registration it manages is a
//! host-wide resource keyed by [`RESET_TASK_IDENTIFIER`], so a second
//! instance would fight over it.

use crate::notify::{RESET_NOTIFICATION_BODY, RESET_NOTIFICATION_TITLE};
use crate::{
    apply_reset_policy, DeferredExecution, Notifier, PersistenceGateway, ResetConfig, ResetPolicy,
    Result, UpdateOutcome,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Identifier of the daily reset registration with the host facility
pub const RESET_TASK_IDENTIFIER: &str = "calis.daily_reset";

/// The reset pass shared by both triggers
#[derive(Clone)]
struct ResetPass {
    gateway: Arc<dyn PersistenceGateway>,
    notifier: Arc<dyn Notifier>,
    policy: ResetPolicy,
    notify: bool,
}

impl ResetPass {
    fn check<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<usize> {
        if !self.policy.is_check_hour(now) {
            return None;
        }
        Some(self.run(now))
    }

    fn run<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> usize {
        let outcome = self
            .gateway
            .update(&mut |exercises| apply_reset_policy(exercises, &self.policy, now));

        match outcome {
            Ok(UpdateOutcome::Saved(changed)) => {
                tracing::info!("Daily reset cleared {} exercises", changed);
                if self.notify {
                    self.notifier
                        .notify(RESET_NOTIFICATION_TITLE, RESET_NOTIFICATION_BODY);
                }
                changed
            }
            Ok(UpdateOutcome::Unchanged) => {
                tracing::debug!("Daily reset: nothing to clear");
                0
            }
            Ok(UpdateOutcome::Absent) => {
                tracing::debug!("Daily reset: no saved exercises");
                0
            }
            Err(e) => {
                tracing::warn!("Daily reset pass failed: {}", e);
                0
            }
        }
    }
}

struct RecurringCheck {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Drives the daily reset while running and across process dormancy
pub struct ResetScheduler {
    pass: ResetPass,
    deferred: Arc<dyn DeferredExecution>,
    check_interval: Duration,
    timer: Mutex<Option<RecurringCheck>>,
}

impl ResetScheduler {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        deferred: Arc<dyn DeferredExecution>,
        notifier: Arc<dyn Notifier>,
        config: &ResetConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pass: ResetPass {
                gateway,
                notifier,
                policy: config.policy()?,
                notify: config.notify,
            },
            deferred,
            check_interval: config.check_interval(),
            timer: Mutex::new(None),
        })
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.pass.policy
    }

    /// Register the next wake-up, check once, then start the recurring check
    ///
    /// Calling it again while the recurring check runs only re-registers.
    pub fn start(&self) {
        let now = Local::now();
        self.schedule_deferred_reset(&now);

        let Ok(mut timer) = self.timer.lock() else {
            tracing::error!("Reset timer state poisoned; recurring check not started");
            return;
        };
        if timer.is_some() {
            return;
        }

        self.pass.check(&now);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let pass = self.pass.clone();
        let interval = self.check_interval;
        let spawned = std::thread::Builder::new()
            .name("calis-reset-check".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        pass.check(&Local::now());
                    }
                    // Stop requested or scheduler dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                tracing::info!(
                    "Recurring reset check started (every {}s at hour {})",
                    interval.as_secs(),
                    self.pass.policy.trigger_hour()
                );
                *timer = Some(RecurringCheck { stop_tx, handle });
            }
            Err(e) => tracing::error!("Failed to start recurring reset check: {}", e),
        }
    }

    /// Whether the recurring check is running
    pub fn is_running(&self) -> bool {
        self.timer.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Next trigger instant after `now`
    pub fn next_trigger_instant<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        self.pass.policy.next_trigger_instant(now)
    }

    /// Ask the host to wake us at the next trigger instant
    ///
    /// A failed registration is logged; the recurring check remains as the
    /// fallback. Returns the registered instant on success.
    pub fn schedule_deferred_reset<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
        let next = self.next_trigger_instant(now).with_timezone(&Utc);
        match self.deferred.register(RESET_TASK_IDENTIFIER, next) {
            Ok(()) => {
                tracing::info!("Scheduled deferred reset for {}", next);
                Some(next)
            }
            Err(e) => {
                tracing::warn!("Could not schedule deferred reset: {}", e);
                None
            }
        }
    }

    /// Handle a delivered deferred wake-up
    ///
    /// The next wake-up is registered before any work, so a failing pass
    /// never stops future ones. Returns how many exercises were reset.
    pub fn handle_wake_up<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> usize {
        self.schedule_deferred_reset(now);
        self.perform_daily_reset(now)
    }

    /// Recurring-check body: run the pass only during the trigger hour
    pub fn check_for_reset<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<usize> {
        self.pass.check(now)
    }

    /// Load, apply the reset policy, persist and notify if anything changed
    pub fn perform_daily_reset<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> usize {
        self.pass.run(now)
    }

    /// Clear every completion flag in the persisted collection
    ///
    /// Bypasses the reset policy; meant for operators and diagnostics.
    pub fn manual_reset(&self) -> usize {
        let outcome = self.pass.gateway.update(&mut |exercises| {
            let mut changed = 0;
            for exercise in exercises.iter_mut().filter(|e| e.is_completed) {
                exercise.reset_completion_status();
                changed += 1;
            }
            changed
        });

        match outcome {
            Ok(UpdateOutcome::Saved(changed)) => {
                tracing::info!("Manual reset cleared {} exercises", changed);
                changed
            }
            Ok(_) => 0,
            Err(e) => {
                tracing::warn!("Manual reset failed: {}", e);
                0
            }
        }
    }

    /// Stop the recurring check
    ///
    /// Deferred registrations belong to the host and stay in place.
    pub fn shutdown(&self) {
        let running = match self.timer.lock() {
            Ok(mut timer) => timer.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(RecurringCheck { stop_tx, handle }) = running {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                tracing::warn!("Recurring reset check panicked");
            }
            tracing::info!("Recurring reset check stopped");
        }
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{default_exercises, Error, Exercise, MemoryGateway};
    use chrono::{Duration as ChronoDuration, FixedOffset};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.sent.lock().unwrap().push((title.into(), body.into()));
        }
    }

    #[derive(Default)]
    struct RecordingDeferred {
        registered: Mutex<Vec<(String, DateTime<Utc>)>>,
        fail: AtomicBool,
    }

    impl DeferredExecution for RecordingDeferred {
        fn register(&self, identifier: &str, earliest: DateTime<Utc>) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Scheduler("registration refused".into()));
            }
            self.registered
                .lock()
                .unwrap()
                .push((identifier.to_string(), earliest));
            Ok(())
        }
    }

    struct Harness {
        gateway: Arc<MemoryGateway>,
        deferred: Arc<RecordingDeferred>,
        notifier: Arc<RecordingNotifier>,
        scheduler: ResetScheduler,
    }

    fn harness_with(config: ResetConfig) -> Harness {
        let gateway = Arc::new(MemoryGateway::new());
        let deferred = Arc::new(RecordingDeferred::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler =
            ResetScheduler::new(gateway.clone(), deferred.clone(), notifier.clone(), &config)
                .unwrap();
        Harness {
            gateway,
            deferred,
            notifier,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(ResetConfig::default())
    }

    fn local(d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 4, d, h, min, 0)
            .unwrap()
    }

    fn saved_with_completion(gateway: &MemoryGateway, at: DateTime<FixedOffset>) {
        let mut exercises = default_exercises();
        exercises[0].mark_completed(at.with_timezone(&Utc));
        exercises[1].mark_completed(at.with_timezone(&Utc));
        gateway.save(&exercises).unwrap();
    }

    fn saved(gateway: &MemoryGateway) -> Vec<Exercise> {
        gateway.load().unwrap().unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let gateway = Arc::new(MemoryGateway::new());
        let config = ResetConfig {
            trigger_hour: 30,
            ..ResetConfig::default()
        };
        let result = ResetScheduler::new(
            gateway,
            Arc::new(RecordingDeferred::default()),
            Arc::new(RecordingNotifier::default()),
            &config,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_daily_reset_clears_and_notifies() {
        let h = harness();
        saved_with_completion(&h.gateway, local(24, 21, 0));

        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 0)), 2);
        assert!(saved(&h.gateway).iter().all(|e| !e.is_completed));
        assert_eq!(h.notifier.count(), 1);
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent[0].0, RESET_NOTIFICATION_TITLE);
        assert_eq!(sent[0].1, RESET_NOTIFICATION_BODY);
    }

    #[test]
    fn test_redundant_pass_is_silent() {
        let h = harness();
        saved_with_completion(&h.gateway, local(24, 21, 0));
        let now = local(25, 4, 0);

        h.scheduler.perform_daily_reset(&now);
        let after_first = saved(&h.gateway);
        let saves = h.gateway.save_count();

        assert_eq!(h.scheduler.perform_daily_reset(&now), 0);
        assert_eq!(saved(&h.gateway), after_first);
        assert_eq!(h.gateway.save_count(), saves);
        assert_eq!(h.notifier.count(), 1);
    }

    #[test]
    fn test_same_day_completion_is_kept() {
        let h = harness();
        saved_with_completion(&h.gateway, local(25, 3, 0));

        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 30)), 0);
        assert!(saved(&h.gateway)[0].is_completed);
        assert_eq!(h.notifier.count(), 0);
    }

    #[test]
    fn test_absent_data_is_noop() {
        let h = harness();
        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 0)), 0);
        assert!(!h.gateway.has_saved_data());
        assert_eq!(h.notifier.count(), 0);
    }

    #[test]
    fn test_corrupt_data_is_left_alone() {
        let gateway = Arc::new(MemoryGateway::with_blob("garbage"));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ResetScheduler::new(
            gateway.clone(),
            Arc::new(RecordingDeferred::default()),
            notifier.clone(),
            &ResetConfig::default(),
        )
        .unwrap();

        assert_eq!(scheduler.perform_daily_reset(&local(25, 4, 0)), 0);
        assert_eq!(gateway.blob().as_deref(), Some("garbage"));
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let h = harness();
        saved_with_completion(&h.gateway, local(24, 21, 0));
        h.gateway.set_fail_saves(true);

        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 0)), 0);
        assert_eq!(h.notifier.count(), 0);

        // Next pass after storage recovers still applies the reset
        h.gateway.set_fail_saves(false);
        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 1)), 2);
    }

    #[test]
    fn test_notifications_can_be_disabled() {
        let h = harness_with(ResetConfig {
            notify: false,
            ..ResetConfig::default()
        });
        saved_with_completion(&h.gateway, local(24, 21, 0));

        assert_eq!(h.scheduler.perform_daily_reset(&local(25, 4, 0)), 2);
        assert_eq!(h.notifier.count(), 0);
    }

    #[test]
    fn test_check_only_acts_in_trigger_hour() {
        let h = harness();
        saved_with_completion(&h.gateway, local(24, 21, 0));

        assert_eq!(h.scheduler.check_for_reset(&local(25, 3, 59)), None);
        assert!(saved(&h.gateway)[0].is_completed);

        assert_eq!(h.scheduler.check_for_reset(&local(25, 4, 0)), Some(2));
        assert!(!saved(&h.gateway)[0].is_completed);
    }

    #[test]
    fn test_wake_up_reregisters_before_work() {
        let h = harness();
        saved_with_completion(&h.gateway, local(24, 21, 0));
        let now = local(25, 4, 2);

        assert_eq!(h.scheduler.handle_wake_up(&now), 2);

        let registered = h.deferred.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, RESET_TASK_IDENTIFIER);
        assert_eq!(registered[0].1, local(26, 4, 0).with_timezone(&Utc));
    }

    #[test]
    fn test_wake_up_reregisters_even_when_pass_fails() {
        let gateway = Arc::new(MemoryGateway::with_blob("garbage"));
        let deferred = Arc::new(RecordingDeferred::default());
        let scheduler = ResetScheduler::new(
            gateway,
            deferred.clone(),
            Arc::new(RecordingNotifier::default()),
            &ResetConfig::default(),
        )
        .unwrap();

        assert_eq!(scheduler.handle_wake_up(&local(25, 4, 0)), 0);
        assert_eq!(deferred.registered.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_late_wake_up_after_many_days() {
        let h = harness();
        saved_with_completion(&h.gateway, local(10, 8, 0));

        // Delivered a week late, mid-afternoon
        assert_eq!(h.scheduler.handle_wake_up(&local(17, 15, 0)), 2);
        let registered = h.deferred.registered.lock().unwrap();
        assert_eq!(registered[0].1, local(18, 4, 0).with_timezone(&Utc));
    }

    #[test]
    fn test_registration_failure_is_tolerated() {
        let h = harness();
        h.deferred.fail.store(true, Ordering::SeqCst);
        saved_with_completion(&h.gateway, local(24, 21, 0));

        assert_eq!(h.scheduler.schedule_deferred_reset(&local(25, 1, 0)), None);
        assert_eq!(h.scheduler.handle_wake_up(&local(25, 4, 0)), 2);
    }

    #[test]
    fn test_schedule_points_at_next_boundary() {
        let h = harness();
        let before = h.scheduler.schedule_deferred_reset(&local(25, 3, 59));
        let after = h.scheduler.schedule_deferred_reset(&local(25, 4, 1));

        assert_eq!(before, Some(local(25, 4, 0).with_timezone(&Utc)));
        assert_eq!(after, Some(local(26, 4, 0).with_timezone(&Utc)));
    }

    #[test]
    fn test_manual_reset_bypasses_policy() {
        let h = harness();
        saved_with_completion(&h.gateway, Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()));

        assert_eq!(h.scheduler.manual_reset(), 2);
        let exercises = saved(&h.gateway);
        assert!(exercises.iter().all(|e| !e.is_completed));
        // Progress and history stay
        assert!(exercises[0].last_completed_date.is_some());
        assert_eq!(h.notifier.count(), 0);
    }

    #[test]
    fn test_start_and_shutdown() {
        let h = harness_with(ResetConfig {
            check_interval_secs: 1,
            ..ResetConfig::default()
        });

        h.scheduler.start();
        assert!(h.scheduler.is_running());
        // Second start only re-registers
        h.scheduler.start();
        assert!(h.scheduler.is_running());
        assert_eq!(h.deferred.registered.lock().unwrap().len(), 2);

        h.scheduler.shutdown();
        assert!(!h.scheduler.is_running());
        // Registrations survive shutdown
        assert_eq!(h.deferred.registered.lock().unwrap().len(), 2);

        let next = h.deferred.registered.lock().unwrap()[0].1;
        assert!(next > Utc::now());
        assert!(next - Utc::now() <= ChronoDuration::days(1));
    }
}
