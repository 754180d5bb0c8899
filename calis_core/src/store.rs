//! In-memory exercise collection mirrored to persistent storage.
//!
//! The store keeps a working copy for display. Every mutation runs inside
//! the gateway's `update` critical section against the freshly loaded
//! collection, addressing exercises by id, and the working copy is then
//! replaced by the result. A scheduler pass or a second store writing in
//! between is therefore never overwritten.
//!
//! Storage problems never surface as errors here: an unreadable blob falls
//! back to the default exercises, and a failed save is logged and retried
//! by the next mutation, which writes the working copy whole. Both are
//! exposed passively through [`ExerciseStore::warnings`] and
//! [`ExerciseStore::persistence_healthy`].

use crate::{
    advance, apply_reset_policy, completed_count, completion_percentage, default_exercises,
    Exercise, ExerciseId, PersistenceGateway, ResetPolicy, UpdateOutcome,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

pub struct ExerciseStore {
    exercises: Vec<Exercise>,
    gateway: Arc<dyn PersistenceGateway>,
    policy: ResetPolicy,
    warnings: Vec<String>,
    persistence_healthy: bool,
}

impl ExerciseStore {
    /// Load the persisted collection, or start from the defaults
    pub fn open(gateway: Arc<dyn PersistenceGateway>, policy: ResetPolicy) -> Self {
        let mut warnings = Vec::new();
        let exercises = match gateway.load() {
            Ok(Some(exercises)) => exercises,
            Ok(None) => {
                tracing::info!("No saved exercises found, using defaults");
                default_exercises()
            }
            Err(e) => {
                tracing::warn!("Failed to load saved exercises: {}. Using defaults.", e);
                warnings.push(format!("Saved exercises could not be read ({}); defaults used.", e));
                default_exercises()
            }
        };

        Self {
            exercises,
            gateway,
            policy,
            warnings,
            persistence_healthy: true,
        }
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn get(&self, index: usize) -> Option<&Exercise> {
        self.exercises.get(index)
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    pub fn completed_count(&self) -> usize {
        completed_count(&self.exercises)
    }

    pub fn completion_percentage(&self) -> f64 {
        completion_percentage(&self.exercises)
    }

    /// Problems met while loading, for display by the interactive surface
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// False while the most recent save failed
    pub fn persistence_healthy(&self) -> bool {
        self.persistence_healthy
    }

    /// Mark an exercise completed now and progress its target
    ///
    /// Out-of-range indices are ignored.
    pub fn complete_exercise(&mut self, index: usize) {
        self.complete_exercise_at(index, Utc::now());
    }

    /// Mark an exercise completed at `now` and progress its target
    pub fn complete_exercise_at(&mut self, index: usize, now: DateTime<Utc>) {
        let Some(id) = self.id_at(index) else {
            return;
        };
        self.commit(|exercises| with_exercise(exercises, id, |exercise| complete(exercise, now)));
    }

    /// Clear the completion flag only (a manual correction)
    ///
    /// Target and last completion date are left alone.
    pub fn uncomplete_exercise(&mut self, index: usize) {
        let Some(id) = self.id_at(index) else {
            return;
        };
        self.commit(|exercises| with_exercise(exercises, id, uncomplete));
    }

    /// Complete if not done, uncomplete otherwise
    ///
    /// The choice follows the stored state, not the working copy.
    pub fn toggle_exercise(&mut self, index: usize) {
        let Some(id) = self.id_at(index) else {
            return;
        };
        let now = Utc::now();
        self.commit(|exercises| {
            with_exercise(exercises, id, |exercise| {
                if exercise.is_completed {
                    uncomplete(exercise)
                } else {
                    complete(exercise, now)
                }
            })
        });
    }

    /// Apply the reset policy to every exercise
    ///
    /// Persists only when at least one exercise changed. Returns the number
    /// of exercises reset.
    pub fn reset_exercises_if_needed<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> usize {
        let policy = self.policy;
        let changed = self.commit(|exercises| apply_reset_policy(exercises, &policy, now));
        if changed > 0 {
            tracing::info!("Reset {} exercises completed on an earlier day", changed);
        }
        changed
    }

    /// Clear every completion flag regardless of the policy
    pub fn reset_all_exercises(&mut self) {
        let cleared = self.commit(|exercises| {
            let mut cleared = 0;
            for exercise in exercises.iter_mut().filter(|e| e.is_completed) {
                exercise.reset_completion_status();
                cleared += 1;
            }
            cleared
        });
        tracing::info!("Reset all exercises ({} were completed)", cleared);
    }

    /// Replace the collection with fresh defaults, discarding all progress
    pub fn reset_progression(&mut self) {
        self.commit(|exercises| {
            *exercises = default_exercises();
            exercises.len()
        });
        tracing::info!("Reset progression to defaults");
    }

    /// Replace the exercise with the same id; unknown ids are ignored
    ///
    /// Returns whether an exercise was replaced.
    pub fn update_exercise(&mut self, exercise: Exercise) -> bool {
        let id = exercise.id;
        self.commit(|exercises| {
            with_exercise(exercises, id, |slot| {
                *slot = exercise.clone();
            })
        }) > 0
    }

    /// Remove the persisted collection; the in-memory state is untouched
    pub fn clear_saved_data(&mut self) {
        if let Err(e) = self.gateway.clear() {
            tracing::warn!("Failed to clear saved exercises: {}", e);
        }
    }

    fn id_at(&self, index: usize) -> Option<ExerciseId> {
        self.exercises.get(index).map(|e| e.id)
    }

    /// Run `change` against the stored collection and adopt the result
    ///
    /// Falls back to changing and saving the working copy when nothing is
    /// stored, when the stored blob is unreadable, or while the previous
    /// save failed. Returns how many exercises `change` reported changed.
    fn commit(&mut self, mut change: impl FnMut(&mut Vec<Exercise>) -> usize) -> usize {
        if !self.persistence_healthy {
            return self.commit_working_copy(change);
        }

        let mut merged: Option<(Vec<Exercise>, usize)> = None;
        let outcome = self.gateway.update(&mut |exercises| {
            let changed = change(exercises);
            merged = Some((exercises.clone(), changed));
            changed
        });

        match (outcome, merged) {
            (Ok(UpdateOutcome::Absent), _) => self.commit_working_copy(change),
            (Ok(_), Some((exercises, changed))) => {
                self.exercises = exercises;
                changed
            }
            (Ok(_), None) => 0,
            (Err(e), Some((exercises, changed))) => {
                tracing::warn!("Failed to save exercises: {}", e);
                self.exercises = exercises;
                self.persistence_healthy = false;
                changed
            }
            (Err(e), None) => {
                tracing::warn!("Saved exercises unreadable ({}); saving working copy", e);
                self.commit_working_copy(change)
            }
        }
    }

    fn commit_working_copy(&mut self, mut change: impl FnMut(&mut Vec<Exercise>) -> usize) -> usize {
        let changed = change(&mut self.exercises);
        if changed > 0 {
            self.persist();
        }
        changed
    }

    fn persist(&mut self) {
        match self.gateway.save(&self.exercises) {
            Ok(()) => self.persistence_healthy = true,
            Err(e) => {
                tracing::warn!("Failed to save exercises: {}", e);
                self.persistence_healthy = false;
            }
        }
    }
}

/// Apply `f` to the exercise with `id`; 1 if found, 0 otherwise
fn with_exercise(exercises: &mut [Exercise], id: ExerciseId, f: impl FnOnce(&mut Exercise)) -> usize {
    match exercises.iter_mut().find(|e| e.id == id) {
        Some(exercise) => {
            f(exercise);
            1
        }
        None => {
            tracing::debug!("Exercise {} no longer stored; change skipped", id);
            0
        }
    }
}

fn complete(exercise: &mut Exercise, now: DateTime<Utc>) {
    exercise.mark_completed(now);
    *exercise = advance(exercise);
    tracing::info!(
        "Completed {}; next target {}",
        exercise.name,
        exercise.target_display()
    );
}

fn uncomplete(exercise: &mut Exercise) {
    exercise.reset_completion_status();
    tracing::info!("Uncompleted {}", exercise.name);
}
