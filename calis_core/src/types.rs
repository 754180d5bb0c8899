//! Core domain types for the Calis exercise tracker.
//!
//! An [`Exercise`] pairs an immutable identity (id, name, unit flag) with
//! mutable progression and completion state. The collection handed around
//! the crate is a plain ordered `Vec<Exercise>`; its order is the display
//! order and survives persistence round-trips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Opaque exercise identifier, assigned once at creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExerciseId(Uuid);

impl ExerciseId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExerciseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Exercise
// ============================================================================

/// A tracked exercise with its progression and completion state
///
/// `current_target` is a repetition count, or a duration in seconds when
/// `is_time_based` is set. It never leaves `[initial_target, max_target]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredExercise")]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
    pub current_target: u32,
    /// Target the exercise was created with; lower bound of progression
    pub initial_target: u32,
    /// Added to `current_target` on each completion (0 = fixed exercise)
    pub increment: u32,
    pub max_target: u32,
    pub is_time_based: bool,
    #[serde(default)]
    pub is_completed: bool,
    /// Most recent completion. Left in place when a reset clears `is_completed`.
    #[serde(default)]
    pub last_completed_date: Option<DateTime<Utc>>,
}

impl Exercise {
    /// Create a new, not yet completed exercise
    ///
    /// `max_target` is raised to `current_target` if given lower, so a fixed
    /// exercise can be declared with `increment == 0` and any ceiling.
    pub fn new(
        name: impl Into<String>,
        current_target: u32,
        increment: u32,
        max_target: u32,
        is_time_based: bool,
    ) -> Self {
        Self {
            id: ExerciseId::new(),
            name: name.into(),
            current_target,
            initial_target: current_target,
            increment,
            max_target: max_target.max(current_target),
            is_time_based,
            is_completed: false,
            last_completed_date: None,
        }
    }

    /// Whether this exercise grows on completion
    pub fn progresses(&self) -> bool {
        self.increment > 0
    }

    /// Mark completed and record when
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.is_completed = true;
        self.last_completed_date = Some(at);
    }

    /// Clear the completion flag; target and timestamp are kept
    pub fn reset_completion_status(&mut self) {
        self.is_completed = false;
    }

    /// Target formatted for display: `m:ss` for timed exercises, the count otherwise
    pub fn target_display(&self) -> String {
        if self.is_time_based {
            format!("{}:{:02}", self.current_target / 60, self.current_target % 60)
        } else {
            self.current_target.to_string()
        }
    }

    /// Unit label matching [`Exercise::target_display`]
    pub fn units(&self) -> &'static str {
        if self.is_time_based {
            "minutes"
        } else {
            "reps"
        }
    }

    /// Restore `initial_target <= current_target <= max_target` on decoded data
    pub(crate) fn normalize(&mut self) {
        if self.initial_target > self.current_target {
            tracing::warn!(
                "{}: initial target {} above current {}, lowered",
                self.name,
                self.initial_target,
                self.current_target
            );
            self.initial_target = self.current_target;
        }
        if self.max_target < self.current_target {
            tracing::warn!(
                "{}: max target {} below current {}, raised",
                self.name,
                self.max_target,
                self.current_target
            );
            self.max_target = self.current_target;
        }
    }
}

/// On-disk shape of an [`Exercise`]
///
/// Blobs written before `initial_target` was tracked lack the field; those
/// start progression from the stored `current_target`.
#[derive(Deserialize)]
struct StoredExercise {
    id: ExerciseId,
    name: String,
    current_target: u32,
    #[serde(default)]
    initial_target: Option<u32>,
    increment: u32,
    max_target: u32,
    is_time_based: bool,
    #[serde(default)]
    is_completed: bool,
    #[serde(default)]
    last_completed_date: Option<DateTime<Utc>>,
}

impl From<StoredExercise> for Exercise {
    fn from(stored: StoredExercise) -> Self {
        Self {
            id: stored.id,
            name: stored.name,
            current_target: stored.current_target,
            initial_target: stored.initial_target.unwrap_or(stored.current_target),
            increment: stored.increment,
            max_target: stored.max_target,
            is_time_based: stored.is_time_based,
            is_completed: stored.is_completed,
            last_completed_date: stored.last_completed_date,
        }
    }
}

/// Number of completed exercises in a collection
pub fn completed_count(exercises: &[Exercise]) -> usize {
    exercises.iter().filter(|e| e.is_completed).count()
}

/// Fraction of completed exercises, `0.0` for an empty collection
pub fn completion_percentage(exercises: &[Exercise]) -> f64 {
    if exercises.is_empty() {
        return 0.0;
    }
    completed_count(exercises) as f64 / exercises.len() as f64
}
