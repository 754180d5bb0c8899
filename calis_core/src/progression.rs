//! Progression logic for increasing exercise targets.
//!
//! Each completion adds the exercise's increment to its target, capped at
//! the exercise's maximum. Fixed exercises (increment 0) never change.

use crate::Exercise;

/// Compute the exercise after one completion's worth of progression
///
/// Pure: the input is left untouched and the result is a copy.
pub fn advance(exercise: &Exercise) -> Exercise {
    let mut next = exercise.clone();
    if !exercise.progresses() {
        return next;
    }

    next.current_target = exercise
        .current_target
        .saturating_add(exercise.increment)
        .min(exercise.max_target);

    if next.current_target != exercise.current_target {
        tracing::debug!(
            "{} progression: {} -> {}",
            exercise.name,
            exercise.current_target,
            next.current_target
        );
    }
    next
}
