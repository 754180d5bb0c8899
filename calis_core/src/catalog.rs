//! Default catalog of exercises.
//!
//! This module provides the six built-in exercises created at first launch
//! and whenever progression is reset.

use crate::types::Exercise;

/// Built-in definition: name, starting target, increment, max, time-based
struct Template {
    name: &'static str,
    target: u32,
    increment: u32,
    max_target: u32,
    is_time_based: bool,
}

const DEFAULT_TEMPLATES: [Template; 6] = [
    Template { name: "Push-ups", target: 80, increment: 5, max_target: 100, is_time_based: false },
    Template { name: "Pull-ups", target: 40, increment: 2, max_target: 50, is_time_based: false },
    // Timed holds are in seconds
    Template { name: "Crow", target: 120, increment: 0, max_target: 120, is_time_based: true },
    Template { name: "Handstand", target: 120, increment: 0, max_target: 120, is_time_based: true },
    Template { name: "Lever Pulls", target: 20, increment: 0, max_target: 20, is_time_based: false },
    Template { name: "Front Lever", target: 120, increment: 0, max_target: 120, is_time_based: true },
];

/// Builds the default exercise collection, in display order
///
/// Every call produces fresh identifiers and untouched progression.
pub fn default_exercises() -> Vec<Exercise> {
    DEFAULT_TEMPLATES
        .iter()
        .map(|t| Exercise::new(t.name, t.target, t.increment, t.max_target, t.is_time_based))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_order_and_values() {
        let exercises = default_exercises();
        let names: Vec<&str> = exercises.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["Push-ups", "Pull-ups", "Crow", "Handstand", "Lever Pulls", "Front Lever"]
        );

        let pushups = &exercises[0];
        assert_eq!(pushups.current_target, 80);
        assert_eq!(pushups.increment, 5);
        assert_eq!(pushups.max_target, 100);
        assert!(!pushups.is_time_based);

        let crow = &exercises[2];
        assert!(crow.is_time_based);
        assert_eq!(crow.increment, 0);
    }

    #[test]
    fn test_defaults_start_fresh() {
        for e in default_exercises() {
            assert!(!e.is_completed);
            assert!(e.last_completed_date.is_none());
            assert!(e.current_target <= e.max_target);
        }
    }

    #[test]
    fn test_each_call_assigns_new_ids() {
        let first: HashSet<_> = default_exercises().iter().map(|e| e.id).collect();
        let second: HashSet<_> = default_exercises().iter().map(|e| e.id).collect();
        assert_eq!(first.len(), 6);
        assert!(first.is_disjoint(&second));
    }
}
