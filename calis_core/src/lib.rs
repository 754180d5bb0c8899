#![forbid(unsafe_code)]

//! Core domain model and business logic for the Calis exercise tracker.
//!
//! This crate provides:
//! - Domain types (exercises and their progression state)
//! - The built-in exercise catalog
//! - Progression and daily reset policies
//! - Persistence (locked, atomic JSON store and wake-up registry)
//! - The reset scheduler (recurring check plus deferred wake-ups)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod progression;
pub mod reset;
pub mod persistence;
pub mod store;
pub mod notify;
pub mod wakeup;
pub mod scheduler;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::default_exercises;
pub use config::{Config, ResetConfig};
pub use progression::advance;
pub use reset::{apply_reset_policy, ResetPolicy};
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway, UpdateOutcome};
pub use store::ExerciseStore;
pub use notify::{LogNotifier, Notifier};
pub use wakeup::{DeferredExecution, FileWakeRegistry};
pub use scheduler::{ResetScheduler, RESET_TASK_IDENTIFIER};
