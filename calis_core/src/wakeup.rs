//! Deferred wake-ups for when the process is not running.
//!
//! The core asks a host facility to wake it at or after an instant. The
//! bundled [`FileWakeRegistry`] keeps registrations in a JSON file that an
//! external timer (cron, systemd) polls through `calis wake`.

use crate::persistence::{open_lock_file, read_optional, write_atomic};
use crate::Result;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the wake-up registry inside the data directory
pub const WAKEUP_FILE_NAME: &str = "wakeups.json";

/// Host-provided deferred execution
///
/// A registration is delivered at most once, at or after `earliest`, with
/// no promise on how late. Registering the same identifier again replaces
/// the pending request.
pub trait DeferredExecution: Send + Sync {
    fn register(&self, identifier: &str, earliest: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registrations {
    #[serde(default)]
    pending: BTreeMap<String, DateTime<Utc>>,
}

/// Wake-up registrations persisted to a JSON file
pub struct FileWakeRegistry {
    path: PathBuf,
}

impl FileWakeRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Registry under [`WAKEUP_FILE_NAME`] in `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(WAKEUP_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Earliest instant registered for `identifier`, if any
    pub fn pending(&self, identifier: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.pending.get(identifier).copied())
    }

    /// Consume the registration for `identifier` if it is due at `now`
    ///
    /// Returns the registered instant when delivered. A registration that is
    /// not yet due stays in place.
    pub fn take_due(&self, identifier: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.modify(|registrations| match registrations.pending.get(identifier) {
            Some(&earliest) if earliest <= now => {
                registrations.pending.remove(identifier);
                (Some(earliest), true)
            }
            _ => (None, false),
        })
    }

    /// Drop the registration for `identifier`; true if one existed
    pub fn revoke(&self, identifier: &str) -> Result<bool> {
        self.modify(|registrations| {
            let removed = registrations.pending.remove(identifier).is_some();
            (removed, removed)
        })
    }

    /// Unreadable registries count as empty; the next write replaces them
    fn read(&self) -> Result<Registrations> {
        let Some(contents) = read_optional(&self.path)? else {
            return Ok(Registrations::default());
        };
        match serde_json::from_str(&contents) {
            Ok(registrations) => Ok(registrations),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse wake-up registry {:?}: {}. Treating as empty.",
                    self.path,
                    e
                );
                Ok(Registrations::default())
            }
        }
    }

    /// Run `f` under the exclusive lock; writes back when it reports a change
    fn modify<T>(&self, f: impl FnOnce(&mut Registrations) -> (T, bool)) -> Result<T> {
        let lock = open_lock_file(&self.path)?;
        FileExt::lock_exclusive(&lock)?;

        let result = self.read().and_then(|mut registrations| {
            let (value, changed) = f(&mut registrations);
            if changed {
                write_atomic(&self.path, &serde_json::to_vec_pretty(&registrations)?)?;
            }
            Ok(value)
        });

        FileExt::unlock(&lock)?;
        result
    }
}

impl DeferredExecution for FileWakeRegistry {
    fn register(&self, identifier: &str, earliest: DateTime<Utc>) -> Result<()> {
        self.modify(|registrations| {
            registrations.pending.insert(identifier.to_string(), earliest);
            ((), true)
        })?;
        tracing::debug!("Registered wake-up {} for {}", identifier, earliest);
        Ok(())
    }
}
