//! Exercise collection persistence with file locking.
//!
//! The whole collection is stored as one JSON array under a fixed file name.
//! Every access goes through a sidecar lock file: shared for reads, exclusive
//! for writes and for the load-mutate-store critical section used by both
//! the reset scheduler and the store, so a timer-driven reset and an
//! interactive completion never interleave.

use crate::{Error, Exercise, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Storage key: file name of the collection inside the data directory
pub const STORE_FILE_NAME: &str = "exercises.json";

/// Result of a [`PersistenceGateway::update`] pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing has been persisted yet
    Absent,
    /// Loaded, but the mutation changed nothing; no write happened
    Unchanged,
    /// The mutation changed this many exercises and the result was written
    Saved(usize),
}

/// Load/save the whole exercise collection
pub trait PersistenceGateway: Send + Sync {
    /// `Ok(None)` when nothing was saved, `Err` when the blob is unreadable
    fn load(&self) -> Result<Option<Vec<Exercise>>>;

    fn save(&self, exercises: &[Exercise]) -> Result<()>;

    /// Remove the persisted collection
    fn clear(&self) -> Result<()>;

    fn has_saved_data(&self) -> bool;

    /// Load, mutate and store as one critical section
    ///
    /// `apply` returns how many exercises it changed; nothing is written
    /// when that is zero.
    fn update(&self, apply: &mut dyn FnMut(&mut Vec<Exercise>) -> usize) -> Result<UpdateOutcome> {
        let Some(mut exercises) = self.load()? else {
            return Ok(UpdateOutcome::Absent);
        };
        let changed = apply(&mut exercises);
        if changed == 0 {
            return Ok(UpdateOutcome::Unchanged);
        }
        self.save(&exercises)?;
        Ok(UpdateOutcome::Saved(changed))
    }
}

fn decode(contents: &str) -> Result<Vec<Exercise>> {
    let mut exercises: Vec<Exercise> = serde_json::from_str(contents)?;
    for exercise in &mut exercises {
        exercise.normalize();
    }
    Ok(exercises)
}

// ============================================================================
// File helpers (shared with the wake-up registry)
// ============================================================================

/// Open (creating if needed) the lock file guarding `path`
pub(crate) fn open_lock_file(path: &Path) -> Result<File> {
    let mut lock_name = path
        .file_name()
        .ok_or_else(|| Error::Persistence(format!("{:?} has no file name", path)))?
        .to_os_string();
    lock_name.push(".lock");
    let lock_path = path.with_file_name(lock_name);

    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    Ok(file)
}

/// Atomically replace `path` with `contents`
///
/// Writes to a temp file in the same directory, syncs, then renames over
/// the original.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Persistence(format!("{:?} has no parent directory", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        writer.write_all(contents)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read `path` to a string, `None` if it does not exist
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

// ============================================================================
// JSON file gateway
// ============================================================================

/// JSON file store guarded by an advisory lock file
pub struct JsonFileGateway {
    path: PathBuf,
}

impl JsonFileGateway {
    /// Store the collection at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the collection under [`STORE_FILE_NAME`] in `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_unlocked(&self) -> Result<Option<Vec<Exercise>>> {
        match read_optional(&self.path)? {
            Some(contents) => {
                let exercises = decode(&contents)?;
                tracing::debug!("Loaded {} exercises from {:?}", exercises.len(), self.path);
                Ok(Some(exercises))
            }
            None => Ok(None),
        }
    }

    fn update_unlocked(
        &self,
        apply: &mut dyn FnMut(&mut Vec<Exercise>) -> usize,
    ) -> Result<UpdateOutcome> {
        let Some(mut exercises) = self.read_unlocked()? else {
            return Ok(UpdateOutcome::Absent);
        };
        let changed = apply(&mut exercises);
        if changed == 0 {
            return Ok(UpdateOutcome::Unchanged);
        }
        self.write_unlocked(&exercises)?;
        Ok(UpdateOutcome::Saved(changed))
    }

    fn write_unlocked(&self, exercises: &[Exercise]) -> Result<()> {
        let contents = serde_json::to_vec(exercises)?;
        write_atomic(&self.path, &contents)?;
        tracing::debug!("Saved {} exercises to {:?}", exercises.len(), self.path);
        Ok(())
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn load(&self) -> Result<Option<Vec<Exercise>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lock = open_lock_file(&self.path)?;
        FileExt::lock_shared(&lock)?;
        let result = self.read_unlocked();
        FileExt::unlock(&lock)?;
        result
    }

    fn save(&self, exercises: &[Exercise]) -> Result<()> {
        let lock = open_lock_file(&self.path)?;
        FileExt::lock_exclusive(&lock)?;
        let result = self.write_unlocked(exercises);
        FileExt::unlock(&lock)?;
        result
    }

    fn clear(&self) -> Result<()> {
        let lock = open_lock_file(&self.path)?;
        FileExt::lock_exclusive(&lock)?;
        let result = match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        FileExt::unlock(&lock)?;
        tracing::info!("Cleared saved exercises at {:?}", self.path);
        result
    }

    fn has_saved_data(&self) -> bool {
        self.path.exists()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Vec<Exercise>) -> usize) -> Result<UpdateOutcome> {
        let lock = open_lock_file(&self.path)?;
        FileExt::lock_exclusive(&lock)?;

        let result = self.update_unlocked(apply);
        FileExt::unlock(&lock)?;
        result
    }
}

// ============================================================================
// In-memory gateway
// ============================================================================

/// Gateway holding the serialized blob in memory
///
/// Encodes exactly like [`JsonFileGateway`], which makes it a faithful
/// stand-in for embedding hosts and tests. Saves can be made to fail on
/// demand.
#[derive(Default)]
pub struct MemoryGateway {
    blob: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a raw blob, valid or not
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            ..Self::default()
        }
    }

    /// Make every following save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current raw blob
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().ok().and_then(|b| b.clone())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.blob
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".into()))
    }

    fn store(&self, slot: &mut Option<String>, exercises: &[Exercise]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence("save rejected by storage".into()));
        }
        *slot = Some(serde_json::to_string(exercises)?);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self) -> Result<Option<Vec<Exercise>>> {
        let slot = self.guard()?;
        slot.as_deref().map(decode).transpose()
    }

    fn save(&self, exercises: &[Exercise]) -> Result<()> {
        let mut slot = self.guard()?;
        self.store(&mut slot, exercises)
    }

    fn clear(&self) -> Result<()> {
        *self.guard()? = None;
        Ok(())
    }

    fn has_saved_data(&self) -> bool {
        self.guard().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Vec<Exercise>) -> usize) -> Result<UpdateOutcome> {
        let mut slot = self.guard()?;
        let Some(mut exercises) = slot.as_deref().map(decode).transpose()? else {
            return Ok(UpdateOutcome::Absent);
        };
        let changed = apply(&mut exercises);
        if changed == 0 {
            return Ok(UpdateOutcome::Unchanged);
        }
        self.store(&mut slot, &exercises)?;
        Ok(UpdateOutcome::Saved(changed))
    }
}
