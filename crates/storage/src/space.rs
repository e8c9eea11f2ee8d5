//! In-memory free-space accounting.

use crate::error::StorageResult;
use std::path::Path;
use std::sync::RwLock;

/// Advisory free-space accountant.
///
/// Seeded once from a filesystem statfs at startup and adjusted in memory
/// afterwards (the syscall is too expensive to repeat per admission check).
/// It bounds bytes *accepted for upload*, not bytes actually written; crash
/// recovery does not need to reconstruct it exactly.
pub struct SpaceAccountant {
    available: RwLock<u64>,
}

impl SpaceAccountant {
    /// Create an accountant with a fixed number of available bytes.
    pub fn new(available: u64) -> Self {
        Self {
            available: RwLock::new(available),
        }
    }

    /// Seed the accountant from the filesystem holding `path`.
    pub fn seed_from_statfs(path: &Path) -> StorageResult<Self> {
        let available = fs2::available_space(path)?;
        tracing::info!(path = %path.display(), available, "Seeded free-space accountant");
        Ok(Self::new(available))
    }

    /// Bytes still admittable.
    pub fn available(&self) -> u64 {
        *self.available.read().expect("space lock poisoned")
    }

    /// Reserve `n` bytes for an admitted upload, saturating at zero.
    pub fn reserve(&self, n: u64) {
        let mut available = self.available.write().expect("space lock poisoned");
        *available = available.saturating_sub(n);
    }

    /// Release `n` bytes after a delete.
    pub fn release(&self, n: u64) {
        let mut available = self.available.write().expect("space lock poisoned");
        *available = available.saturating_add(n);
    }
}
