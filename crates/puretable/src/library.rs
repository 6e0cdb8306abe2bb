//! Process-wide library state.
//!
//! The library initializes itself when the first container is opened and
//! tears down when the last container handle is released. While up, it
//! tracks which files are open so that one process never holds a file for
//! writing next to any other handle on the same file (single writer or
//! multiple readers).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::StorageError;

#[derive(Debug, Default)]
struct OpenFile {
    readers: usize,
    writer: bool,
}

#[derive(Debug, Default)]
struct LibraryState {
    files: HashMap<PathBuf, OpenFile>,
    handles: usize,
}

static LIBRARY: Mutex<Option<LibraryState>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<LibraryState>> {
    LIBRARY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whether any container handle currently keeps the library up.
pub fn is_initialized() -> bool {
    lock().is_some()
}

/// Number of container handles currently open in this process.
pub fn open_handles() -> usize {
    lock().as_ref().map_or(0, |state| state.handles)
}

/// Registration of one open container; released on drop.
#[derive(Debug)]
pub(crate) struct FileLease {
    path: PathBuf,
    writable: bool,
}

/// Register an open of `path`, initializing the library on first use.
///
/// `path` must already be normalized so that two spellings of the same
/// file map to one entry.
pub(crate) fn acquire(path: &Path, writable: bool) -> Result<FileLease, StorageError> {
    let mut guard = lock();
    let state = guard.get_or_insert_with(|| {
        info!("puretable library initialized");
        LibraryState::default()
    });

    let entry = state.files.entry(path.to_path_buf()).or_default();
    let conflict = entry.writer || (writable && entry.readers > 0);
    if conflict {
        return Err(StorageError::Locked(path.to_path_buf()));
    }
    if writable {
        entry.writer = true;
    } else {
        entry.readers += 1;
    }
    state.handles += 1;
    debug!(path = %path.display(), writable, handles = state.handles, "container registered");

    Ok(FileLease {
        path: path.to_path_buf(),
        writable,
    })
}

impl Drop for FileLease {
    fn drop(&mut self) {
        let mut guard = lock();
        let Some(state) = guard.as_mut() else {
            return;
        };
        if let Some(entry) = state.files.get_mut(&self.path) {
            if self.writable {
                entry.writer = false;
            } else {
                entry.readers = entry.readers.saturating_sub(1);
            }
            if !entry.writer && entry.readers == 0 {
                state.files.remove(&self.path);
            }
        }
        state.handles = state.handles.saturating_sub(1);
        debug!(path = %self.path.display(), handles = state.handles, "container released");
        if state.handles == 0 {
            *guard = None;
            info!("puretable library shut down");
        }
    }
}
