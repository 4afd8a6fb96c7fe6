use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::models::Note;

/// In-memory map from note id to its current file path.
///
/// Lives for the process lifetime. A directory scan rebuilds it wholesale
/// via [`replace_all`](Self::replace_all); individual save/delete/read
/// operations update it incrementally. Injected into the file store so tests
/// get isolated instances instead of hidden module-level state.
#[derive(Debug, Default)]
pub struct NoteFileRegistry {
    paths: RwLock<HashMap<String, PathBuf>>,
}

impl NoteFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current path for a note id, if known.
    pub fn get(&self, note_id: &str) -> Option<PathBuf> {
        self.paths.read().unwrap().get(note_id).cloned()
    }

    /// Points `note_id` at `path`, replacing any previous mapping.
    pub fn insert(&self, note_id: &str, path: &Path) {
        self.paths
            .write()
            .unwrap()
            .insert(note_id.to_string(), path.to_path_buf());
    }

    /// Forgets the mapping for `note_id`.
    pub fn remove(&self, note_id: &str) -> Option<PathBuf> {
        self.paths.write().unwrap().remove(note_id)
    }

    /// Drops every mapping. The next scan repopulates from disk.
    pub fn invalidate(&self) {
        self.paths.write().unwrap().clear();
    }

    /// Clears and repopulates in one step (directory-scan rebuild).
    pub fn replace_all(&self, entries: HashMap<String, PathBuf>) {
        let mut paths = self.paths.write().unwrap();
        paths.clear();
        paths.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.paths.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().unwrap().is_empty()
    }

    /// A copy of the full mapping, mainly for diagnostics and tests.
    pub fn snapshot(&self) -> HashMap<String, PathBuf> {
        self.paths.read().unwrap().clone()
    }
}

/// Holding area for notes that exist in memory but have no file yet.
///
/// A new-note action stages the note here; the window that opens it consumes
/// it exactly once. Entries are discarded when the note is first saved or the
/// window closes without saving.
#[derive(Debug, Default)]
pub struct TransientNoteRegistry {
    notes: Mutex<HashMap<String, Note>>,
}

impl TransientNoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a not-yet-saved note for pickup by its window.
    pub fn stage(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id.clone(), note);
    }

    /// Consumes the staged note. A second call for the same id returns
    /// `None`; the caller then starts from defaults.
    pub fn take(&self, note_id: &str) -> Option<Note> {
        self.notes.lock().unwrap().remove(note_id)
    }

    /// Drops a staged note without consuming it (window closed, or the note
    /// was saved and now lives on disk).
    pub fn discard(&self, note_id: &str) {
        self.notes.lock().unwrap().remove(note_id);
    }

    pub fn len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.lock().unwrap().is_empty()
    }
}
