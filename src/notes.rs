use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::StoreError;
use crate::filesystem::{note_file_name, short_id, NOTE_EXT};
use crate::metadata;
use crate::models::NoteFileInfo;
use crate::registry::NoteFileRegistry;

/// What to do when a rename-on-title-change finds the target filename
/// already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenameCollision {
    /// Skip the rename and overwrite the target path directly (the original
    /// application's behavior).
    #[default]
    Overwrite,
    /// Refuse the save with an error.
    Fail,
    /// Pick the first free `name_2`, `name_3`, ... variant.
    Disambiguate,
}

/// Successful save outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedNote {
    pub path: PathBuf,
    pub note_id: String,
}

/// Durable CRUD for individual note files.
///
/// Owns no paths itself; every operation takes the notes directory so a
/// window can point the store at any location. The injected
/// [`NoteFileRegistry`] tracks where each note currently lives.
pub struct NoteFileStore {
    registry: Arc<NoteFileRegistry>,
    collision_policy: RenameCollision,
}

impl NoteFileStore {
    pub fn new(registry: Arc<NoteFileRegistry>) -> Self {
        Self {
            registry,
            collision_policy: RenameCollision::default(),
        }
    }

    pub fn with_collision_policy(registry: Arc<NoteFileRegistry>, policy: RenameCollision) -> Self {
        Self {
            registry,
            collision_policy: policy,
        }
    }

    pub fn registry(&self) -> &NoteFileRegistry {
        &self.registry
    }

    /// Scans `directory` for note files and fully rebuilds the registry.
    ///
    /// A missing directory yields an empty list, not an error. Each file's
    /// embedded metadata is decoded to recover its canonical id, falling
    /// back to the file stem when none is embedded. A file that cannot be
    /// read is logged and skipped; the scan continues.
    pub fn list_note_files(&self, directory: &Path) -> Result<Vec<NoteFileInfo>, StoreError> {
        if !directory.is_dir() {
            self.registry.invalidate();
            return Ok(vec![]);
        }

        let entries = fs::read_dir(directory).map_err(|e| StoreError::from_io(e, directory))?;

        let mut infos: Vec<NoteFileInfo> = vec![];
        let mut mapping: HashMap<String, PathBuf> = HashMap::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(NOTE_EXT) {
                continue;
            }

            let text = match fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("skipping unreadable note file {}: {}", path.display(), e);
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let decoded = metadata::decode(&text);
            let id = decoded.metadata.id.clone().unwrap_or_else(|| stem.clone());

            let (created_at, modified_at) = file_times(&path);
            mapping.insert(id.clone(), path.clone());
            infos.push(NoteFileInfo {
                id,
                name: stem,
                path: path.display().to_string(),
                created_at,
                modified_at,
                metadata: decoded.metadata,
            });
        }

        // Clear and repopulate, never additive: files deleted behind our
        // back must not survive in the registry.
        self.registry.replace_all(mapping);

        infos.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(infos)
    }

    /// Reads the full stored text of a note file.
    ///
    /// Self-heals registry drift: if the decoded metadata carries an id that
    /// is unmapped or mapped to a different path, the registry is updated to
    /// point at this path.
    pub fn read_note_file(&self, path: &Path) -> Result<String, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "note file does not exist: {}",
                path.display()
            )));
        }

        let text = fs::read_to_string(path).map_err(|e| StoreError::from_io(e, path))?;

        if let Some(id) = metadata::decode(&text).metadata.id {
            if self.registry.get(&id).as_deref() != Some(path) {
                debug!("registry drift for note {}, repointing to {}", id, path.display());
                self.registry.insert(&id, path);
            }
        }

        Ok(text)
    }

    /// Creates or updates the file backing a note.
    ///
    /// The filename is deterministic for a given id+title pair, so saving the
    /// same note twice with an unchanged title overwrites in place. A changed
    /// title renames the old file; a missing registry entry falls back to an
    /// id-substring directory scan before being treated as a fresh create.
    /// Fails only on unrecoverable write errors.
    pub fn save_note_file(
        &self,
        note_id: &str,
        title: &str,
        content: &str,
        directory: &Path,
        is_first_save: bool,
    ) -> Result<SavedNote, StoreError> {
        fs::create_dir_all(directory).map_err(|e| StoreError::from_io(e, directory))?;

        let target = directory.join(note_file_name(title, note_id));
        let resolved = if is_first_save {
            target
        } else {
            match self.registry.get(note_id) {
                Some(existing) => self.resolve_existing(&existing, target, directory)?,
                None => {
                    // Pre-migration note or reset registry: rare-path scan.
                    match find_file_containing_id(directory, note_id) {
                        Some(found) => self.resolve_existing(&found, target, directory)?,
                        None => target,
                    }
                }
            }
        };

        fs::write(&resolved, content).map_err(|e| StoreError::from_io(e, &resolved))?;
        self.registry.insert(note_id, &resolved);
        Ok(SavedNote {
            path: resolved,
            note_id: note_id.to_string(),
        })
    }

    /// Deletes the file backing a note. The registry is consulted first; a
    /// miss (or stale entry) falls back to the id-substring scan. Fails with
    /// NotFound when neither locates a file.
    pub fn delete_note_file(&self, note_id: &str, directory: &Path) -> Result<(), StoreError> {
        let located = self
            .registry
            .get(note_id)
            .filter(|p| p.exists())
            .or_else(|| find_file_containing_id(directory, note_id));

        let Some(path) = located else {
            self.registry.remove(note_id);
            return Err(StoreError::NotFound(format!(
                "no file found for note {} in {}",
                note_id,
                directory.display()
            )));
        };

        fs::remove_file(&path).map_err(|e| StoreError::from_io(e, &path))?;
        self.registry.remove(note_id);
        Ok(())
    }

    /// Decides the final path when an older file for the note already exists.
    fn resolve_existing(
        &self,
        existing: &Path,
        target: PathBuf,
        directory: &Path,
    ) -> Result<PathBuf, StoreError> {
        let same_dir = existing.parent() == Some(directory);
        let same_name = existing.file_name() == target.file_name();

        if !same_dir || same_name {
            // No title change in this directory: overwrite in place when the
            // old file is here, otherwise create fresh at the computed path.
            return Ok(if same_dir { existing.to_path_buf() } else { target });
        }

        // Title changed: move the old file to the new name.
        if !target.exists() {
            if let Err(e) = fs::rename(existing, &target) {
                // The old file vanished or the rename raced; the follow-up
                // write at the target still lands the content.
                warn!(
                    "rename {} -> {} failed ({}), writing target directly",
                    existing.display(),
                    target.display(),
                    e
                );
            }
            return Ok(target);
        }

        match self.collision_policy {
            RenameCollision::Overwrite => {
                warn!(
                    "target {} already occupied, overwriting and dropping {}",
                    target.display(),
                    existing.display()
                );
                // The stale source would otherwise resurface on the next
                // scan as a duplicate of this note.
                let _ = fs::remove_file(existing);
                Ok(target)
            }
            RenameCollision::Fail => Err(StoreError::Validation(format!(
                "rename target already exists: {}",
                target.display()
            ))),
            RenameCollision::Disambiguate => {
                let free = first_free_variant(&target)?;
                if let Err(e) = fs::rename(existing, &free) {
                    warn!(
                        "rename {} -> {} failed ({}), writing target directly",
                        existing.display(),
                        free.display(),
                        e
                    );
                }
                Ok(free)
            }
        }
    }
}

/// Rare-path recovery: find any note file in `directory` whose name contains
/// the note's id (short or full form). Kept separate from the main save and
/// delete paths so the common case stays easy to reason about.
fn find_file_containing_id(directory: &Path, note_id: &str) -> Option<PathBuf> {
    let short = short_id(note_id);
    let entries = fs::read_dir(directory).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(NOTE_EXT) {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains(note_id) || (!short.is_empty() && name.contains(&short)) {
            return Some(path);
        }
    }
    None
}

/// First unoccupied `stem_2.ext`, `stem_3.ext`, ... variant of `target`.
fn first_free_variant(target: &Path) -> Result<PathBuf, StoreError> {
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    for n in 2..1000 {
        let candidate = parent.join(format!("{}_{}.{}", stem, n, NOTE_EXT));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(StoreError::Validation(format!(
        "no free filename variant for {}",
        target.display()
    )))
}

/// Created/modified times for a file. Creation time is not available on all
/// filesystems; it falls back to the modification time.
fn file_times(path: &Path) -> (DateTime<Utc>, DateTime<Utc>) {
    let meta = fs::metadata(path).ok();
    let modified = meta
        .as_ref()
        .and_then(|m| m.modified().ok())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let created = meta
        .as_ref()
        .and_then(|m| m.created().ok())
        .unwrap_or(modified);
    (DateTime::from(created), DateTime::from(modified))
}
