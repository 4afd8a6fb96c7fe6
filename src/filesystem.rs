use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Extension used for note files on disk.
pub const NOTE_EXT: &str = "html";

/// Maximum length of the sanitized title portion of a note filename.
const MAX_TITLE_LEN: usize = 50;

/// Fallback title portion when a title sanitizes to nothing.
const DEFAULT_FILE_STEM: &str = "untitled_note";

/// Storage manages the application's data directory structure.
///
/// The structure is:
/// - `{data_dir}/notes/` - One file per note
/// - `{data_dir}/collections.json` - The collections membership index
/// - `{data_dir}/settings.json` - Session/settings state
#[derive(Debug, Clone)]
pub struct Storage {
    /// Base data directory for the application
    pub base_dir: PathBuf,
    /// Directory for storing note files (notes/)
    pub notes_dir: PathBuf,
    /// Path to the collections index file (collections.json)
    pub collections_file: PathBuf,
    /// Path to the settings file (settings.json)
    pub settings_file: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance using the platform-appropriate data
    /// directory (e.g. `~/.local/share/floatnote/` on Linux).
    pub fn new() -> Result<Self, StoreError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| {
                StoreError::Unknown("could not determine platform data directory".to_string())
            })?
            .join("floatnote");
        Ok(Self::new_with_base(&base_dir))
    }

    /// Creates a new Storage instance with a custom base directory.
    /// Useful for testing.
    pub fn new_with_base(base_dir: &Path) -> Self {
        let base_dir = base_dir.to_path_buf();
        let notes_dir = base_dir.join("notes");
        let collections_file = base_dir.join("collections.json");
        let settings_file = base_dir.join("settings.json");

        Self {
            base_dir,
            notes_dir,
            collections_file,
            settings_file,
        }
    }

    /// Ensures the base and notes directories exist, creating them if needed.
    pub fn ensure_directories(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_dir).map_err(|e| StoreError::from_io(e, &self.base_dir))?;
        fs::create_dir_all(&self.notes_dir)
            .map_err(|e| StoreError::from_io(e, &self.notes_dir))?;
        Ok(())
    }
}

/// Sanitizes a note title for use in a filename: lowercased, every
/// non-alphanumeric character replaced with `_`, truncated to 50 characters.
/// An empty result falls back to `untitled_note`.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_TITLE_LEN)
        .collect();

    if sanitized.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        sanitized
    }
}

/// First 8 hex characters of a note id (hyphens skipped). Appended to the
/// sanitized title so renames of different notes with equal titles cannot
/// collide.
pub fn short_id(note_id: &str) -> String {
    note_id.chars().filter(|c| *c != '-').take(8).collect()
}

/// Deterministic filename for a note: `sanitize(title)_<8-hex-id>.<ext>`.
/// Stable for a given id+title pair, which makes same-note overwrites
/// idempotent.
pub fn note_file_name(title: &str, note_id: &str) -> String {
    format!("{}_{}.{}", sanitize_title(title), short_id(note_id), NOTE_EXT)
}
