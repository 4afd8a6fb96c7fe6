use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde_json::{json, Map, Value};

use crate::collections::CollectionStore;
use crate::models::{Collection, DEFAULT_COLLECTION_ID};

const ACTIVE_COLLECTION_KEY: &str = "activeCollectionId";

/// Remembers which collection was active so the next launch reopens it.
///
/// Lives inside the shared settings file. Only its own key is touched; other
/// settings in the file are preserved on save. Persisting the session is
/// best-effort: failures are logged and never surfaced, losing the active
/// tab is not worth an error dialog.
#[derive(Debug, Clone)]
pub struct SessionState {
    settings_path: PathBuf,
}

impl SessionState {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }

    /// Persists the active collection id. Never fails; write errors are
    /// logged and swallowed.
    pub fn save(&self, active_collection_id: &str) {
        let mut settings = self.read_settings();
        settings.insert(
            ACTIVE_COLLECTION_KEY.to_string(),
            json!(active_collection_id),
        );

        let contents = match serde_json::to_string_pretty(&Value::Object(settings)) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("failed to serialize settings: {}", e);
                return;
            }
        };
        if let Some(parent) = self.settings_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("failed to create settings directory: {}", e);
                return;
            }
        }
        if let Err(e) = fs::write(&self.settings_path, contents) {
            warn!("failed to save session state: {}", e);
        }
    }

    /// Returns the collection id to restore. The persisted id is validated
    /// against the live collections; a missing file, unreadable settings or
    /// a collection deleted since last run all fall back to the default
    /// collection.
    pub fn restore(&self, collections: &CollectionStore) -> String {
        self.validate(self.persisted_id(), &collections.get_all())
    }

    /// Startup composition: hydrates collections and validates the restored
    /// session against them in one call.
    pub fn initialize_with_session(
        &self,
        collections: &CollectionStore,
    ) -> (Vec<Collection>, String) {
        let all = collections.get_all();
        let active = self.validate(self.persisted_id(), &all);
        (all, active)
    }

    fn validate(&self, persisted: Option<String>, collections: &[Collection]) -> String {
        match persisted {
            Some(id) if collections.iter().any(|c| c.id == id) => id,
            Some(id) => {
                info!(
                    "saved collection {} no longer exists, restoring default",
                    id
                );
                DEFAULT_COLLECTION_ID.to_string()
            }
            None => DEFAULT_COLLECTION_ID.to_string(),
        }
    }

    fn persisted_id(&self) -> Option<String> {
        self.read_settings()
            .get(ACTIVE_COLLECTION_KEY)?
            .as_str()
            .map(str::to_string)
    }

    /// The settings file as a JSON object. Anything unreadable or malformed
    /// degrades to an empty object.
    fn read_settings(&self) -> Map<String, Value> {
        if !self.settings_path.exists() {
            return Map::new();
        }
        let raw = match fs::read_to_string(&self.settings_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to read settings file: {}", e);
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("settings file is not a JSON object, ignoring it");
                Map::new()
            }
            Err(e) => {
                warn!("settings file is corrupt, ignoring it: {}", e);
                Map::new()
            }
        }
    }
}
