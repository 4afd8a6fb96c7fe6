use std::collections::HashSet;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Collection, CollectionInput, CollectionPatch, CollectionWithCount, Note,
    DEFAULT_COLLECTION_ID,
};

/// Quiet period for debounced subscriber notification.
pub const NOTIFY_DEBOUNCE: Duration = Duration::from_millis(500);

/// Base delay for the retrying writer; doubled on each attempt (1s, 2s, 4s).
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Number of retries after the initial failed write.
const WRITE_RETRIES: u32 = 3;

/// Diagnostic result of [`CollectionStore::health_check`].
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
}

type Subscriber = Box<dyn Fn(&[CollectionWithCount]) + Send + Sync>;

struct Inner {
    /// Path of the collections index file (collections.json).
    path: PathBuf,
    /// Lazily hydrated cache; `None` forces a reload from disk.
    cache: RwLock<Option<Vec<Collection>>>,
    subscribers: RwLock<Vec<Subscriber>>,
    /// Notes snapshot the debounced notification will use when it fires.
    pending_notes: Mutex<Vec<Note>>,
    /// Handle of the in-flight debounce timer; a new call aborts and
    /// replaces it (last call wins).
    notify_handle: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
    retry_base: Duration,
}

/// Durable CRUD for the single collections index file.
///
/// All non-default collections live in one JSON array that is rewritten
/// wholesale on every mutation. The synthetic "All Notes" collection is
/// injected on load and stripped on write. Cheap to clone; clones share
/// cache, subscribers and the debounce timer.
#[derive(Clone)]
pub struct CollectionStore {
    inner: Arc<Inner>,
}

impl CollectionStore {
    pub fn new(path: PathBuf) -> Self {
        Self::with_timing(path, NOTIFY_DEBOUNCE, RETRY_BASE_DELAY)
    }

    /// Constructor with injectable delays so tests do not wait on real
    /// timers.
    pub fn with_timing(path: PathBuf, debounce: Duration, retry_base: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                cache: RwLock::new(None),
                subscribers: RwLock::new(Vec::new()),
                pending_notes: Mutex::new(Vec::new()),
                notify_handle: Mutex::new(None),
                debounce,
                retry_base,
            }),
        }
    }

    /// Drops the cache; the next access reloads from disk.
    pub fn invalidate(&self) {
        *self.inner.cache.write().unwrap() = None;
    }

    /// Forces a fresh load from disk and returns it.
    pub fn reload(&self) -> Vec<Collection> {
        self.invalidate();
        self.get_all()
    }

    /// All collections, default first, the rest ordered by `sort_order`.
    ///
    /// Loads from the index file on first access. A missing file or
    /// directory yields just the default collection; a corrupt file is
    /// backed up and likewise degrades to defaults-only.
    pub fn get_all(&self) -> Vec<Collection> {
        if let Some(cached) = self.inner.cache.read().unwrap().as_ref() {
            return cached.clone();
        }

        let loaded = self.load_from_disk();
        *self.inner.cache.write().unwrap() = Some(loaded.clone());
        loaded
    }

    /// Collections with their note counts computed against the caller's
    /// currently-loaded notes. The default collection counts every note;
    /// the rest count the intersection of their membership with the live
    /// note ids (duplicates and dangling ids never inflate the count).
    pub fn get_with_counts(&self, notes: &[Note]) -> Vec<CollectionWithCount> {
        let live_ids: HashSet<&str> = notes.iter().map(|n| n.id.as_str()).collect();

        self.get_all()
            .into_iter()
            .map(|collection| {
                let note_count = if collection.is_default {
                    notes.len()
                } else {
                    collection
                        .note_ids
                        .iter()
                        .filter(|id| live_ids.contains(id.as_str()))
                        .collect::<HashSet<_>>()
                        .len()
                };
                CollectionWithCount {
                    collection,
                    note_count,
                }
            })
            .collect()
    }

    /// Creates a collection and persists the index.
    pub async fn create(&self, input: CollectionInput) -> Result<Collection, StoreError> {
        let mut collections = self.get_all();
        let now = Utc::now();
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            color: input.color,
            icon: input.icon,
            created_at: now,
            updated_at: now,
            note_ids: vec![],
            is_default: false,
            // Append at the end of the tab strip.
            sort_order: collections.iter().filter(|c| !c.is_default).count() as i64,
        };
        collections.push(collection.clone());

        self.commit(collections).await?;
        Ok(collection)
    }

    /// Merges `patch` into the collection. Returns `None` (a no-op) for the
    /// default collection or an unknown id.
    pub async fn update(
        &self,
        id: &str,
        patch: CollectionPatch,
    ) -> Result<Option<Collection>, StoreError> {
        let mut collections = self.get_all();
        let Some(target) = collections
            .iter_mut()
            .find(|c| c.id == id && !c.is_default)
        else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            target.name = name;
        }
        if let Some(description) = patch.description {
            target.description = Some(description);
        }
        if let Some(color) = patch.color {
            target.color = Some(color);
        }
        if let Some(icon) = patch.icon {
            target.icon = Some(icon);
        }
        if let Some(sort_order) = patch.sort_order {
            target.sort_order = sort_order;
        }
        target.updated_at = Utc::now();
        let updated = target.clone();

        self.commit(collections).await?;
        Ok(Some(updated))
    }

    /// Deletes a collection. `false` for the default collection or an
    /// unknown id.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.get_all();
        let before = collections.len();
        collections.retain(|c| c.id != id || c.is_default);
        if collections.len() == before {
            return Ok(false);
        }

        self.commit(collections).await?;
        Ok(true)
    }

    /// Adds a note id to a collection's membership. Re-adding an existing id
    /// is a successful no-op. `false` against the default collection or an
    /// unknown id.
    pub async fn add_note(&self, collection_id: &str, note_id: &str) -> Result<bool, StoreError> {
        let mut collections = self.get_all();
        let Some(target) = collections
            .iter_mut()
            .find(|c| c.id == collection_id && !c.is_default)
        else {
            return Ok(false);
        };

        if target.note_ids.iter().any(|id| id == note_id) {
            return Ok(true);
        }
        target.note_ids.push(note_id.to_string());
        target.updated_at = Utc::now();

        self.commit(collections).await?;
        Ok(true)
    }

    /// Removes a note id from a collection's membership. Removing an absent
    /// id is a successful no-op. `false` against the default collection or
    /// an unknown id.
    pub async fn remove_note(
        &self,
        collection_id: &str,
        note_id: &str,
    ) -> Result<bool, StoreError> {
        let mut collections = self.get_all();
        let Some(target) = collections
            .iter_mut()
            .find(|c| c.id == collection_id && !c.is_default)
        else {
            return Ok(false);
        };

        let before = target.note_ids.len();
        target.note_ids.retain(|id| id != note_id);
        if target.note_ids.len() == before {
            return Ok(true);
        }
        target.updated_at = Utc::now();

        self.commit(collections).await?;
        Ok(true)
    }

    /// Prunes a deleted note's id from every non-default collection. Part of
    /// delete handling: membership must never reference a note that no
    /// longer exists.
    pub async fn handle_note_deleted(&self, note_id: &str) -> Result<(), StoreError> {
        let mut collections = self.get_all();
        let now = Utc::now();
        let mut changed = false;
        for collection in collections.iter_mut().filter(|c| !c.is_default) {
            let before = collection.note_ids.len();
            collection.note_ids.retain(|id| id != note_id);
            if collection.note_ids.len() != before {
                collection.updated_at = now;
                changed = true;
            }
        }

        if changed {
            self.commit(collections).await?;
        }
        Ok(())
    }

    /// Registers a subscriber for collection-count updates.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&[CollectionWithCount]) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .write()
            .unwrap()
            .push(Box::new(subscriber));
    }

    /// Recomputes counts and notifies subscribers.
    ///
    /// With `immediate` the fan-out happens synchronously (deletions and
    /// creations). Otherwise a single shared timer is restarted: rapid
    /// successive calls coalesce into one notification carrying the
    /// last-supplied notes after the quiet period (routine edits).
    pub fn notify_updates(&self, notes: &[Note], immediate: bool) {
        // A later call supersedes an earlier debounced one.
        if let Some(handle) = self.inner.notify_handle.lock().unwrap().take() {
            handle.abort();
        }

        if immediate {
            let counts = self.get_with_counts(notes);
            fan_out(&self.inner, &counts);
            return;
        }

        *self.inner.pending_notes.lock().unwrap() = notes.to_vec();

        let store = self.clone();
        let handle = tokio::spawn(async move {
            sleep(store.inner.debounce).await;
            let notes = store.inner.pending_notes.lock().unwrap().clone();
            let counts = store.get_with_counts(&notes);
            fan_out(&store.inner, &counts);
        });
        *self.inner.notify_handle.lock().unwrap() = Some(handle);
    }

    /// Validates the in-memory index: default-collection presence, duplicate
    /// ids, and structural validity of the persisted entries. Read-only.
    pub fn health_check(&self) -> HealthReport {
        let mut issues = vec![];
        let collections = self.get_all();

        if !collections.iter().any(|c| c.is_default) {
            issues.push("default collection is missing".to_string());
        }
        if collections.iter().filter(|c| c.is_default).count() > 1 {
            issues.push("more than one default collection".to_string());
        }

        let mut seen = HashSet::new();
        for collection in &collections {
            if !seen.insert(collection.id.as_str()) {
                issues.push(format!("duplicate collection id: {}", collection.id));
            }
        }

        // Re-validate what is actually on disk.
        if self.inner.path.exists() {
            match fs::read_to_string(&self.inner.path) {
                Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Array(items)) => {
                        for (idx, item) in items.iter().enumerate() {
                            if let Err(problem) = validate_entry(item) {
                                issues.push(format!("entry {}: {}", idx, problem));
                            }
                        }
                    }
                    Ok(_) => issues.push("index file is not a JSON array".to_string()),
                    Err(e) => issues.push(format!("index file is not valid JSON: {}", e)),
                },
                Err(e) => issues.push(format!("index file unreadable: {}", e)),
            }
        }

        HealthReport {
            healthy: issues.is_empty(),
            issues,
        }
    }

    /// Updates the cache and persists in one step.
    async fn commit(&self, collections: Vec<Collection>) -> Result<(), StoreError> {
        *self.inner.cache.write().unwrap() = Some(collections.clone());
        self.persist(&collections).await
    }

    /// Writes all non-default collections, retrying with exponential backoff
    /// before surfacing a typed error.
    async fn persist(&self, collections: &[Collection]) -> Result<(), StoreError> {
        let stored: Vec<&Collection> = collections.iter().filter(|c| !c.is_default).collect();
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StoreError::Unknown(format!("failed to serialize collections: {}", e)))?;

        if let Some(parent) = self.inner.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent))?;
        }

        let mut attempt = 0u32;
        loop {
            match fs::write(&self.inner.path, &json) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < WRITE_RETRIES => {
                    let delay = self.inner.retry_base * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        "collections write failed (attempt {}): {}, retrying in {:?}",
                        attempt, e, delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!("collections write failed after {} retries: {}", WRITE_RETRIES, e);
                    return Err(StoreError::from_io(e, &self.inner.path));
                }
            }
        }
    }

    fn load_from_disk(&self) -> Vec<Collection> {
        let mut out = vec![Collection::default_collection()];

        if !self.inner.path.exists() {
            return out;
        }
        let raw = match fs::read_to_string(&self.inner.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to read collections index, using defaults: {}", e);
                return out;
            }
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                error!("collections index is not a JSON array, restoring defaults");
                self.write_corruption_backup(&raw);
                return out;
            }
            Err(e) => {
                error!("collections index is corrupt ({}), restoring defaults", e);
                self.write_corruption_backup(&raw);
                return out;
            }
        };

        let mut dropped = 0usize;
        for item in &items {
            match validate_entry(item) {
                Ok(collection) => out.push(collection),
                Err(problem) => {
                    warn!("dropping invalid collection entry: {}", problem);
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            info!("dropped {} invalid collection entries on load", dropped);
        }

        // Default first (sort_order -1), then user order.
        out.sort_by_key(|c| c.sort_order);
        out
    }

    /// Preserves the corrupt index next to the original before it gets
    /// overwritten by the next successful save.
    fn write_corruption_backup(&self, raw: &str) {
        let backup = PathBuf::from(format!(
            "{}_backup_{}",
            self.inner.path.display(),
            Utc::now().timestamp_millis()
        ));
        let contents = format!("{}\n// Corrupted on {}", raw, Utc::now().to_rfc3339());
        match fs::write(&backup, contents) {
            Ok(()) => info!("corrupt collections index backed up to {}", backup.display()),
            Err(e) => error!("failed to write corruption backup: {}", e),
        }
    }
}

/// Structural validation for one persisted entry. Entries that fail are
/// dropped individually; the rest of the file still loads.
fn validate_entry(value: &Value) -> Result<Collection, String> {
    let obj = value.as_object().ok_or("not an object")?;

    if !obj.get("id").map_or(false, Value::is_string) {
        return Err("id must be a string".to_string());
    }
    if !obj.get("name").map_or(false, Value::is_string) {
        return Err("name must be a string".to_string());
    }
    match obj.get("noteIds") {
        Some(Value::Array(ids)) if ids.iter().all(Value::is_string) => {}
        Some(Value::Array(_)) => return Err("noteIds must contain only strings".to_string()),
        Some(_) => return Err("noteIds must be an array".to_string()),
        None => return Err("noteIds is missing".to_string()),
    }

    let collection: Collection =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    // The default collection is never persisted; an entry claiming to be it
    // would shadow the synthetic one.
    if collection.is_default || collection.id == DEFAULT_COLLECTION_ID {
        return Err("persisted entry claims to be the default collection".to_string());
    }
    Ok(collection)
}

/// Invokes every subscriber; a panicking subscriber is logged and does not
/// prevent the others from running.
fn fan_out(inner: &Inner, counts: &[CollectionWithCount]) {
    let subscribers = inner.subscribers.read().unwrap();
    for subscriber in subscribers.iter() {
        if catch_unwind(AssertUnwindSafe(|| subscriber(counts))).is_err() {
            error!("collection-update subscriber panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_COLLECTION_ID;
    use regex::Regex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn fast_store(path: PathBuf) -> CollectionStore {
        CollectionStore::with_timing(path, Duration::from_millis(50), Duration::from_millis(1))
    }

    fn note(id: &str) -> Note {
        let mut n = Note::new_untitled();
        n.id = id.to_string();
        n
    }

    #[test]
    fn test_get_all_missing_file_is_defaults_only() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("missing").join("collections.json"));

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_default);
        assert_eq!(all[0].id, DEFAULT_COLLECTION_ID);
    }

    #[tokio::test]
    async fn test_create_persists_without_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        let store = fast_store(path.clone());

        let created = store
            .create(CollectionInput {
                name: "Work".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.sort_order, 0);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Work"));
        assert!(!raw.contains("All Notes"), "default must never be persisted");

        // A cold store sees the same data plus the injected default.
        let fresh = fast_store(path);
        let all = fresh.get_all();
        assert_eq!(all.len(), 2);
        assert!(all[0].is_default);
        assert_eq!(all[1].name, "Work");
    }

    #[tokio::test]
    async fn test_sorted_by_sort_order() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let a = store
            .create(CollectionInput { name: "A".into(), ..Default::default() })
            .await
            .unwrap();
        let b = store
            .create(CollectionInput { name: "B".into(), ..Default::default() })
            .await
            .unwrap();

        // Swap tab order.
        store
            .update(&a.id, CollectionPatch { sort_order: Some(5), ..Default::default() })
            .await
            .unwrap();
        store
            .update(&b.id, CollectionPatch { sort_order: Some(1), ..Default::default() })
            .await
            .unwrap();

        let names: Vec<String> = store.reload().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["All Notes", "B", "A"]);
    }

    #[tokio::test]
    async fn test_default_collection_is_immutable() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let patched = store
            .update(
                DEFAULT_COLLECTION_ID,
                CollectionPatch { name: Some("Hijacked".into()), ..Default::default() },
            )
            .await
            .unwrap();
        assert!(patched.is_none());

        assert!(!store.delete(DEFAULT_COLLECTION_ID).await.unwrap());
        assert!(!store.add_note(DEFAULT_COLLECTION_ID, "n1").await.unwrap());
        assert!(!store.remove_note(DEFAULT_COLLECTION_ID, "n1").await.unwrap());

        let all = store.get_all();
        assert_eq!(all.iter().filter(|c| c.is_default).count(), 1);
        assert_eq!(all[0].name, "All Notes");
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_noop() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let patched = store
            .update("ghost", CollectionPatch { name: Some("X".into()), ..Default::default() })
            .await
            .unwrap();
        assert!(patched.is_none());
        assert!(!store.delete("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_note_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        let work = store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();

        assert!(store.add_note(&work.id, "n1").await.unwrap());
        assert!(store.add_note(&work.id, "n1").await.unwrap());
        assert!(store.add_note(&work.id, "n2").await.unwrap());

        let all = store.get_all();
        let work = all.iter().find(|c| c.id == work.id).unwrap();
        assert_eq!(work.note_ids, vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_remove_note_absent_is_noop() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        let work = store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();

        assert!(store.remove_note(&work.id, "never-added").await.unwrap());
        assert!(store.add_note(&work.id, "n1").await.unwrap());
        assert!(store.remove_note(&work.id, "n1").await.unwrap());

        let all = store.get_all();
        assert!(all.iter().find(|c| c.id == work.id).unwrap().note_ids.is_empty());
    }

    #[tokio::test]
    async fn test_membership_pruning_on_note_delete() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        let work = store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();
        store.add_note(&work.id, "n1").await.unwrap();
        store.add_note(&work.id, "n2").await.unwrap();

        store.handle_note_deleted("n1").await.unwrap();

        let all = store.reload();
        let work = all.iter().find(|c| c.id == work.id).unwrap();
        assert_eq!(work.note_ids, vec!["n2"]);
    }

    #[test]
    fn test_corruption_recovery_writes_one_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        fs::write(&path, "{not json").unwrap();

        let store = fast_store(path);
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_default);

        let backup_re = Regex::new(r"^collections\.json_backup_\d+$").unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| backup_re.is_match(&e.file_name().to_string_lossy()))
            .collect();
        assert_eq!(backups.len(), 1);

        let contents = fs::read_to_string(backups[0].path()).unwrap();
        assert!(contents.starts_with("{not json"));
        assert!(contents.contains("// Corrupted on "));
    }

    #[test]
    fn test_invalid_entries_dropped_individually() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        let now = Utc::now().to_rfc3339();
        let raw = format!(
            r#"[
                {{"id":"c1","name":"Good","createdAt":"{now}","updatedAt":"{now}","noteIds":["n1"],"sortOrder":0}},
                {{"id":42,"name":"BadId","createdAt":"{now}","updatedAt":"{now}","noteIds":[],"sortOrder":1}},
                {{"id":"c3","name":"BadIds","createdAt":"{now}","updatedAt":"{now}","noteIds":"nope","sortOrder":2}},
                "not even an object"
            ]"#
        );
        fs::write(&path, raw).unwrap();

        let store = fast_store(path);
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].name, "Good");
        // No backup for per-entry drops: the file as a whole parsed.
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains("_backup_"))
            .collect();
        assert!(backups.is_empty());
    }

    #[test]
    fn test_zero_valid_entries_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        fs::write(&path, r#"[{"id":7}]"#).unwrap();

        let store = fast_store(path);
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_default);
    }

    #[tokio::test]
    async fn test_count_scenario() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        let work = store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();
        store.add_note(&work.id, "n1").await.unwrap();

        let notes = vec![note("n1"), note("n2")];
        let counts = store.get_with_counts(&notes);

        let all_count = counts.iter().find(|c| c.collection.is_default).unwrap();
        let work_count = counts.iter().find(|c| c.collection.id == work.id).unwrap();
        assert_eq!(all_count.note_count, 2);
        assert_eq!(work_count.note_count, 1);
    }

    #[tokio::test]
    async fn test_counts_ignore_dangling_and_duplicate_ids() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        let work = store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();
        store.add_note(&work.id, "n1").await.unwrap();
        store.add_note(&work.id, "deleted-long-ago").await.unwrap();

        let counts = store.get_with_counts(&[note("n1")]);
        let work_count = counts.iter().find(|c| c.collection.id == work.id).unwrap();
        assert_eq!(work_count.note_count, 1);
    }

    #[tokio::test]
    async fn test_debounce_coalesces_to_one_notification() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let calls = Arc::new(AtomicUsize::new(0));
        let last_total = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            let last_total = last_total.clone();
            store.subscribe(move |counts| {
                calls.fetch_add(1, Ordering::SeqCst);
                let total = counts
                    .iter()
                    .find(|c| c.collection.is_default)
                    .map(|c| c.note_count)
                    .unwrap_or(0);
                last_total.store(total, Ordering::SeqCst);
            });
        }

        store.notify_updates(&[note("n1")], false);
        store.notify_updates(&[note("n1"), note("n2")], false);
        store.notify_updates(&[note("n1"), note("n2"), note("n3")], false);

        sleep(Duration::from_millis(150)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "three rapid calls must coalesce");
        assert_eq!(last_total.load(Ordering::SeqCst), 3, "must reflect the last-supplied notes");
    }

    #[tokio::test]
    async fn test_immediate_notification_is_synchronous() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            store.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        store.notify_updates(&[note("n1")], true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_supersedes_pending_debounce() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            store.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        store.notify_updates(&[note("n1")], false);
        store.notify_updates(&[note("n1")], true);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "aborted timer must not fire");
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_block_others() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));

        store.subscribe(|_| panic!("bad subscriber"));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            store.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        store.notify_updates(&[note("n1")], true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces_typed_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        // Occupy the index path with a directory so every write fails.
        fs::create_dir(&path).unwrap();

        let store = fast_store(path);
        let err = store
            .create(CollectionInput { name: "Doomed".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(!err.user_message().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_reports_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collections.json");
        let now = Utc::now().to_rfc3339();
        let raw = format!(
            r#"[
                {{"id":"dup","name":"One","createdAt":"{now}","updatedAt":"{now}","noteIds":[],"sortOrder":0}},
                {{"id":"dup","name":"Two","createdAt":"{now}","updatedAt":"{now}","noteIds":[],"sortOrder":1}}
            ]"#
        );
        fs::write(&path, raw).unwrap();

        let store = fast_store(path);
        let report = store.health_check();
        assert!(!report.healthy);
        assert!(report.issues.iter().any(|i| i.contains("duplicate")));
    }

    #[tokio::test]
    async fn test_health_check_clean_store() {
        let dir = tempdir().unwrap();
        let store = fast_store(dir.path().join("collections.json"));
        store
            .create(CollectionInput { name: "Work".into(), ..Default::default() })
            .await
            .unwrap();

        let report = store.health_check();
        assert!(report.healthy, "issues: {:?}", report.issues);
    }
}
