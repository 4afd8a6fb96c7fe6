use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id of the synthetic "All Notes" collection. It exists only in memory:
/// it is injected on every load and stripped on every write.
pub const DEFAULT_COLLECTION_ID: &str = "all";

/// A single note. Collection membership is stored on the collection,
/// never on the note.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    /// Opaque rich-text payload, typically HTML.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub color: Option<String>,
    pub transparency: f64,
    pub pinned: bool,
    pub favorite: bool,
    /// True until the note has been written to a file for the first time.
    #[serde(default)]
    pub is_new: bool,
}

impl Note {
    /// Mints a transient note: it lives in memory only until its first save.
    pub fn new_untitled() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: "Untitled Note".to_string(),
            content: String::new(),
            created_at: now,
            updated_at: now,
            color: None,
            transparency: 1.0,
            pinned: false,
            favorite: false,
            is_new: true,
        }
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The small per-note property block embedded as a trailing comment in the
/// note file. All fields optional so older files decode cleanly.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<f64>,
}

impl From<&Note> for NoteMetadata {
    fn from(note: &Note) -> Self {
        Self {
            id: Some(note.id.clone()),
            color: note.color.clone(),
            pinned: Some(note.pinned),
            favorite: Some(note.favorite),
            transparency: Some(note.transparency),
        }
    }
}

/// What a directory scan reports per note file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteFileInfo {
    /// Canonical note id (embedded metadata id, or filename-derived).
    pub id: String,
    /// File name without extension.
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub metadata: NoteMetadata,
}

/// A named, ordered group of notes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered membership; insertion order is display order.
    pub note_ids: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    pub sort_order: i64,
}

impl Collection {
    /// The synthetic "All Notes" collection. Never persisted, deleted or
    /// edited; always present at load time.
    pub fn default_collection() -> Self {
        let now = Utc::now();
        Self {
            id: DEFAULT_COLLECTION_ID.to_string(),
            name: "All Notes".to_string(),
            description: None,
            color: None,
            icon: None,
            created_at: now,
            updated_at: now,
            note_ids: vec![],
            is_default: true,
            sort_order: -1,
        }
    }
}

/// Caller-supplied fields when creating a collection.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionInput {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Partial update for a collection; `None` fields are left untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub sort_order: Option<i64>,
}

/// A collection plus its computed note count. Counts are derived from the
/// caller's currently-loaded notes, never stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionWithCount {
    #[serde(flatten)]
    pub collection: Collection,
    pub note_count: usize,
}

/// Partial note properties relayed between windows. Deletion travels as a
/// patch with `deleted = true` rather than a distinct message type.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl NotePatch {
    /// The patch that represents a deleted note.
    pub fn deletion() -> Self {
        Self {
            deleted: true,
            ..Default::default()
        }
    }
}
