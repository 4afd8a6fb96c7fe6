use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::models::{CollectionWithCount, Note, NotePatch};
use crate::registry::TransientNoteRegistry;

/// A note change relayed to other windows.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteUpdate {
    pub note_id: String,
    pub patch: NotePatch,
    /// Window the change originated from; it is never echoed back there.
    pub source_window: String,
}

/// Messages fanned out to window channels.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastMessage {
    NoteUpdated(NoteUpdate),
    CollectionsUpdated(Vec<CollectionWithCount>),
}

/// Fans note and collection changes out to every open window.
///
/// Each window registers under its id and gets an unbounded channel. Note
/// updates skip the originating window so an edit never loops back to the
/// editor that made it. Channels whose receiver is gone are pruned on the
/// next send.
#[derive(Clone, Default)]
pub struct UpdateBroadcaster {
    windows: Arc<RwLock<HashMap<String, UnboundedSender<BroadcastMessage>>>>,
    transient: Arc<TransientNoteRegistry>,
}

impl UpdateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a window and returns its receiving end. Re-registering the
    /// same id replaces the old channel.
    pub fn register(&self, window_id: &str) -> UnboundedReceiver<BroadcastMessage> {
        let (tx, rx) = unbounded_channel();
        self.windows
            .write()
            .unwrap()
            .insert(window_id.to_string(), tx);
        debug!("window registered: {}", window_id);
        rx
    }

    /// Removes a window's channel (window closed).
    pub fn unregister(&self, window_id: &str) {
        self.windows.write().unwrap().remove(window_id);
        debug!("window unregistered: {}", window_id);
    }

    pub fn window_count(&self) -> usize {
        self.windows.read().unwrap().len()
    }

    /// Relays a note patch to every window except the source.
    pub fn broadcast_note_update(&self, source_window: &str, note_id: &str, patch: NotePatch) {
        let update = NoteUpdate {
            note_id: note_id.to_string(),
            patch,
            source_window: source_window.to_string(),
        };
        self.send_to_all(Some(source_window), BroadcastMessage::NoteUpdated(update));
    }

    /// Announces a deletion as a patch with `deleted = true`.
    pub fn broadcast_note_deleted(&self, source_window: &str, note_id: &str) {
        self.broadcast_note_update(source_window, note_id, NotePatch::deletion());
    }

    /// Pushes fresh collection counts to every window, the source included
    /// (the originating window needs the recomputed counts too).
    pub fn broadcast_collections(&self, counts: Vec<CollectionWithCount>) {
        self.send_to_all(None, BroadcastMessage::CollectionsUpdated(counts));
    }

    /// Stages a not-yet-saved note for the window that will open it.
    pub fn stage_transient_note(&self, note: Note) {
        self.transient.stage(note);
    }

    /// Hands a staged note to its window. Consumed on first call; a second
    /// call returns `None`.
    pub fn take_transient_note(&self, note_id: &str) -> Option<Note> {
        self.transient.take(note_id)
    }

    /// Drops a staged note that will never be opened.
    pub fn discard_transient_note(&self, note_id: &str) {
        self.transient.discard(note_id);
    }

    fn send_to_all(&self, skip: Option<&str>, message: BroadcastMessage) {
        let mut closed = vec![];
        {
            let windows = self.windows.read().unwrap();
            for (id, tx) in windows.iter() {
                if skip == Some(id.as_str()) {
                    continue;
                }
                if tx.send(message.clone()).is_err() {
                    closed.push(id.clone());
                }
            }
        }
        if !closed.is_empty() {
            let mut windows = self.windows.write().unwrap();
            for id in closed {
                debug!("pruning closed window channel: {}", id);
                windows.remove(&id);
            }
        }
    }
}
