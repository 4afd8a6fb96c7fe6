//! Persistence and synchronization layer for a floating-notes desktop app.
//!
//! Notes live as individual files (rich-text body plus a trailing metadata
//! comment), collections in a single JSON index, and the active session in
//! the shared settings file. Multi-window synchronization goes through
//! [`broadcast::UpdateBroadcaster`]; collection counts are recomputed and
//! debounced by [`collections::CollectionStore`].

pub mod broadcast;
pub mod collections;
pub mod error;
pub mod filesystem;
pub mod metadata;
pub mod models;
pub mod notes;
pub mod registry;
pub mod session;

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initializes env_logger once per process. Safe to call from every entry
/// point; later calls are no-ops.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    });
}
