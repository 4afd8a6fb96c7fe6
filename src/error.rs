use std::io;
use std::path::Path;

use thiserror::Error;

/// Typed error taxonomy for the persistence layer.
///
/// Classification happens at the I/O boundary from `std::io::ErrorKind`,
/// never by matching message text. Every variant carries a technical
/// message; [`StoreError::user_message`] gives the short string surfaced
/// in the UI.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("corrupted data: {0}")]
    Corruption(String),

    #[error("invalid entity: {0}")]
    Validation(String),

    #[error("storage exhausted: {0}")]
    ResourceExhausted(String),

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Short, non-technical message suitable for a toast/dialog.
    pub fn user_message(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "The requested item could not be found.",
            StoreError::Permission(_) => "Permission was denied while accessing your notes.",
            StoreError::Corruption(_) => "A data file was damaged; defaults were restored.",
            StoreError::Validation(_) => "Some stored data was invalid and has been skipped.",
            StoreError::ResourceExhausted(_) => "Your disk appears to be full.",
            StoreError::Unknown(_) => "Something went wrong while saving your notes.",
        }
    }

    /// Wrap an `io::Error` for an operation on `path` into the taxonomy.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let msg = format!("{}: {}", path.display(), err);
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(msg),
            io::ErrorKind::PermissionDenied => StoreError::Permission(msg),
            io::ErrorKind::InvalidData => StoreError::Corruption(msg),
            // StorageFull is not stable on all toolchains; fall back to the
            // raw OS code for ENOSPC.
            _ if err.raw_os_error() == Some(28) => StoreError::ResourceExhausted(msg),
            _ => StoreError::Unknown(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let wrapped = StoreError::from_io(err, Path::new("/tmp/x.html"));
        assert!(matches!(wrapped, StoreError::NotFound(_)));
        assert!(wrapped.to_string().contains("/tmp/x.html"));
    }

    #[test]
    fn test_from_io_permission() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let wrapped = StoreError::from_io(err, Path::new("/tmp/x.html"));
        assert!(matches!(wrapped, StoreError::Permission(_)));
    }

    #[test]
    fn test_from_io_disk_full() {
        let err = io::Error::from_raw_os_error(28);
        let wrapped = StoreError::from_io(err, Path::new("/tmp/x.html"));
        assert!(matches!(wrapped, StoreError::ResourceExhausted(_)));
    }

    #[test]
    fn test_from_io_unknown() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        let wrapped = StoreError::from_io(err, Path::new("/tmp/x.html"));
        assert!(matches!(wrapped, StoreError::Unknown(_)));
    }

    #[test]
    fn test_user_message_is_short() {
        let e = StoreError::Corruption("collections.json: bad".into());
        assert!(!e.user_message().contains("collections.json"));
    }
}
