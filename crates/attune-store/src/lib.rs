//! Persistence for attune: user profiles and conversation transcripts in
//! SQLite, plus an in-memory backend with identical retention rules.

pub mod error;
pub mod repository;
pub mod schema;
pub mod store;

use std::env;
use std::path::{Path, PathBuf};

pub use error::{Result, StoreError};
pub use repository::{MemoryRepository, ProfileRepository};
pub use store::{PurgeReport, Store};

pub const DB_FILE_NAME: &str = "attune.db";

/// Default base directory for all attune storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".attune")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Open (creating if needed) the database under `base_dir`.
pub fn open_in_dir(base_dir: &Path) -> Result<Store> {
    std::fs::create_dir_all(base_dir).map_err(|e| {
        StoreError::InvalidData(format!("cannot create {}: {e}", base_dir.display()))
    })?;
    Store::open(&base_dir.join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        open_in_dir(&nested).unwrap();
        assert!(nested.join(DB_FILE_NAME).exists());
    }

    #[test]
    fn test_default_base_dir_name() {
        assert!(default_base_dir().ends_with(".attune"));
    }
}
