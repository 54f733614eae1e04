//! Storage layer for CourseMate
//!
//! Lays out the data directory and owns the SQLite database.
//!
//! ```text
//! <data_dir>/store/
//! ├── db.sqlite      documents, chunks, embeddings, index status
//! └── keywords/      tantivy index
//! ```

pub mod database;

use crate::error::{CourseMateError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use database::{Database, DbPool, DbStats, IndexState, PendingWrite};

/// Storage manager that owns the data directory layout
pub struct StorageManager {
    pub database: Arc<Database>,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create the directory layout (if missing) and open the database
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store = base_path.join("store");
        let keywords = store.join("keywords");

        std::fs::create_dir_all(&keywords).map_err(|e| CourseMateError::Io {
            source: e,
            context: format!("Failed to create store directory: {}", keywords.display()),
        })?;

        let database = Arc::new(Database::new(&store.join("db.sqlite"))?);

        Ok(Self {
            database,
            base_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding everything the engine writes
    pub fn store_dir(&self) -> PathBuf {
        self.base_path.join("store")
    }

    /// Directory of the lexical index
    pub fn keyword_dir(&self) -> PathBuf {
        self.store_dir().join("keywords")
    }

    /// Get combined storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            db: self.database.stats()?,
            store_size: Self::dir_size(&self.store_dir())?,
        })
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64> {
        let io_err = |e: std::io::Error, path: &Path| CourseMateError::Io {
            source: e,
            context: format!("Failed to measure {}", path.display()),
        };

        let mut size = 0u64;
        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| io_err(e, path))? {
                let entry = entry.map_err(|e| io_err(e, path))?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry.metadata().map_err(|e| io_err(e, &path))?.len();
                }
            }
        }

        Ok(size)
    }
}

/// Combined storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub db: DbStats,
    pub store_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
