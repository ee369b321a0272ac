use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use crate::schema::TrackRow;
use crate::table::Table;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt table file {path}: {message}")]
    Corrupt { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct MergeStats {
    pub existing: usize,
    pub added: usize,
    pub total: usize,
}

/// File-backed table storage: timestamp-named snapshots plus one
/// fixed-path master table. Every write goes through a temp-file +
/// rename so a crash or concurrent invocation never truncates a good file.
pub struct Store {
    snapshots_dir: PathBuf,
    master_path: PathBuf,
}

impl Store {
    pub fn new(snapshots_dir: PathBuf, master_path: PathBuf) -> Self {
        Self {
            snapshots_dir,
            master_path,
        }
    }

    pub fn master_path(&self) -> &Path {
        &self.master_path
    }

    /// Write a uniquely-named snapshot and return its location.
    pub fn save_snapshot(&self, table: &Table) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.snapshots_dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let mut path = self.snapshots_dir.join(format!("playlist_{stamp}.json"));
        // Same-millisecond saves get a numeric suffix
        let mut n = 1;
        while path.exists() {
            path = self.snapshots_dir.join(format!("playlist_{stamp}-{n}.json"));
            n += 1;
        }

        let bytes = serde_json::to_vec_pretty(table)?;
        write_atomic(&path, &bytes)?;
        log::info!("Saved {} rows to {}", table.len(), path.display());
        Ok(path)
    }

    /// Load a table from a snapshot (or any table file). Inverse of
    /// `save_snapshot`: the loaded table is row-for-row equal to the saved
    /// one.
    pub fn load(path: &Path) -> Result<Table> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load the master table. A missing file is no prior data; a corrupt
    /// file is preserved aside and treated as no prior data.
    pub fn load_master(&self) -> Result<Table> {
        if !self.master_path.exists() {
            return Ok(Table::default());
        }
        match Self::load(&self.master_path) {
            Ok(table) => Ok(table),
            Err(StoreError::Corrupt { path, message }) => {
                let aside = self.preserve_corrupt_master()?;
                log::warn!(
                    "Master table {path} is corrupt ({message}); preserved as {} and starting empty",
                    aside.display()
                );
                Ok(Table::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Concatenate a table onto the master, drop exact-duplicate rows
    /// keeping first occurrence, and write the result back atomically.
    ///
    /// Idempotent for the same table. Rows differing only in annotation
    /// columns are NOT collapsed — re-annotating and re-merging accumulates
    /// both versions, matching the original tool.
    pub fn merge_into_master(&self, table: &Table) -> Result<MergeStats> {
        let master = self.load_master()?;
        let existing = master.len();

        let mut merged: Vec<TrackRow> = Vec::with_capacity(existing + table.len());
        for row in master.rows.into_iter().chain(table.iter().cloned()) {
            if !merged.contains(&row) {
                merged.push(row);
            }
        }

        let merged = Table::new(merged);
        let total = merged.len();

        if let Some(parent) = self.master_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&merged)?;
        write_atomic(&self.master_path, &bytes)?;

        Ok(MergeStats {
            existing,
            added: total - existing,
            total,
        })
    }

    /// Move a corrupt master file aside so its bytes survive the merge.
    fn preserve_corrupt_master(&self) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let name = self
            .master_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "master.json".to_string());
        let aside = self
            .master_path
            .with_file_name(format!("{name}.corrupt-{stamp}"));
        std::fs::rename(&self.master_path, &aside)?;
        Ok(aside)
    }
}

/// Write-then-replace, never truncate-then-write.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "table.json".to_string());
    let tmp = path.with_file_name(format!("{name}.tmp"));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
