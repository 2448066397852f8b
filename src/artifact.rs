// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build artifact
//!
//! Description of the exported VM directory a completed build leaves
//! behind. The tree layout belongs to the compute provider; this only lists
//! what is there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Exported VM produced by a completed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub build_id: Uuid,
    /// Output directory the VM was exported into
    pub dir: PathBuf,
    pub vm_name: Option<String>,
    /// Files under `dir`, relative to it, sorted
    pub files: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Describe an export directory
    ///
    /// Listing is best-effort: an unreadable tree yields an artifact with
    /// no files rather than an error, since the export already succeeded.
    pub async fn describe(dir: &Path, vm_name: Option<String>) -> Self {
        let files = match collect_files(dir).await {
            Ok(files) => files,
            Err(err) => {
                warn!("Could not list artifact directory {}: {}", dir.display(), err);
                Vec::new()
            }
        };

        Self {
            build_id: Uuid::now_v7(),
            dir: dir.to_path_buf(),
            vm_name,
            files,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vm_name {
            Some(vm_name) => write!(
                f,
                "VM '{}' exported to {} ({} files)",
                vm_name,
                self.dir.display(),
                self.files.len()
            ),
            None => write!(f, "{} ({} files)", self.dir.display(), self.files.len()),
        }
    }
}

/// Every file below `root`, relative to it, sorted
async fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }

    files.sort();
    Ok(files)
}
