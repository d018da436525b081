//! Per-job working directories on the local filesystem.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<job_id>/input_<i>_<name>        uploaded bytes
//! <root>/<job_id>/output_<i>_<stem>.<ext> converted files
//! <root>/<job_id>/converted_<job_id>.zip  the job's archive
//! ```

use std::path::{Path, PathBuf};

use hf_core::{JobId, Result, TargetFormat};

/// Filesystem wrapper that allocates and reclaims job directories.
#[derive(Debug, Clone)]
pub struct TempStorage {
    root: PathBuf,
}

impl TempStorage {
    /// Open (and create if needed) the storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove job directories (and stray archives) left by an earlier
    /// process. Anything else under the root is left untouched. Returns the
    /// number of entries removed.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !is_job_entry(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            tracing::debug!(path = %path.display(), "Purged stale job entry");
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of job entries currently on disk.
    pub fn entry_count(&self) -> usize {
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| is_job_entry(&e.file_name().to_string_lossy()))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn job_dir(&self, id: JobId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn create_job_dir(&self, id: JobId) -> Result<PathBuf> {
        let dir = self.job_dir(id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persist one uploaded file into the job directory.
    pub async fn write_input(
        &self,
        id: JobId,
        index: usize,
        name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self
            .job_dir(id)
            .join(format!("input_{index}_{}", sanitize_file_name(name)));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub fn output_path(&self, id: JobId, index: usize, stem: &str, format: TargetFormat) -> PathBuf {
        self.job_dir(id).join(format!(
            "output_{index}_{}.{}",
            sanitize_file_name(stem),
            format.extension()
        ))
    }

    pub fn archive_path(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join(format!("converted_{id}.zip"))
    }

    /// Delete inputs and intermediate outputs, keeping only the archive.
    pub fn remove_working_files(&self, id: JobId) -> Result<()> {
        let archive = self.archive_path(id);
        for entry in std::fs::read_dir(self.job_dir(id))? {
            let path = entry?.path();
            if path != archive && path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Delete a job directory. A directory that is already gone is not an error.
    pub fn remove_job_dir(&self, id: JobId) -> Result<()> {
        match std::fs::remove_dir_all(self.job_dir(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a top-level name under the root was created by this service:
/// a job directory or a `converted_<id>.zip` archive.
fn is_job_entry(name: &str) -> bool {
    let id = name
        .strip_prefix("converted_")
        .and_then(|rest| rest.strip_suffix(".zip"))
        .unwrap_or(name);
    id.parse::<JobId>().is_ok()
}

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
