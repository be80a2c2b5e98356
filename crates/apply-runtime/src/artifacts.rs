//! Filesystem artifact store.
//!
//! Screenshots and run metadata live outside the core: the loop records
//! [`ArtifactId`] references only, and this store owns the bytes.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use apply_core::ids::{ArtifactId, RunId};

/// Sink for artifacts captured during a run.
pub trait ArtifactSink: Send + Sync {
    /// Persist a screenshot, returning a reference to it.
    fn save_screenshot(
        &self,
        run_id: &RunId,
        label: &str,
        base64_png: &str,
    ) -> io::Result<ArtifactId>;
}

/// Artifact store writing one directory per run.
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Create a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory for one run, created on demand.
    pub fn run_dir(&self, run_id: &RunId) -> io::Result<PathBuf> {
        let dir = self.root.join(run_id.as_str());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write run metadata as pretty JSON.
    pub fn save_metadata(&self, run_id: &RunId, metadata: &serde_json::Value) -> io::Result<PathBuf> {
        let path = self.run_dir(run_id)?.join("metadata.json");
        let body = serde_json::to_string_pretty(metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, body)?;
        Ok(path)
    }

    fn next_index(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl ArtifactSink for FilesystemArtifactStore {
    fn save_screenshot(
        &self,
        run_id: &RunId,
        label: &str,
        base64_png: &str,
    ) -> io::Result<ArtifactId> {
        let bytes = BASE64
            .decode(base64_png)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let dir = self.run_dir(run_id)?;
        let index = Self::next_index(&dir);
        let file_name = format!("{index:02}-{}.png", sanitize_label(label));
        std::fs::write(dir.join(&file_name), bytes)?;
        debug!(run_id = %run_id, file = %file_name, "screenshot saved");
        Ok(ArtifactId::from(format!("{run_id}/{file_name}")))
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "capture".to_owned()
    } else {
        cleaned
    }
}
