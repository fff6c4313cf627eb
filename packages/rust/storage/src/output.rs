//! Filesystem output store for generated domains.
//!
//! Layout:
//! ```text
//! <output_root>/<normalized_document_name>/
//! ├── usability_domain.txt
//! ├── usability_domain.json   (only when the response parsed)
//! ├── io_domain.txt
//! └── ...
//! ```

use std::path::{Path, PathBuf};

use bcorag_shared::{BcoRagError, Result, normalize_document_name};
use tracing::{debug, info, instrument, warn};

/// File name suffix of the raw-text artifact.
pub const RAW_SUFFIX: &str = "_domain.txt";

/// File name suffix of the structured artifact.
pub const STRUCTURED_SUFFIX: &str = "_domain.json";

/// Output store bound to one document's session directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    session_dir: PathBuf,
}

impl OutputStore {
    /// Open the store for `document_identity`, creating its session directory
    /// under `output_root` if needed.
    pub fn open(output_root: &Path, document_identity: &str) -> Result<Self> {
        let session_dir = Self::ensure_session_dir(output_root, document_identity)?;
        Ok(Self { session_dir })
    }

    /// Create `<output_root>/<normalized name>` if absent and return it.
    ///
    /// Only the leaf directory is created: a missing `output_root` is an error.
    pub fn ensure_session_dir(output_root: &Path, document_identity: &str) -> Result<PathBuf> {
        let name = normalize_document_name(document_identity);
        if name.is_empty() {
            return Err(BcoRagError::config("document identity is empty"));
        }

        let dir = output_root.join(&name);
        match std::fs::create_dir(&dir) {
            Ok(()) => {
                info!(path = %dir.display(), "created session output directory");
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => {
                debug!(path = %dir.display(), "session output directory exists");
                Ok(dir)
            }
            Err(e) => Err(BcoRagError::io(&dir, e)),
        }
    }

    /// The session directory all artifacts are written into.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Path of the raw-text artifact for `domain`.
    pub fn raw_path(&self, domain: &str) -> PathBuf {
        self.session_dir.join(format!("{domain}{RAW_SUFFIX}"))
    }

    /// Path of the structured artifact for `domain`.
    pub fn structured_path(&self, domain: &str) -> PathBuf {
        self.session_dir.join(format!("{domain}{STRUCTURED_SUFFIX}"))
    }

    /// Write the raw response text for `domain`, replacing any previous one.
    #[instrument(skip(self, text), fields(bytes = text.len()))]
    pub fn write_raw(&self, domain: &str, text: &str) -> Result<PathBuf> {
        let target = self.raw_path(domain);
        write_atomic(&target, text)?;
        debug!(path = %target.display(), "wrote raw domain");
        Ok(target)
    }

    /// Write the structured record for `domain` as pretty JSON.
    ///
    /// Returns `None` (after logging) on any serialization or I/O failure; a
    /// failed structured write never invalidates the raw artifact.
    #[instrument(skip(self, record))]
    pub fn write_structured(&self, domain: &str, record: &serde_json::Value) -> Option<PathBuf> {
        let target = self.structured_path(domain);

        let content = match serde_json::to_string_pretty(record) {
            Ok(c) => c,
            Err(e) => {
                warn!(domain, error = %e, "failed to serialize structured domain");
                return None;
            }
        };

        match write_atomic(&target, &content) {
            Ok(()) => {
                debug!(path = %target.display(), "wrote structured domain");
                Some(target)
            }
            Err(e) => {
                warn!(domain, error = %e, "failed to write structured domain");
                None
            }
        }
    }

    /// Remove a structured artifact left over from an earlier response for
    /// `domain`. Missing files are fine.
    pub fn clear_structured(&self, domain: &str) -> Result<()> {
        let target = self.structured_path(domain);
        match std::fs::remove_file(&target) {
            Ok(()) => {
                info!(path = %target.display(), "removed stale structured domain");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BcoRagError::io(&target, e)),
        }
    }
}

/// Write to a hidden temp file next to `target`, then rename over it.
fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BcoRagError::validation(format!("not a file path: {}", target.display())))?;
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| BcoRagError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        BcoRagError::io(target, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bcorag-output-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn session_dir_uses_normalized_name() {
        let tmp = temp_dir();
        let store = OutputStore::open(&tmp, "Example Paper").unwrap();
        assert_eq!(store.session_dir(), tmp.join("example_paper"));
        assert!(store.session_dir().is_dir());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_session_dir_is_idempotent() {
        let tmp = temp_dir();
        let first = OutputStore::ensure_session_dir(&tmp, "Paper").unwrap();
        let second = OutputStore::ensure_session_dir(&tmp, "Paper").unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_session_dir_does_not_create_parents() {
        let tmp = temp_dir();
        let missing_root = tmp.join("does").join("not").join("exist");
        let err = OutputStore::ensure_session_dir(&missing_root, "Paper").unwrap_err();
        assert!(matches!(err, BcoRagError::Io { .. }));
        assert!(!missing_root.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_session_dir_rejects_empty_identity() {
        let tmp = temp_dir();
        assert!(OutputStore::ensure_session_dir(&tmp, "   ").is_err());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_raw_overwrites_same_domain_only() {
        let tmp = temp_dir();
        let store = OutputStore::open(&tmp, "paper").unwrap();

        store.write_raw("usability", "first").unwrap();
        store.write_raw("io", "io text").unwrap();
        let path = store.write_raw("usability", "second").unwrap();

        assert_eq!(path, store.session_dir().join("usability_domain.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(
            std::fs::read_to_string(store.raw_path("io")).unwrap(),
            "io text"
        );

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.session_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_structured_pretty_json() {
        let tmp = temp_dir();
        let store = OutputStore::open(&tmp, "paper").unwrap();

        let record = serde_json::json!({"url": ["https://example.org"]});
        let path = store.write_structured("usability", &record).expect("written");

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, record);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_structured_failure_returns_none() {
        let tmp = temp_dir();
        let store = OutputStore::open(&tmp, "paper").unwrap();
        // A directory squatting on the target path makes the rename fail.
        std::fs::create_dir(store.structured_path("io")).unwrap();

        assert!(store.write_structured("io", &serde_json::json!([1, 2])).is_none());
        assert!(store.write_raw("io", "still fine").is_ok());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn clear_structured_removes_stale_file() {
        let tmp = temp_dir();
        let store = OutputStore::open(&tmp, "paper").unwrap();

        store.write_structured("error", &serde_json::json!({})).unwrap();
        assert!(store.structured_path("error").exists());

        store.clear_structured("error").unwrap();
        assert!(!store.structured_path("error").exists());
        // Clearing again is a no-op
        store.clear_structured("error").unwrap();

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
