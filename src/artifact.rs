//! SpreadsheetArtifact - the spreadsheet carried across scans.
//!
//! The server owns row accumulation. Each scan response carries the whole
//! updated workbook, which overwrites the local copy; nothing is merged
//! client-side.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Filename used when no spreadsheet was uploaded.
pub const DEFAULT_FILENAME: &str = "marks.xlsx";

/// Distinguishes artifacts within one process in handle names.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Spreadsheet extensions accepted for upload.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Errors from artifact upload, download, and handle management.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("No spreadsheet yet. Scan once or upload a file first")]
    NoArtifact,

    #[error("Unsupported spreadsheet file '{0}'. Expected .xlsx or .xls")]
    UnsupportedExtension(String),

    #[error("Spreadsheet file '{0}' is empty")]
    Empty(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A session-scoped file exposing one generation of the artifact bytes.
///
/// Handles are revoked (their file deleted) as soon as the artifact they
/// were issued for is superseded.
#[derive(Debug)]
pub struct DownloadHandle {
    path: PathBuf,
    generation: u64,
}

impl DownloadHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn revoke(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Revoked download handle {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to revoke download handle {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[derive(Debug)]
struct ArtifactFile {
    bytes: Vec<u8>,
    filename: String,
}

/// The current spreadsheet and its download handle.
#[derive(Debug)]
pub struct SpreadsheetArtifact {
    current: Option<ArtifactFile>,
    handle: Option<DownloadHandle>,
    handle_dir: PathBuf,
    /// `<pid>.<n>` prefix keeping handles of concurrent sessions apart
    owner: String,
    default_filename: String,
    generation: u64,
}

impl SpreadsheetArtifact {
    /// Create an absent artifact ("new file").
    ///
    /// `handle_dir` is created lazily when the first handle is issued.
    pub fn new(handle_dir: PathBuf, default_filename: impl Into<String>) -> Self {
        Self {
            current: None,
            handle: None,
            handle_dir,
            owner: format!(
                "{}.{}",
                std::process::id(),
                NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
            ),
            default_filename: default_filename.into(),
            generation: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.current.is_some()
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|f| f.bytes.as_slice())
    }

    /// Name the artifact downloads as.
    pub fn filename(&self) -> &str {
        self.current
            .as_ref()
            .map(|f| f.filename.as_str())
            .unwrap_or(&self.default_filename)
    }

    /// Label for status displays: the filename, or "New File" when absent.
    pub fn display_name(&self) -> &str {
        match &self.current {
            Some(f) => &f.filename,
            None => "New File",
        }
    }

    pub fn download_handle(&self) -> Option<&DownloadHandle> {
        self.handle.as_ref()
    }

    /// Number of replacements applied so far in this session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Make an uploaded spreadsheet the current artifact.
    ///
    /// Any previously issued download handle is revoked; the uploaded bytes
    /// are already available to the operator locally.
    pub fn load_upload(&mut self, path: &Path) -> Result<(), ArtifactError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        validate_extension(&filename)?;

        let bytes = std::fs::read(path).map_err(|e| ArtifactError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.seed(bytes, filename)
    }

    /// Make in-memory spreadsheet bytes the current artifact.
    pub fn seed(&mut self, bytes: Vec<u8>, filename: String) -> Result<(), ArtifactError> {
        validate_extension(&filename)?;
        if bytes.is_empty() {
            return Err(ArtifactError::Empty(filename));
        }

        self.revoke_handle();
        log::info!(
            "Loaded spreadsheet {} ({} bytes, {})",
            filename,
            bytes.len(),
            fingerprint(&bytes)
        );
        self.current = Some(ArtifactFile { bytes, filename });
        Ok(())
    }

    /// Overwrite the artifact with bytes returned by the server.
    ///
    /// The bytes are stored exactly as given. The filename of the previous
    /// artifact is kept, or the default name is used. A fresh download
    /// handle is issued and the previous one revoked. The returned error
    /// only concerns the handle; the bytes are replaced regardless.
    pub fn replace(&mut self, bytes: Vec<u8>) -> Result<&DownloadHandle, ArtifactError> {
        let filename = self.filename().to_string();
        self.generation += 1;
        log::info!(
            "Spreadsheet replaced (generation {}, {} bytes, {})",
            self.generation,
            bytes.len(),
            fingerprint(&bytes)
        );

        self.revoke_handle();
        self.current = Some(ArtifactFile { bytes, filename });
        self.issue_handle()
    }

    /// Copy the current bytes to `dest`.
    ///
    /// If `dest` is an existing directory the artifact filename is appended.
    pub fn save_to(&self, dest: &Path) -> Result<PathBuf, ArtifactError> {
        let file = self.current.as_ref().ok_or(ArtifactError::NoArtifact)?;
        let target = if dest.is_dir() {
            dest.join(&file.filename)
        } else {
            dest.to_path_buf()
        };

        std::fs::write(&target, &file.bytes).map_err(|e| ArtifactError::Io {
            path: target.clone(),
            source: e,
        })?;
        log::info!("Saved spreadsheet to {}", target.display());
        Ok(target)
    }

    fn issue_handle(&mut self) -> Result<&DownloadHandle, ArtifactError> {
        let file = self.current.as_ref().ok_or(ArtifactError::NoArtifact)?;

        std::fs::create_dir_all(&self.handle_dir).map_err(|e| ArtifactError::Io {
            path: self.handle_dir.clone(),
            source: e,
        })?;

        let path = self.handle_dir.join(format!(
            "{}-{}-{}-{}",
            self.owner,
            self.generation,
            fingerprint(&file.bytes),
            file.filename
        ));
        std::fs::write(&path, &file.bytes).map_err(|e| ArtifactError::Io {
            path: path.clone(),
            source: e,
        })?;

        Ok(&*self.handle.insert(DownloadHandle {
            path,
            generation: self.generation,
        }))
    }

    fn revoke_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.revoke();
        }
    }
}

impl Drop for SpreadsheetArtifact {
    fn drop(&mut self) {
        self.revoke_handle();
    }
}

/// Short SHA-256 fingerprint for logs and handle names.
///
/// Returns 16 hex characters (first 8 bytes of the digest).
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

/// Default directory for download handles.
pub fn default_handle_dir() -> PathBuf {
    std::env::temp_dir().join("mark-scanner").join("downloads")
}

fn validate_extension(filename: &str) -> Result<(), ArtifactError> {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match ext {
        Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ArtifactError::UnsupportedExtension(filename.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact_in(dir: &TempDir) -> SpreadsheetArtifact {
        SpreadsheetArtifact::new(dir.path().join("handles"), DEFAULT_FILENAME)
    }

    #[test]
    fn test_new_artifact_is_absent() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact_in(&dir);
        assert!(!artifact.is_present());
        assert!(artifact.bytes().is_none());
        assert_eq!(artifact.filename(), "marks.xlsx");
        assert_eq!(artifact.display_name(), "New File");
        assert!(artifact.download_handle().is_none());
    }

    #[test]
    fn test_replace_sets_bytes_and_issues_handle() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);

        let handle_path = artifact.replace(b"PK\x03\x04first".to_vec()).unwrap().path().to_path_buf();
        assert_eq!(artifact.bytes(), Some(&b"PK\x03\x04first"[..]));
        assert_eq!(artifact.filename(), "marks.xlsx");
        assert_eq!(std::fs::read(&handle_path).unwrap(), b"PK\x03\x04first");
        assert_eq!(artifact.generation(), 1);
    }

    #[test]
    fn test_replace_revokes_previous_handle() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);

        let first = artifact.replace(b"one".to_vec()).unwrap().path().to_path_buf();
        let second = artifact.replace(b"two".to_vec()).unwrap().path().to_path_buf();

        assert_ne!(first, second);
        assert!(!first.exists(), "superseded handle should be revoked");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert_eq!(artifact.download_handle().unwrap().generation(), 2);
    }

    #[test]
    fn test_replace_keeps_uploaded_filename() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        artifact
            .seed(b"seed".to_vec(), "class-7b.xlsx".to_string())
            .unwrap();

        let handle = artifact.replace(b"updated".to_vec()).unwrap();
        assert!(handle
            .path()
            .to_string_lossy()
            .ends_with("class-7b.xlsx"));
        assert_eq!(artifact.filename(), "class-7b.xlsx");
        assert_eq!(artifact.bytes(), Some(&b"updated"[..]));
    }

    #[test]
    fn test_upload_resets_download_handle() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        let old = artifact.replace(b"scanned".to_vec()).unwrap().path().to_path_buf();

        let upload = dir.path().join("Term1.XLSX");
        std::fs::write(&upload, b"uploaded").unwrap();
        artifact.load_upload(&upload).unwrap();

        assert!(artifact.download_handle().is_none());
        assert!(!old.exists());
        assert_eq!(artifact.filename(), "Term1.XLSX");
        assert_eq!(artifact.bytes(), Some(&b"uploaded"[..]));
    }

    #[test]
    fn test_upload_rejects_wrong_extension() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        let upload = dir.path().join("marks.csv");
        std::fs::write(&upload, b"a,b").unwrap();

        assert!(matches!(
            artifact.load_upload(&upload),
            Err(ArtifactError::UnsupportedExtension(_))
        ));
        assert!(!artifact.is_present());
    }

    #[test]
    fn test_upload_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        let upload = dir.path().join("empty.xls");
        std::fs::write(&upload, b"").unwrap();

        assert!(matches!(
            artifact.load_upload(&upload),
            Err(ArtifactError::Empty(_))
        ));
    }

    #[test]
    fn test_upload_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        assert!(matches!(
            artifact.load_upload(&dir.path().join("missing.xlsx")),
            Err(ArtifactError::Io { .. })
        ));
    }

    #[test]
    fn test_save_to_directory_uses_filename() {
        let dir = TempDir::new().unwrap();
        let mut artifact = artifact_in(&dir);
        artifact.replace(b"bytes".to_vec()).unwrap();

        let out = TempDir::new().unwrap();
        let saved = artifact.save_to(out.path()).unwrap();
        assert_eq!(saved, out.path().join("marks.xlsx"));
        assert_eq!(std::fs::read(saved).unwrap(), b"bytes");
    }

    #[test]
    fn test_save_without_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact_in(&dir);
        assert!(matches!(
            artifact.save_to(dir.path()),
            Err(ArtifactError::NoArtifact)
        ));
    }

    #[test]
    fn test_drop_revokes_handle() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut artifact = artifact_in(&dir);
            artifact.replace(b"temp".to_vec()).unwrap().path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_concurrent_artifacts_do_not_share_handles() {
        let dir = TempDir::new().unwrap();
        let mut first = artifact_in(&dir);
        let mut second = artifact_in(&dir);

        let kept = first.replace(b"same".to_vec()).unwrap().path().to_path_buf();
        let dropped = second.replace(b"same".to_vec()).unwrap().path().to_path_buf();
        assert_ne!(kept, dropped);

        drop(second);
        assert!(!dropped.exists());
        assert_eq!(std::fs::read(&kept).unwrap(), b"same");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), "ba7816bf8f01cfea");
        assert_eq!(fingerprint(b"abc").len(), 16);
    }
}
