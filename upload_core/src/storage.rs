//! Upload folder handling
//!
//! Resolves client supplied names to paths inside the upload folder and
//! stages incoming bytes so a file only appears under its final name once it
//! is complete.

use crate::error::{PathRejection, StartupError};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Maximum file name length in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Prefix of staging files. Leading dot keeps them out of listings.
pub const STAGING_PREFIX: &str = ".upload-";

/// Windows device names that cannot be used as file names
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// The directory all uploads are stored in and served from
#[derive(Debug, Clone)]
pub struct UploadRoot {
    path: PathBuf,
}

impl UploadRoot {
    /// Create the folder if needed and pin its canonical location
    pub async fn create(folder: &Path) -> Result<Self, StartupError> {
        let to_err = |source| StartupError::UploadRoot {
            path: folder.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(folder).await.map_err(to_err)?;
        let path = tokio::fs::canonicalize(folder).await.map_err(to_err)?;
        if !tokio::fs::metadata(&path).await.map_err(to_err)?.is_dir() {
            return Err(to_err(io::Error::other("not a directory")));
        }

        Ok(Self { path })
    }

    /// Canonical absolute path of the folder
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pick and validate the name an uploaded part is stored under.
    ///
    /// A non-empty `explicit` name (the `file` form field) wins over the
    /// part's own file name.
    pub fn resolve_upload(
        &self,
        explicit: Option<&str>,
        original: &str,
    ) -> Result<(String, PathBuf), PathRejection> {
        let name = explicit.filter(|n| !n.is_empty()).unwrap_or(original);
        validate_file_name(name)?;
        Ok((name.to_string(), self.path.join(name)))
    }

    /// Map a URL path below the listing route to a path in the folder.
    ///
    /// Purely lexical: `..` and backslashes are refused, empty and `.`
    /// segments are skipped. Hidden segments are reported as `None` so the
    /// caller answers 404 without revealing them.
    pub fn resolve_request(&self, request_path: &str) -> Result<Option<PathBuf>, PathRejection> {
        let mut path = self.path.clone();
        for segment in request_path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathRejection::Traversal),
                s if s.contains('\\') => return Err(PathRejection::Separator),
                s if s.chars().any(char::is_control) => {
                    return Err(PathRejection::ControlCharacter);
                }
                s if s.starts_with('.') => return Ok(None),
                s => path.push(s),
            }
        }
        Ok(Some(path))
    }

    /// Confirm an existing path does not leave the folder through symlinks
    pub async fn contains_canonical(&self, path: &Path) -> io::Result<bool> {
        let canonical = tokio::fs::canonicalize(path).await?;
        Ok(canonical.starts_with(&self.path))
    }
}

/// Reject anything that is not a single plain file name
pub fn validate_file_name(name: &str) -> Result<(), PathRejection> {
    if name.is_empty() || name.trim().is_empty() {
        return Err(PathRejection::Empty);
    }
    if name == "." || name == ".." {
        return Err(PathRejection::Traversal);
    }
    if name.contains(['/', '\\']) {
        return Err(PathRejection::Separator);
    }
    if name.chars().any(char::is_control) {
        return Err(PathRejection::ControlCharacter);
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(PathRejection::TooLong {
            max: MAX_FILENAME_LENGTH,
        });
    }
    let stem = name.split('.').next().unwrap_or(name);
    if RESERVED_NAMES.iter().any(|r| stem.eq_ignore_ascii_case(r)) {
        return Err(PathRejection::Reserved);
    }
    Ok(())
}

/// A file being received into the upload folder under a hidden name.
///
/// Dropping it without [`StagedFile::persist`] deletes the partial data, so
/// aborted or failed uploads never show up under their final name.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    persisted: bool,
}

impl StagedFile {
    pub async fn create(root: &UploadRoot) -> io::Result<Self> {
        let path = root
            .path()
            .join(format!("{}{}.part", STAGING_PREFIX, Uuid::new_v4().simple()));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o644);
        let file = options.open(&path).await?;

        Ok(Self {
            path,
            file: Some(file),
            written: 0,
            persisted: false,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already closed"))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and close the handle
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the data to `dest`, replacing any existing file
    pub async fn persist(mut self, dest: &Path) -> io::Result<u64> {
        self.finish().await?;
        tokio::fs::rename(&self.path, dest).await?;
        self.persisted = true;
        Ok(self.written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.file.take();
        // Drop cannot await; one unlink on the runtime thread is acceptable
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Could not remove staging file {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_root() -> (tempfile::TempDir, UploadRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = UploadRoot::create(dir.path()).await.unwrap();
        (dir, root)
    }

    #[test]
    fn test_validate_file_name_basic() {
        assert!(validate_file_name("normal_file.txt").is_ok());
        assert!(validate_file_name("photo 2024 (1).JPG").is_ok());
        assert!(validate_file_name(".bashrc").is_ok());
        assert!(validate_file_name("concert.txt").is_ok());
    }

    #[test]
    fn test_validate_file_name_traversal() {
        assert_eq!(
            validate_file_name("../../etc/passwd"),
            Err(PathRejection::Separator)
        );
        assert_eq!(validate_file_name("/etc/passwd"), Err(PathRejection::Separator));
        assert_eq!(
            validate_file_name("..\\..\\Windows\\System32\\cmd.exe"),
            Err(PathRejection::Separator)
        );
        assert_eq!(validate_file_name(".."), Err(PathRejection::Traversal));
        assert_eq!(validate_file_name("."), Err(PathRejection::Traversal));
    }

    #[test]
    fn test_validate_file_name_dangerous() {
        assert_eq!(validate_file_name(""), Err(PathRejection::Empty));
        assert_eq!(validate_file_name("   "), Err(PathRejection::Empty));
        assert_eq!(
            validate_file_name("evil\0.txt"),
            Err(PathRejection::ControlCharacter)
        );
        assert_eq!(
            validate_file_name("line\nbreak"),
            Err(PathRejection::ControlCharacter)
        );
    }

    #[test]
    fn test_validate_file_name_reserved() {
        assert_eq!(validate_file_name("CON"), Err(PathRejection::Reserved));
        assert_eq!(validate_file_name("nul.txt"), Err(PathRejection::Reserved));
        assert_eq!(validate_file_name("com1"), Err(PathRejection::Reserved));
    }

    #[test]
    fn test_validate_file_name_length() {
        let ok = "a".repeat(MAX_FILENAME_LENGTH);
        assert!(validate_file_name(&ok).is_ok());

        // 🦀 is 4 bytes
        let crabs = "🦀".repeat(64) + ".txt";
        assert_eq!(
            validate_file_name(&crabs),
            Err(PathRejection::TooLong {
                max: MAX_FILENAME_LENGTH
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_upload_prefers_explicit_name() {
        let (_dir, root) = temp_root().await;

        let (name, path) = root
            .resolve_upload(Some("custom.png"), "ignored.jpg")
            .unwrap();
        assert_eq!(name, "custom.png");
        assert_eq!(path, root.path().join("custom.png"));

        let (name, _) = root.resolve_upload(Some(""), "original.jpg").unwrap();
        assert_eq!(name, "original.jpg");

        let (name, _) = root.resolve_upload(None, "original.jpg").unwrap();
        assert_eq!(name, "original.jpg");

        assert_eq!(
            root.resolve_upload(Some("../../etc/passwd"), "ok.txt"),
            Err(PathRejection::Separator)
        );
    }

    #[tokio::test]
    async fn test_resolve_request() {
        let (_dir, root) = temp_root().await;

        assert_eq!(root.resolve_request("").unwrap(), Some(root.path().to_path_buf()));
        assert_eq!(
            root.resolve_request("sub/./a.txt").unwrap(),
            Some(root.path().join("sub").join("a.txt"))
        );
        assert_eq!(
            root.resolve_request("sub/../../secret"),
            Err(PathRejection::Traversal)
        );
        assert_eq!(
            root.resolve_request("..\\secret"),
            Err(PathRejection::Separator)
        );
        assert_eq!(root.resolve_request(".upload-x.part").unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let root = UploadRoot::create(&nested).await.unwrap();
        assert!(root.path().is_dir());
        assert!(root.path().is_absolute());
    }

    #[tokio::test]
    async fn test_create_root_on_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            UploadRoot::create(&file).await,
            Err(StartupError::UploadRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_staged_file_persist() {
        let (_dir, root) = temp_root().await;

        let mut staged = StagedFile::create(&root).await.unwrap();
        staged.write_chunk(b"hello ").await.unwrap();
        staged.write_chunk(b"world").await.unwrap();
        let staging_path = staged.path().to_path_buf();
        assert!(staging_path.exists());

        let dest = root.path().join("greeting.txt");
        let size = staged.persist(&dest).await.unwrap();

        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!staging_path.exists());
    }

    #[tokio::test]
    async fn test_staged_file_dropped_is_removed() {
        let (_dir, root) = temp_root().await;

        let mut staged = StagedFile::create(&root).await.unwrap();
        staged.write_chunk(b"partial").await.unwrap();
        let staging_path = staged.path().to_path_buf();
        drop(staged);

        assert!(!staging_path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_persist_removes_staging() {
        let (_dir, root) = temp_root().await;
        std::fs::create_dir(root.path().join("occupied")).unwrap();
        std::fs::write(root.path().join("occupied").join("keep"), b"k").unwrap();

        let mut staged = StagedFile::create(&root).await.unwrap();
        staged.write_chunk(b"data").await.unwrap();
        let staging_path = staged.path().to_path_buf();

        assert!(staged.persist(&root.path().join("occupied")).await.is_err());
        assert!(!staging_path.exists());
        assert!(root.path().join("occupied").join("keep").exists());
    }

    #[tokio::test]
    async fn test_persist_replaces_existing() {
        let (_dir, root) = temp_root().await;
        let dest = root.path().join("same.txt");
        std::fs::write(&dest, b"first").unwrap();

        let mut staged = StagedFile::create(&root).await.unwrap();
        staged.write_chunk(b"second").await.unwrap();
        staged.persist(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
    }
}
