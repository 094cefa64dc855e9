//! Filesystem store for uploaded course material.
//!
//! Uploads land under a fixed layout below the configured root:
//! `videos/` for video lectures, `notes/` for PDFs, `presentations/` for
//! slide decks and `thumbnails/` for course images. The database stores the
//! path relative to the root, so the root can move between environments.

use chrono::Utc;
use model::entities::content::ContentKind;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File extension '{0}' is not allowed for this content kind")]
    UnsupportedExtension(String),
    #[error("File name '{0}' is not usable")]
    InvalidName(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a removal found a file to delete. Callers treat both as success
/// but report them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];
const PRESENTATION_EXTENSIONS: &[&str] = &["ppt", "pptx"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

fn subdir_for(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Video => "videos",
        ContentKind::Pdf => "notes",
        ContentKind::Presentation => "presentations",
    }
}

fn allowed_for(kind: ContentKind) -> &'static [&'static str] {
    match kind {
        ContentKind::Video => VIDEO_EXTENSIONS,
        ContentKind::Pdf => PDF_EXTENSIONS,
        ContentKind::Presentation => PRESENTATION_EXTENSIONS,
    }
}

/// Keep letters, digits, dots, dashes and underscores; everything else
/// becomes an underscore. Strips any path components the client sent.
fn sanitize_file_name(original: &str) -> Result<String, StorageError> {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidName(original.to_string()))?;

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(|c| c == '.' || c == '_').is_empty() {
        return Err(StorageError::InvalidName(original.to_string()));
    }
    Ok(cleaned)
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Upload file provider rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and every content subdirectory.
    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        for dir in ["videos", "notes", "presentations", "thumbnails"] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        debug!("Upload layout ready under {}", self.root.display());
        Ok(())
    }

    /// Absolute path for a stored relative path.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Store an uploaded file for a content kind, returning the relative
    /// path to persist. The name is sanitized and timestamped so repeated
    /// uploads of the same file never collide.
    pub fn save(
        &self,
        kind: ContentKind,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let file_name = sanitize_file_name(original_name)?;
        let extension = extension_of(&file_name)
            .ok_or_else(|| StorageError::UnsupportedExtension(String::new()))?;
        if !allowed_for(kind).contains(&extension.as_str()) {
            return Err(StorageError::UnsupportedExtension(extension));
        }

        let stamped = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%f"), file_name);
        let relative = format!("{}/{}", subdir_for(kind), stamped);
        fs::write(self.root.join(&relative), bytes)?;
        info!("Stored {} upload at {}", subdir_for(kind), relative);
        Ok(relative)
    }

    /// Store a course thumbnail image.
    pub fn save_image(&self, original_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let file_name = sanitize_file_name(original_name)?;
        let extension = extension_of(&file_name)
            .ok_or_else(|| StorageError::UnsupportedExtension(String::new()))?;
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StorageError::UnsupportedExtension(extension));
        }

        let stamped = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%f"), file_name);
        let relative = format!("thumbnails/{stamped}");
        fs::write(self.root.join(&relative), bytes)?;
        info!("Stored thumbnail at {}", relative);
        Ok(relative)
    }

    /// Read a stored file back.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.root.join(relative))?)
    }

    /// Delete a stored file. A missing file is reported, not an error; any
    /// other I/O fault is.
    pub fn remove(&self, relative: &str) -> Result<RemoveOutcome, StorageError> {
        match fs::remove_file(self.root.join(relative)) {
            Ok(()) => {
                debug!("Removed stored file {}", relative);
                Ok(RemoveOutcome::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Stored file {} was already absent", relative);
                Ok(RemoveOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.ensure_layout().expect("layout");
        (dir, store)
    }

    #[test]
    fn save_places_files_in_the_kind_subdirectory() {
        let (_dir, store) = store();

        let video = store.save(ContentKind::Video, "intro.mp4", b"v").unwrap();
        assert!(video.starts_with("videos/"));
        assert!(video.ends_with("intro.mp4"));

        let pdf = store.save(ContentKind::Pdf, "notes.pdf", b"p").unwrap();
        assert!(pdf.starts_with("notes/"));

        let deck = store
            .save(ContentKind::Presentation, "week1.pptx", b"d")
            .unwrap();
        assert!(deck.starts_with("presentations/"));

        assert_eq!(store.read(&video).unwrap(), b"v");
    }

    #[test]
    fn save_rejects_extensions_outside_the_whitelist() {
        let (_dir, store) = store();

        let err = store.save(ContentKind::Video, "payload.exe", b"x").unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedExtension(ext) if ext == "exe"));

        // A pdf is not a valid video upload either.
        let err = store.save(ContentKind::Video, "notes.pdf", b"x").unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedExtension(_)));
    }

    #[test]
    fn save_strips_client_path_components() {
        let (_dir, store) = store();

        let stored = store
            .save(ContentKind::Pdf, "../../etc/passwd.pdf", b"x")
            .unwrap();
        assert!(stored.starts_with("notes/"));
        assert!(!stored.contains(".."));
    }

    #[test]
    fn remove_distinguishes_absent_from_removed() {
        let (_dir, store) = store();

        let stored = store.save(ContentKind::Pdf, "notes.pdf", b"x").unwrap();
        assert_eq!(store.remove(&stored).unwrap(), RemoveOutcome::Removed);
        assert_eq!(store.remove(&stored).unwrap(), RemoveOutcome::AlreadyAbsent);
    }

    #[test]
    fn save_image_accepts_images_only() {
        let (_dir, store) = store();

        let stored = store.save_image("cover.png", b"img").unwrap();
        assert!(stored.starts_with("thumbnails/"));

        let err = store.save_image("cover.mp4", b"img").unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedExtension(_)));
    }
}
