//! Chunk persistence on the shared audio volume.
//!
//! Layout: `<root>/<meeting_id>/audio/<filename>`. WebSocket intake writes
//! chunks with UTC-timestamp filenames; workers and the HTTP intake resolve
//! the same path from `(meeting_id, filename)`.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Audio storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory holding a meeting's audio artifacts.
pub fn meeting_audio_dir(root: &Path, meeting_id: &str) -> PathBuf {
    root.join(meeting_id).join("audio")
}

/// Full path of one audio artifact.
pub fn chunk_path(root: &Path, meeting_id: &str, filename: &str) -> PathBuf {
    meeting_audio_dir(root, meeting_id).join(filename)
}

/// Create the storage root. Called once at startup; failure here is fatal:
/// the process must not come up without a writable shared volume.
pub fn ensure_root(root: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

/// Persist one audio chunk under a fresh UTC-timestamp filename and return
/// that filename.
pub async fn save_chunk(
    root: &Path,
    meeting_id: &str,
    data: &[u8],
) -> Result<String, StorageError> {
    let dir = meeting_audio_dir(root, meeting_id);
    tokio::fs::create_dir_all(&dir).await?;

    let filename = format!("{}.webm", Utc::now().format("%Y%m%d_%H%M%S_%f"));
    let path = dir.join(&filename);

    if let Err(err) = tokio::fs::write(&path, data).await {
        error!(
            "Error saving audio chunk for meeting {}: {}",
            meeting_id, err
        );
        return Err(err.into());
    }

    info!("Saved audio chunk: {} ({} bytes)", path.display(), data.len());
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_path_layout() {
        let path = chunk_path(Path::new("/shared"), "m1", "chunk1.webm");
        assert_eq!(path, PathBuf::from("/shared/m1/audio/chunk1.webm"));
    }

    #[tokio::test]
    async fn test_save_chunk_writes_file_with_timestamp_name() {
        let tmp = tempfile::tempdir().unwrap();

        let filename = save_chunk(tmp.path(), "m1", b"opus-bytes").await.unwrap();
        assert!(filename.ends_with(".webm"));

        let path = chunk_path(tmp.path(), "m1", &filename);
        assert_eq!(std::fs::read(path).unwrap(), b"opus-bytes");
    }

    #[tokio::test]
    async fn test_save_chunk_creates_meeting_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!tmp.path().join("m2").exists());

        save_chunk(tmp.path(), "m2", b"x").await.unwrap();
        assert!(meeting_audio_dir(tmp.path(), "m2").is_dir());
    }
}
