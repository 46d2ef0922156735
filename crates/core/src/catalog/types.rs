use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{FileEntry, SearchItem};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything known about an item beyond its search metadata. Each field
/// group has exactly one source: the file inventory and media flags come
/// from storage queries, the transcript from a finished transcription, the
/// summary from the summarizer. Merges only ever touch the fields their
/// source owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDetail {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub has_video: bool,
    /// Storage-reported transcript flag. The transcript text itself may
    /// still be unfetched.
    #[serde(default)]
    pub has_transcript: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One catalog row: search metadata plus accumulated detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item: SearchItem,
    pub detail: ItemDetail,
}

const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "aac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "flv", "mkv"];

fn has_extension(files: &[FileEntry], extensions: &[&str]) -> bool {
    files.iter().any(|f| {
        f.name
            .rsplit_once('.')
            .map(|(_, ext)| extensions.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    })
}

/// Media flags derived from a file inventory by extension.
pub fn derive_media_flags(files: &[FileEntry]) -> (bool, bool) {
    (
        has_extension(files, AUDIO_EXTENSIONS),
        has_extension(files, VIDEO_EXTENSIONS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 0,
        }
    }

    #[test]
    fn test_derive_media_flags() {
        let files = vec![entry("audio.m4a"), entry("video.mp4"), entry("notes.txt")];
        assert_eq!(derive_media_flags(&files), (true, true));

        let audio_only = vec![entry("track.MP3")];
        assert_eq!(derive_media_flags(&audio_only), (true, false));

        let nothing = vec![entry("README"), entry("transcript.srt")];
        assert_eq!(derive_media_flags(&nothing), (false, false));
    }

    #[test]
    fn test_item_detail_loads_with_missing_fields() {
        let detail: ItemDetail = serde_json::from_str(r#"{"has_audio":true}"#).unwrap();
        assert!(detail.has_audio);
        assert!(!detail.has_video);
        assert!(detail.files.is_empty());
        assert!(detail.transcript.is_none());
    }
}
