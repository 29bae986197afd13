use serde::{Deserialize, Serialize};

use crate::sources::extractor::ExtractedEntry;
use crate::sources::platform::Platform;

/// A resolved, playable track. Immutable once enqueued: queue positions are
/// replaced wholesale, never field-mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    /// Stable reference the extraction backend can resume from. Stream
    /// resolution is deferred to dequeue time because direct stream URLs
    /// expire.
    pub identifier: String,
    /// URL suitable for display to the user.
    pub uri: String,
    /// 0 means unknown.
    pub length_ms: u64,
    pub artwork_url: Option<String>,
    /// "Unknown" when the backend reported none.
    pub author: String,
    pub source: Platform,
}

impl TrackInfo {
    pub fn from_entry(entry: ExtractedEntry) -> Self {
        Self {
            title: entry.title,
            identifier: entry.webpage_url.clone(),
            uri: entry.webpage_url,
            length_ms: entry.duration_ms,
            artwork_url: entry.thumbnail,
            author: entry.uploader,
            source: Platform::from_extractor(&entry.extractor_id),
        }
    }

    /// "m:ss" display form, "?" when the length is unknown.
    pub fn length_display(&self) -> String {
        if self.length_ms == 0 {
            return "?".to_string();
        }
        let total_secs = self.length_ms / 1000;
        format!("{}:{:02}", total_secs / 60, total_secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_mapping_keeps_stable_reference() {
        let entry = ExtractedEntry {
            title: "Song".to_string(),
            webpage_url: "https://www.youtube.com/watch?v=abc".to_string(),
            stream_url: Some("https://cdn/expiring".to_string()),
            duration_ms: 212_000,
            thumbnail: None,
            uploader: "Artist".to_string(),
            extractor_id: "youtube".to_string(),
        };
        let track = TrackInfo::from_entry(entry);
        // The expiring stream URL must not leak into the descriptor.
        assert_eq!(track.identifier, "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.source, Platform::Youtube);
        assert_eq!(track.length_display(), "3:32");
    }

    #[test]
    fn unknown_length_displays_as_question_mark() {
        let entry = ExtractedEntry {
            title: "Stream".to_string(),
            webpage_url: "https://x".to_string(),
            stream_url: None,
            duration_ms: 0,
            thumbnail: None,
            uploader: "Unknown".to_string(),
            extractor_id: "generic".to_string(),
        };
        assert_eq!(TrackInfo::from_entry(entry).length_display(), "?");
    }
}
