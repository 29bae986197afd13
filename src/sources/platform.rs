use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Platforms we recognize by URL. Anything else is treated as free-text
/// search input, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Spotify,
    Soundcloud,
    Bandcamp,
    Deezer,
    /// Extracted by the backend, but not one of the platforms above.
    Other,
}

/// Ordered host-pattern rules. First match wins.
static URL_PATTERNS: LazyLock<Vec<(Platform, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Platform::Youtube,
            Regex::new(r"(?:https?://)?(?:www\.|music\.)?(?:youtube\.com|youtu\.be)").unwrap(),
        ),
        (
            Platform::Spotify,
            Regex::new(r"(?:https?://)?(?:open\.)?spotify\.com").unwrap(),
        ),
        (
            Platform::Soundcloud,
            Regex::new(r"(?:https?://)?(?:www\.|m\.)?soundcloud\.com").unwrap(),
        ),
        (
            Platform::Bandcamp,
            Regex::new(r"(?:https?://)?(?:www\.)?[a-zA-Z0-9-]+\.bandcamp\.com").unwrap(),
        ),
        (
            Platform::Deezer,
            Regex::new(r"(?:https?://)?(?:www\.)?deezer\.com").unwrap(),
        ),
    ]
});

impl Platform {
    /// Classify an input string. `None` means free-text search.
    pub fn detect(input: &str) -> Option<Platform> {
        URL_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(input))
            .map(|(platform, _)| *platform)
    }

    /// True when URLs of this platform cannot be handed to the extraction
    /// backend directly and must first be expanded into search queries.
    pub fn requires_expansion(&self) -> bool {
        matches!(self, Platform::Spotify)
    }

    /// Map a backend extractor id (e.g. "youtube", "Soundcloud") back to a
    /// platform.
    pub fn from_extractor(id: &str) -> Platform {
        let id = id.to_ascii_lowercase();
        if id.starts_with("youtube") {
            Platform::Youtube
        } else if id.starts_with("soundcloud") {
            Platform::Soundcloud
        } else if id.starts_with("bandcamp") {
            Platform::Bandcamp
        } else if id.starts_with("deezer") {
            Platform::Deezer
        } else if id.starts_with("spotify") {
            Platform::Spotify
        } else {
            Platform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Soundcloud => "soundcloud",
            Platform::Bandcamp => "bandcamp",
            Platform::Deezer => "deezer",
            Platform::Other => "other",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
