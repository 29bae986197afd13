use serde::{Deserialize, Serialize};

/// Spotify Web API credentials. Optional: without them, track references
/// degrade to page scraping and album/playlist references are rejected.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SpotifyConfig {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    #[serde(rename = "clientSecret")]
    pub client_secret: Option<String>,
}

impl SpotifyConfig {
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Extraction backend (yt-dlp subprocess) settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_executable() -> String {
    "yt-dlp".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_search_limit() -> usize {
    5
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            timeout_secs: default_timeout_secs(),
            search_limit: default_search_limit(),
        }
    }
}
