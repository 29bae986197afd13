use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::common::errors::PlayerError;
use crate::configs::ExtractorConfig;

/// How the backend should interpret a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Resolve exactly one track, never expanding playlists.
    Single,
    /// Full-text search returning up to the given number of candidates.
    Search(usize),
    /// Resolve a URL, expanding playlist references into all entries.
    Playlist,
}

/// One entry as reported by the extraction backend.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    pub title: String,
    /// Stable page URL the backend can resume extraction from later.
    pub webpage_url: String,
    /// Direct stream URL, when the backend produced one. Expires quickly;
    /// only meaningful right before handing it to the audio pipeline.
    pub stream_url: Option<String>,
    pub duration_ms: u64,
    pub thumbnail: Option<String>,
    pub uploader: String,
    pub extractor_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entries: Vec<ExtractedEntry>,
    /// Entries the backend reported but we could not use.
    pub skipped: usize,
}

/// Black-box extraction backend. Given a URL or a search query, returns
/// canonical track metadata or fails. Invoked off the session's
/// serialization point; implementations may block on network I/O.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, reference: &str, mode: ExtractMode)
    -> Result<ExtractionResult, PlayerError>;
}

/// Production extractor shelling out to yt-dlp with JSON output.
pub struct YtDlpExtractor {
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn build_args(reference: &str, mode: ExtractMode) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-warnings".to_string(),
            "--ignore-errors".to_string(),
        ];
        match mode {
            ExtractMode::Single => {
                args.push("--no-playlist".to_string());
                args.push(reference.to_string());
            }
            ExtractMode::Playlist => {
                args.push("--yes-playlist".to_string());
                args.push(reference.to_string());
            }
            ExtractMode::Search(limit) => {
                args.push(format!("ytsearch{}:{}", limit.max(1), reference));
            }
        }
        args
    }

    fn parse_output(raw: &[u8]) -> Result<ExtractionResult, PlayerError> {
        let root: Value = serde_json::from_slice(raw)
            .map_err(|e| PlayerError::Resolution(format!("unreadable extractor output: {e}")))?;

        let mut result = ExtractionResult::default();

        match root.get("entries").and_then(Value::as_array) {
            Some(entries) => {
                for entry in entries {
                    match entry_from_value(entry) {
                        Some(parsed) => result.entries.push(parsed),
                        None => {
                            // Null entries are how yt-dlp reports tracks it
                            // failed to extract inside an otherwise valid
                            // playlist. Skip them, keep the batch.
                            result.skipped += 1;
                            trace!("skipping unusable playlist entry: {entry}");
                        }
                    }
                }
            }
            None => match entry_from_value(&root) {
                Some(parsed) => result.entries.push(parsed),
                None => result.skipped += 1,
            },
        }

        Ok(result)
    }
}

fn entry_from_value(value: &Value) -> Option<ExtractedEntry> {
    if value.is_null() {
        return None;
    }

    let title = value.get("title").and_then(Value::as_str)?.to_string();
    let webpage_url = value
        .get("webpage_url")
        .or_else(|| value.get("original_url"))
        .or_else(|| value.get("url"))
        .and_then(Value::as_str)?
        .to_string();

    let duration_ms = value
        .get("duration")
        .and_then(Value::as_f64)
        .map(|secs| (secs * 1000.0) as u64)
        .unwrap_or(0);

    Some(ExtractedEntry {
        title,
        webpage_url,
        stream_url: value
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration_ms,
        thumbnail: value
            .get("thumbnail")
            .and_then(Value::as_str)
            .map(str::to_string),
        uploader: value
            .get("uploader")
            .or_else(|| value.get("channel"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        extractor_id: value
            .get("extractor")
            .or_else(|| value.get("ie_key"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    })
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(
        &self,
        reference: &str,
        mode: ExtractMode,
    ) -> Result<ExtractionResult, PlayerError> {
        let args = Self::build_args(reference, mode);
        debug!("running {} {}", self.config.executable, args.join(" "));

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            Command::new(&self.config.executable)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| {
            PlayerError::Resolution(format!(
                "extractor timed out after {}s for '{reference}'",
                self.config.timeout_secs
            ))
        })?
        .map_err(|e| {
            PlayerError::Resolution(format!("failed to run {}: {e}", self.config.executable))
        })?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().last().unwrap_or("extractor failed").trim();
            warn!("extractor failed for '{}': {}", reference, message);
            return Err(PlayerError::Resolution(message.to_string()));
        }

        Self::parse_output(&output.stdout)
    }
}
