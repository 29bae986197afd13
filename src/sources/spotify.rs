use std::sync::LazyLock;
use std::time::{Duration, Instant};

use base64::prelude::*;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::common::errors::PlayerError;
use crate::common::http::HttpClient;
use crate::configs::SpotifyConfig;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"spotify\.com/(?:intl-[a-z]{2}(?:-[A-Z]{2})?/)?(track|album|playlist)/([a-zA-Z0-9]+)")
        .unwrap()
});

/// Reference shapes we know how to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyRef {
    Track(String),
    Album(String),
    Playlist(String),
}

pub fn parse_reference(url: &str) -> Option<SpotifyRef> {
    let caps = REF_RE.captures(url)?;
    let id = caps[2].to_string();
    match &caps[1] {
        "track" => Some(SpotifyRef::Track(id)),
        "album" => Some(SpotifyRef::Album(id)),
        "playlist" => Some(SpotifyRef::Playlist(id)),
        _ => None,
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Expands Spotify catalog references into search queries for the
/// extraction backend.
///
/// Track references run through an ordered fallback chain, each stage
/// evaluated only when the previous one declined: authenticated metadata
/// API, page-title scrape, URL slug. The last stage always produces a
/// query, so a track reference never hard-fails. Album and playlist
/// expansion needs the authenticated API; there is no scraping fallback
/// for those.
pub struct SpotifyResolver {
    client: reqwest::Client,
    config: SpotifyConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyResolver {
    pub fn new(config: Option<SpotifyConfig>) -> Self {
        Self {
            client: HttpClient::new().unwrap_or_default(),
            config: config.unwrap_or_default(),
            token: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.has_credentials()
    }

    /// Expand a catalog URL into one search query per contained track.
    pub async fn expand(&self, url: &str) -> Result<Vec<String>, PlayerError> {
        let reference = parse_reference(url).ok_or_else(|| {
            PlayerError::UnsupportedReference(
                "unsupported Spotify URL: expected a track, album or playlist link".to_string(),
            )
        })?;

        match reference {
            SpotifyRef::Track(id) => Ok(vec![self.track_query(&id, url).await]),
            SpotifyRef::Album(id) => {
                self.require_credentials("album")?;
                self.album_queries(&id).await
            }
            SpotifyRef::Playlist(id) => {
                self.require_credentials("playlist")?;
                self.playlist_queries(&id).await
            }
        }
    }

    fn require_credentials(&self, kind: &str) -> Result<(), PlayerError> {
        if self.has_credentials() {
            Ok(())
        } else {
            Err(PlayerError::UnsupportedReference(format!(
                "Spotify {kind} links need API credentials; paste a direct link or a song name instead"
            )))
        }
    }

    /// Track fallback chain. Never fails: the slug stage always yields a
    /// query, however degraded.
    async fn track_query(&self, id: &str, url: &str) -> String {
        if self.has_credentials() {
            match self.api_track_query(id).await {
                Ok(query) => return query,
                Err(e) => {
                    debug!("metadata API unavailable for track {id}: {e}; trying page scrape")
                }
            }
        }

        match self.scrape_title_query(url).await {
            Ok(query) => return query,
            Err(e) => debug!("page scrape failed for {url}: {e}; deriving query from URL slug"),
        }

        slug_query(url)
    }

    async fn bearer_token(&self) -> Result<String, PlayerError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let (id, secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(PlayerError::Upstream("no Spotify credentials".to_string())),
        };

        let basic = BASE64_STANDARD.encode(format!("{id}:{secret}"));
        let response = self
            .client
            .post(ACCOUNTS_URL)
            .header("Authorization", format!("Basic {basic}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| PlayerError::Upstream(format!("token request rejected: {e}")))?;

        let body: Value = response.json().await?;
        let value = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| PlayerError::Upstream("token response missing access_token".into()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        // Refresh a little early so in-flight requests never race expiry.
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in.saturating_sub(30)),
        });
        Ok(value)
    }

    async fn api_get(&self, path: &str) -> Result<Value, PlayerError> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(format!("{API_BASE}/{path}"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| PlayerError::Upstream(e.to_string()))?;
        Ok(response.json().await?)
    }

    async fn api_track_query(&self, id: &str) -> Result<String, PlayerError> {
        let track = self.api_get(&format!("tracks/{id}")).await?;
        query_from_track(&track)
            .ok_or_else(|| PlayerError::Upstream("track response missing name".to_string()))
    }

    async fn album_queries(&self, id: &str) -> Result<Vec<String>, PlayerError> {
        let album = self.api_get(&format!("albums/{id}")).await?;
        let items = album
            .get("tracks")
            .and_then(|t| t.get("items"))
            .and_then(Value::as_array)
            .ok_or_else(|| PlayerError::Upstream("album response missing tracks".to_string()))?;

        // Catalog order is preserved; entries the API returns malformed are
        // dropped rather than failing the whole album.
        Ok(items.iter().filter_map(query_from_track).collect())
    }

    async fn playlist_queries(&self, id: &str) -> Result<Vec<String>, PlayerError> {
        let playlist = self.api_get(&format!("playlists/{id}")).await?;
        let items = playlist
            .get("tracks")
            .and_then(|t| t.get("items"))
            .and_then(Value::as_array)
            .ok_or_else(|| PlayerError::Upstream("playlist response missing tracks".to_string()))?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("track"))
            .filter_map(query_from_track)
            .collect())
    }

    async fn scrape_title_query(&self, url: &str) -> Result<String, PlayerError> {
        let page = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| PlayerError::Upstream(e.to_string()))?
            .text()
            .await?;

        let title = extract_page_title(&page)
            .ok_or_else(|| PlayerError::Upstream("page has no title tag".to_string()))?;
        let cleaned = clean_page_title(&title);
        if cleaned.is_empty() {
            return Err(PlayerError::Upstream("page title was empty".to_string()));
        }
        Ok(cleaned)
    }
}

/// Build "title artist artist..." from a track object, tolerating both the
/// flat and the nested shapes the API returns.
fn query_from_track(track: &Value) -> Option<String> {
    let track = if track.get("name").is_some() {
        track
    } else {
        track.get("track")?
    };

    let name = track.get("name").and_then(Value::as_str)?;
    let artists = track
        .get("artists")
        .and_then(Value::as_array)
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    if artists.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{name} {artists}"))
    }
}

fn extract_page_title(html: &str) -> Option<String> {
    let start = html.find("<title>")? + "<title>".len();
    let end = html[start..].find("</title>")? + start;
    Some(html[start..end].to_string())
}

/// Strip the boilerplate Spotify appends to page titles.
pub fn clean_page_title(title: &str) -> String {
    let title = title.split(" - song by ").next().unwrap_or(title);
    let title = title.split(" - song and lyrics by ").next().unwrap_or(title);
    let title = title.split(" | Spotify").next().unwrap_or(title);
    title.trim().to_string()
}

/// Last-resort query: the URL's final path segment with hyphens replaced by
/// spaces. Degraded output, but never a hard failure.
pub fn slug_query(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path);
    segment.replace('-', " ")
}
