use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::common::errors::PlayerError;
use crate::player::track::TrackInfo;
use crate::sources::extractor::{ExtractMode, ExtractionResult, Extractor};
use crate::sources::platform::Platform;
use crate::sources::spotify::SpotifyResolver;

/// Expands a platform catalog URL into search queries for the extraction
/// backend. Implemented by `SpotifyResolver`.
#[async_trait]
pub trait MetadataExpander: Send + Sync {
    async fn expand(&self, url: &str) -> Result<Vec<String>, PlayerError>;
}

#[async_trait]
impl MetadataExpander for SpotifyResolver {
    async fn expand(&self, url: &str) -> Result<Vec<String>, PlayerError> {
        SpotifyResolver::expand(self, url).await
    }
}

/// Composes platform detection, metadata expansion and the extraction
/// backend into one `resolve` operation.
pub struct SourceResolver {
    extractor: Arc<dyn Extractor>,
    expander: Arc<dyn MetadataExpander>,
    search_limit: usize,
}

impl SourceResolver {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        expander: Arc<dyn MetadataExpander>,
        search_limit: usize,
    ) -> Self {
        Self {
            extractor,
            expander,
            search_limit,
        }
    }

    /// Resolve user input into one or more playable descriptors.
    ///
    /// Partial success over a collection is not an error; only zero usable
    /// entries is.
    pub async fn resolve(
        &self,
        input: &str,
        force_search: bool,
    ) -> Result<Vec<TrackInfo>, PlayerError> {
        let platform = if force_search {
            None
        } else {
            Platform::detect(input)
        };

        let mut tracks = Vec::new();
        let mut skipped = 0usize;
        let mut last_error: Option<PlayerError> = None;

        match platform {
            Some(platform) if platform.requires_expansion() => {
                // One single-result search per expanded query, catalog order.
                let queries = self.expander.expand(input).await?;
                debug!("expanded {} into {} queries", input, queries.len());
                for query in &queries {
                    match self.extractor.extract(query, ExtractMode::Search(1)).await {
                        Ok(result) => {
                            skipped += result.skipped;
                            match result.entries.into_iter().next() {
                                Some(entry) => tracks.push(TrackInfo::from_entry(entry)),
                                None => skipped += 1,
                            }
                        }
                        Err(e) => {
                            skipped += 1;
                            last_error = Some(e);
                        }
                    }
                }
            }
            Some(_) => {
                // Direct URL from a platform the backend handles itself.
                let result = self
                    .extractor
                    .extract(input, ExtractMode::Playlist)
                    .await?;
                skipped += result.skipped;
                tracks.extend(result.entries.into_iter().map(TrackInfo::from_entry));
            }
            None => {
                // Free text: single-result search, top hit only.
                let result = self.extractor.extract(input, ExtractMode::Search(1)).await?;
                skipped += result.skipped;
                if let Some(entry) = result.entries.into_iter().next() {
                    tracks.push(TrackInfo::from_entry(entry));
                }
            }
        }

        if tracks.is_empty() {
            let reason = match last_error {
                Some(e) => e.to_string(),
                None => format!("no playable entries for '{input}'"),
            };
            return Err(PlayerError::Resolution(reason));
        }

        if skipped > 0 {
            info!("resolved '{}': {} tracks, {} skipped", input, tracks.len(), skipped);
        }
        Ok(tracks)
    }

    /// Multi-result search for the interactive disambiguation surface.
    pub async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, PlayerError> {
        let result = self
            .extractor
            .extract(query, ExtractMode::Search(self.search_limit))
            .await?;
        Ok(result.entries.into_iter().map(TrackInfo::from_entry).collect())
    }
}
