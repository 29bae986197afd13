use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::common::types::ChannelId;
use crate::configs::PlaybackConfig;
use crate::player::audio::AudioOutputFactory;
use crate::player::session::SessionHandle;
use crate::sources::extractor::Extractor;
use crate::sources::resolver::SourceResolver;

/// Session registry: at most one session per voice channel. Concurrent
/// `get_or_create` calls for the same channel resolve to the same actor.
pub struct PlayerManager {
    sessions: DashMap<ChannelId, Arc<SessionHandle>>,
    resolver: Arc<SourceResolver>,
    extractor: Arc<dyn Extractor>,
    audio_factory: Arc<dyn AudioOutputFactory>,
    config: PlaybackConfig,
}

impl PlayerManager {
    pub fn new(
        resolver: Arc<SourceResolver>,
        extractor: Arc<dyn Extractor>,
        audio_factory: Arc<dyn AudioOutputFactory>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            extractor,
            audio_factory,
            config,
        }
    }

    /// Returns the channel's session, creating it on first use. The entry
    /// guard guarantees a second caller for the same channel never spawns a
    /// second actor.
    pub fn get_or_create(&self, channel_id: ChannelId) -> Arc<SessionHandle> {
        self.sessions
            .entry(channel_id)
            .or_insert_with(|| {
                info!("creating session for channel {channel_id}");
                SessionHandle::spawn(
                    channel_id,
                    self.resolver.clone(),
                    self.extractor.clone(),
                    self.audio_factory.open(),
                    self.config.clone(),
                )
            })
            .clone()
    }

    pub fn session(&self, channel_id: ChannelId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&channel_id).map(|s| s.clone())
    }

    /// Tear a session down: playback stops, the queue is dropped and the
    /// actor exits. Used on leave and on voice-connection teardown.
    pub fn destroy(&self, channel_id: ChannelId) {
        if let Some((_, session)) = self.sessions.remove(&channel_id) {
            info!("destroying session for channel {channel_id}");
            session.shutdown();
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
