use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::common::errors::PlayerError;
use crate::common::types::ChannelId;
use crate::configs::PlaybackConfig;
use crate::player::audio::{AudioOutput, CompletionCallback};
use crate::player::queue::TrackQueue;
use crate::player::state::{PlaybackState, PlayerEvent, SessionStatus};
use crate::player::track::TrackInfo;
use crate::sources::extractor::{ExtractMode, Extractor};
use crate::sources::resolver::SourceResolver;

type Reply<T> = oneshot::Sender<Result<T, PlayerError>>;

/// Everything a session reacts to: user commands and notifications from
/// contexts outside the actor (stream resolution tasks, the audio
/// pipeline's completion callback). One queue, processed in submission
/// order; this is the session's single-flight serialization point.
enum SessionMessage {
    Enqueue {
        tracks: Vec<TrackInfo>,
        reply: Reply<usize>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Skip {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    ToggleLoop {
        reply: oneshot::Sender<bool>,
    },
    Shuffle {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    StoreSearch {
        candidates: Vec<TrackInfo>,
        reply: oneshot::Sender<()>,
    },
    Select {
        index: usize,
        reply: Reply<TrackInfo>,
    },
    /// Stream resolution finished for the attempt that spawned it.
    StreamReady {
        attempt: u64,
        result: Result<String, PlayerError>,
    },
    /// The audio pipeline's completion callback, re-submitted as a message.
    PlaybackEnded {
        attempt: u64,
        error: Option<String>,
    },
    Shutdown,
}

struct PendingSearch {
    candidates: Vec<TrackInfo>,
    expires_at: Instant,
}

enum Flow {
    Continue,
    Shutdown,
}

/// Per-session orchestrator. Owns the queue and the playback state; every
/// transition happens inside `run`, one message at a time. Suspension
/// points (stream resolution) are spawned off and rejoin as messages
/// tagged with an attempt number so stale results are discarded.
struct PlayerSession {
    channel_id: ChannelId,
    queue: TrackQueue,
    state: PlaybackState,
    now_playing: Option<TrackInfo>,
    loop_enabled: bool,
    pending_search: Option<PendingSearch>,
    /// Bumped whenever the current playback slot is superseded. Messages
    /// carrying an older attempt are stale.
    attempt: u64,
    /// Consecutive start failures; reset when a track reaches `Playing`.
    failures: u32,
    tx: Sender<SessionMessage>,
    rx: Receiver<SessionMessage>,
    events: Sender<PlayerEvent>,
    audio: Arc<dyn AudioOutput>,
    extractor: Arc<dyn Extractor>,
    config: PlaybackConfig,
}

impl PlayerSession {
    async fn run(mut self) {
        debug!("session {} started", self.channel_id);
        while let Ok(message) = self.rx.recv_async().await {
            if let Flow::Shutdown = self.handle(message) {
                break;
            }
        }
        self.state = PlaybackState::Stopping;
        self.attempt += 1;
        self.audio.stop();
        self.queue.clear();
        debug!("session {} stopped", self.channel_id);
    }

    fn handle(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::Enqueue { tracks, reply } => {
                self.queue.enqueue(tracks);
                if self.state == PlaybackState::Idle {
                    // A fresh user request clears any earlier failure run.
                    self.failures = 0;
                    self.start_next();
                }
                let _ = reply.send(Ok(self.queue.len()));
            }
            SessionMessage::Pause { reply } => {
                let _ = reply.send(if self.state == PlaybackState::Playing {
                    self.audio.pause();
                    self.state = PlaybackState::Paused;
                    Ok(())
                } else {
                    Err(PlayerError::InvalidState("nothing is playing".to_string()))
                });
            }
            SessionMessage::Resume { reply } => {
                let _ = reply.send(if self.state == PlaybackState::Paused {
                    self.audio.resume();
                    self.state = PlaybackState::Playing;
                    Ok(())
                } else {
                    Err(PlayerError::InvalidState("nothing is paused".to_string()))
                });
            }
            SessionMessage::Skip { reply } => {
                if self.state.is_active() {
                    self.supersede();
                    let _ = reply.send(Ok(()));
                    self.start_next();
                } else {
                    let _ = reply.send(Err(PlayerError::InvalidState(
                        "nothing to skip".to_string(),
                    )));
                }
            }
            SessionMessage::Stop { reply } => {
                if !self.state.is_active() && self.queue.is_empty() {
                    let _ = reply.send(Err(PlayerError::InvalidState(
                        "nothing is playing".to_string(),
                    )));
                } else {
                    self.queue.clear();
                    if self.state.is_active() {
                        self.supersede();
                    }
                    self.state = PlaybackState::Idle;
                    let _ = reply.send(Ok(()));
                }
            }
            SessionMessage::ToggleLoop { reply } => {
                self.loop_enabled = !self.loop_enabled;
                let _ = reply.send(self.loop_enabled);
            }
            SessionMessage::Shuffle { reply } => {
                self.queue.shuffle_remaining();
                let _ = reply.send(());
            }
            SessionMessage::Status { reply } => {
                let _ = reply.send(SessionStatus {
                    state: self.state,
                    now_playing: self.now_playing.clone(),
                    queue: self.queue.snapshot(),
                    loop_enabled: self.loop_enabled,
                });
            }
            SessionMessage::StoreSearch { candidates, reply } => {
                self.pending_search = Some(PendingSearch {
                    candidates,
                    expires_at: Instant::now()
                        + Duration::from_secs(self.config.select_timeout_secs),
                });
                let _ = reply.send(());
            }
            SessionMessage::Select { index, reply } => {
                let _ = reply.send(self.select(index));
            }
            SessionMessage::StreamReady { attempt, result } => {
                self.on_stream_ready(attempt, result);
            }
            SessionMessage::PlaybackEnded { attempt, error } => {
                self.on_playback_ended(attempt, error);
            }
            SessionMessage::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    /// Invalidate the current playback slot: any in-flight resolution result
    /// or completion callback for it will be discarded on arrival.
    fn supersede(&mut self) {
        self.attempt += 1;
        self.audio.stop();
        self.now_playing = None;
    }

    fn select(&mut self, index: usize) -> Result<TrackInfo, PlayerError> {
        let pending = self
            .pending_search
            .take()
            .ok_or_else(|| PlayerError::InvalidState("no search in progress".to_string()))?;

        if Instant::now() > pending.expires_at {
            // Prompt expired: cancelled, nothing selected, queue untouched.
            return Err(PlayerError::InvalidState(
                "search selection timed out".to_string(),
            ));
        }

        match pending.candidates.get(index).cloned() {
            Some(track) => Ok(track),
            None => {
                let len = pending.candidates.len();
                self.pending_search = Some(pending);
                Err(PlayerError::InvalidState(format!(
                    "no such result: {} of {len}",
                    index + 1
                )))
            }
        }
    }

    /// Dequeue the next track and kick off its deferred stream resolution.
    /// Reverts to idle when the queue is exhausted or the failure ceiling
    /// is reached (keeping whatever is still queued).
    fn start_next(&mut self) {
        if self.failures >= self.config.max_consecutive_failures {
            warn!(
                "session {}: {} consecutive start failures, giving up",
                self.channel_id, self.failures
            );
            self.emit(PlayerEvent::SessionFailed {
                message: format!(
                    "{} tracks in a row failed to start; queue kept, try again",
                    self.failures
                ),
            });
            self.failures = 0;
            self.state = PlaybackState::Idle;
            self.now_playing = None;
            return;
        }

        let Some(track) = self.queue.dequeue_front() else {
            if self.state.is_active() {
                self.emit(PlayerEvent::QueueFinished);
            }
            self.state = PlaybackState::Idle;
            self.now_playing = None;
            return;
        };

        self.attempt += 1;
        self.state = PlaybackState::Starting;
        self.now_playing = Some(track.clone());

        let attempt = self.attempt;
        let extractor = self.extractor.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = extractor
                .extract(&track.identifier, ExtractMode::Single)
                .await
                .and_then(|extraction| {
                    extraction
                        .entries
                        .into_iter()
                        .next()
                        .map(|entry| entry.stream_url.unwrap_or(entry.webpage_url))
                        .ok_or_else(|| {
                            PlayerError::Resolution(format!(
                                "no stream for '{}'",
                                track.identifier
                            ))
                        })
                });
            let _ = tx.send(SessionMessage::StreamReady { attempt, result });
        });
    }

    fn on_stream_ready(&mut self, attempt: u64, result: Result<String, PlayerError>) {
        if attempt != self.attempt || self.state != PlaybackState::Starting {
            trace!(
                "session {}: discarding stale stream result (attempt {attempt})",
                self.channel_id
            );
            return;
        }

        let stream_url = match result {
            Ok(url) => url,
            Err(e) => {
                self.fail_current(e.to_string());
                return;
            }
        };

        let tx = self.tx.clone();
        let completed_attempt = self.attempt;
        let on_complete: CompletionCallback = Box::new(move |error| {
            // Foreign execution context: hand the event to the actor, never
            // touch session state from here.
            let _ = tx.send(SessionMessage::PlaybackEnded {
                attempt: completed_attempt,
                error,
            });
        });

        match self.audio.play(&stream_url, on_complete) {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                self.failures = 0;
                if let Some(track) = &self.now_playing {
                    info!("session {}: now playing '{}'", self.channel_id, track.title);
                    self.emit(PlayerEvent::TrackStarted(track.clone()));
                }
            }
            Err(e) => self.fail_current(e.to_string()),
        }
    }

    fn on_playback_ended(&mut self, attempt: u64, error: Option<String>) {
        if attempt != self.attempt
            || !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
        {
            trace!(
                "session {}: discarding superseded completion (attempt {attempt})",
                self.channel_id
            );
            return;
        }

        match error {
            None => {
                if let Some(track) = self.now_playing.take() {
                    self.emit(PlayerEvent::TrackEnded(track.clone()));
                    if self.loop_enabled {
                        self.queue.requeue_to_back(track);
                    }
                }
                self.start_next();
            }
            Some(message) => self.fail_current(message),
        }
    }

    /// Discard the failed track and try the next one, counting toward the
    /// consecutive-failure ceiling.
    fn fail_current(&mut self, message: String) {
        self.failures += 1;
        if let Some(track) = self.now_playing.take() {
            warn!(
                "session {}: '{}' failed ({}), advancing",
                self.channel_id, track.title, message
            );
            self.emit(PlayerEvent::TrackFailed { track, message });
        }
        self.start_next();
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

/// Command surface of one session. Cheap to clone via `Arc`; resolution
/// network I/O runs in the caller's context, only the resulting state
/// transition is submitted to the actor.
pub struct SessionHandle {
    channel_id: ChannelId,
    tx: Sender<SessionMessage>,
    events: Receiver<PlayerEvent>,
    resolver: Arc<SourceResolver>,
}

impl SessionHandle {
    pub(crate) fn spawn(
        channel_id: ChannelId,
        resolver: Arc<SourceResolver>,
        extractor: Arc<dyn Extractor>,
        audio: Arc<dyn AudioOutput>,
        config: PlaybackConfig,
    ) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();

        let session = PlayerSession {
            channel_id,
            queue: TrackQueue::new(),
            state: PlaybackState::Idle,
            now_playing: None,
            loop_enabled: false,
            pending_search: None,
            attempt: 0,
            failures: 0,
            tx: tx.clone(),
            rx,
            events: event_tx,
            audio,
            extractor,
            config,
        };
        tokio::spawn(session.run());

        Arc::new(Self {
            channel_id,
            tx,
            events: event_rx,
            resolver,
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Subscribe to session notifications.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events.clone()
    }

    /// Resolve user input and append the result to the queue, starting
    /// playback when the session was idle. Returns what was enqueued.
    pub async fn play(
        &self,
        input: &str,
        force_search: bool,
    ) -> Result<Vec<TrackInfo>, PlayerError> {
        let tracks = self.resolver.resolve(input, force_search).await?;
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::Enqueue {
            tracks: tracks.clone(),
            reply,
        })?;
        rx.await.map_err(|_| session_gone())??;
        Ok(tracks)
    }

    /// Multi-result search; candidates stay selectable until the configured
    /// timeout expires.
    pub async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, PlayerError> {
        let candidates = self.resolver.search(query).await?;
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::StoreSearch {
            candidates: candidates.clone(),
            reply,
        })?;
        rx.await.map_err(|_| session_gone())?;
        Ok(candidates)
    }

    /// Pick a previous search result by index and enqueue it.
    pub async fn select(&self, index: usize) -> Result<Vec<TrackInfo>, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::Select { index, reply })?;
        let track = rx.await.map_err(|_| session_gone())??;
        self.play(&track.identifier, false).await
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionMessage::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionMessage::Resume { reply }).await
    }

    pub async fn skip(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionMessage::Skip { reply }).await
    }

    /// Halt playback and drop the queue.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionMessage::Stop { reply }).await
    }

    pub async fn toggle_loop(&self) -> Result<bool, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::ToggleLoop { reply })?;
        rx.await.map_err(|_| session_gone())
    }

    pub async fn shuffle(&self) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::Shuffle { reply })?;
        rx.await.map_err(|_| session_gone())
    }

    pub async fn status(&self) -> Result<SessionStatus, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::Status { reply })?;
        rx.await.map_err(|_| session_gone())
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(SessionMessage::Shutdown);
    }

    async fn request(
        &self,
        build: impl FnOnce(Reply<()>) -> SessionMessage,
    ) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| session_gone())?
    }

    fn send(&self, message: SessionMessage) -> Result<(), PlayerError> {
        self.tx.send(message).map_err(|_| session_gone())
    }
}

fn session_gone() -> PlayerError {
    PlayerError::InvalidState("session is shutting down".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::{MockAudio, StubExtractor};
    use crate::sources::resolver::MetadataExpander;

    struct NoExpander;

    #[async_trait::async_trait]
    impl MetadataExpander for NoExpander {
        async fn expand(&self, _url: &str) -> Result<Vec<String>, PlayerError> {
            Err(PlayerError::UnsupportedReference("not used here".to_string()))
        }
    }

    fn harness(extractor: StubExtractor) -> (Arc<SessionHandle>, Arc<MockAudio>) {
        harness_with_config(extractor, PlaybackConfig::default())
    }

    fn harness_with_config(
        extractor: StubExtractor,
        config: PlaybackConfig,
    ) -> (Arc<SessionHandle>, Arc<MockAudio>) {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        let audio = Arc::new(MockAudio::new());
        let resolver = Arc::new(SourceResolver::new(
            extractor.clone(),
            Arc::new(NoExpander),
            5,
        ));
        let handle = SessionHandle::spawn(
            ChannelId(42),
            resolver,
            extractor,
            audio.clone(),
            config,
        );
        (handle, audio)
    }

    async fn next_event(events: &Receiver<PlayerEvent>) -> PlayerEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv_async())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed")
    }

    async fn expect_started(events: &Receiver<PlayerEvent>, title: &str) {
        match next_event(events).await {
            PlayerEvent::TrackStarted(track) => assert_eq!(track.title, title),
            other => panic!("expected TrackStarted({title}), got {other:?}"),
        }
    }

    async fn expect_ended(events: &Receiver<PlayerEvent>, title: &str) {
        match next_event(events).await {
            PlayerEvent::TrackEnded(track) => assert_eq!(track.title, title),
            other => panic!("expected TrackEnded({title}), got {other:?}"),
        }
    }

    async fn expect_failed(events: &Receiver<PlayerEvent>, title: &str) {
        match next_event(events).await {
            PlayerEvent::TrackFailed { track, .. } => assert_eq!(track.title, title),
            other => panic!("expected TrackFailed({title}), got {other:?}"),
        }
    }

    fn url(name: &str) -> String {
        format!("https://soundcloud.com/test/{name}")
    }

    #[tokio::test]
    async fn plays_queued_tracks_in_fifo_order() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();

        expect_started(&events, "a").await;
        assert!(audio.complete(None));
        expect_ended(&events, "a").await;
        expect_started(&events, "b").await;
        assert!(audio.complete(None));
        expect_ended(&events, "b").await;
        assert!(matches!(next_event(&events).await, PlayerEvent::QueueFinished));

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(status.queue.is_empty());
        assert!(status.now_playing.is_none());

        assert_eq!(
            audio.play_log(),
            vec![
                format!("stream://{}", url("a")),
                format!("stream://{}", url("b")),
            ]
        );
        assert!(!audio.overlapped());
    }

    #[tokio::test]
    async fn loop_mode_requeues_finished_track_to_back() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        assert!(handle.toggle_loop().await.unwrap());
        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();

        expect_started(&events, "a").await;
        audio.complete(None);
        expect_ended(&events, "a").await;
        // a moved behind b: the queue is now [b, a]
        expect_started(&events, "b").await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.queue.len(), 1);
        assert_eq!(status.queue[0].title, "a");

        audio.complete(None);
        expect_ended(&events, "b").await;
        expect_started(&events, "a").await;
    }

    #[tokio::test]
    async fn skip_discards_current_and_starts_next() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();
        expect_started(&events, "a").await;

        handle.skip().await.unwrap();
        expect_started(&events, "b").await;

        audio.complete(None);
        expect_ended(&events, "b").await;
        assert!(matches!(next_event(&events).await, PlayerEvent::QueueFinished));

        // Nothing active anymore
        let err = handle.skip().await.unwrap_err();
        assert!(matches!(err, PlayerError::InvalidState(_)));
        assert!(!audio.overlapped());
    }

    #[tokio::test]
    async fn pause_and_resume_enforce_preconditions() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        assert!(matches!(
            handle.pause().await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));

        handle.play(&url("a"), false).await.unwrap();
        expect_started(&events, "a").await;

        handle.pause().await.unwrap();
        assert_eq!(handle.status().await.unwrap().state, PlaybackState::Paused);
        assert!(!audio.is_playing());
        assert!(matches!(
            handle.pause().await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));

        handle.resume().await.unwrap();
        assert_eq!(handle.status().await.unwrap().state, PlaybackState::Playing);
        assert!(matches!(
            handle.resume().await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn stop_halts_playback_and_drops_queue() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();
        expect_started(&events, "a").await;

        handle.stop().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(status.queue.is_empty());
        assert!(status.now_playing.is_none());

        // Stopped stream never completes
        assert!(!audio.complete(None));

        assert!(matches!(
            handle.stop().await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn auto_advance_skips_failing_tracks_without_exhausting_ceiling() {
        let extractor = StubExtractor::failing([url("b"), url("c")])
            .with_playlist("https://soundcloud.com/test/sets/mix", &[
                url("a"),
                url("b"),
                url("c"),
                url("d"),
                url("e"),
            ]);
        let (handle, audio) = harness(extractor);
        let events = handle.events();

        let tracks = handle
            .play("https://soundcloud.com/test/sets/mix", false)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 5);

        expect_started(&events, "a").await;
        audio.complete(None);
        expect_ended(&events, "a").await;
        expect_failed(&events, "b").await;
        expect_failed(&events, "c").await;
        expect_started(&events, "d").await;
        audio.complete(None);
        expect_ended(&events, "d").await;
        expect_started(&events, "e").await;
        audio.complete(None);
        expect_ended(&events, "e").await;
        assert!(matches!(next_event(&events).await, PlayerEvent::QueueFinished));

        assert_eq!(
            audio.play_log(),
            vec![
                format!("stream://{}", url("a")),
                format!("stream://{}", url("d")),
                format!("stream://{}", url("e")),
            ]
        );
    }

    #[tokio::test]
    async fn failure_ceiling_reverts_to_idle_with_queue_intact() {
        let extractor = StubExtractor::failing([url("a"), url("b"), url("c")])
            .with_playlist("https://soundcloud.com/test/sets/bad", &[
                url("a"),
                url("b"),
                url("c"),
                url("d"),
            ]);
        let (handle, audio) = harness(extractor);
        let events = handle.events();

        handle
            .play("https://soundcloud.com/test/sets/bad", false)
            .await
            .unwrap();

        expect_failed(&events, "a").await;
        expect_failed(&events, "b").await;
        expect_failed(&events, "c").await;
        assert!(matches!(
            next_event(&events).await,
            PlayerEvent::SessionFailed { .. }
        ));

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.queue.len(), 1);
        assert_eq!(status.queue[0].title, "d");
        assert!(audio.play_log().is_empty());

        // A manual retry picks the kept queue back up, front first.
        handle.play(&url("e"), false).await.unwrap();
        expect_started(&events, "d").await;
    }

    #[tokio::test]
    async fn interleaved_completion_and_skip_dequeue_one_track_per_slot() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();
        handle.play(&url("c"), false).await.unwrap();
        expect_started(&events, "a").await;

        // Natural end and a skip land back to back: the completion is
        // applied first and starts b; the skip then supersedes b's
        // in-flight start and moves on to c. b's stream result arrives
        // stale and is dropped.
        audio.complete(None);
        handle.skip().await.unwrap();

        expect_ended(&events, "a").await;
        expect_started(&events, "c").await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.now_playing.as_ref().unwrap().title, "c");
        assert!(status.queue.is_empty());

        assert_eq!(
            audio.play_log(),
            vec![
                format!("stream://{}", url("a")),
                format!("stream://{}", url("c")),
            ]
        );
        assert!(!audio.overlapped());
    }

    #[tokio::test]
    async fn late_completion_of_superseded_track_is_discarded() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();
        expect_started(&events, "a").await;

        // Keep a's completion callback alive past the skip, as if the audio
        // thread delivered it a beat too late.
        let stale = audio.steal_callback().expect("a should be live");
        handle.skip().await.unwrap();
        expect_started(&events, "b").await;

        stale(None);

        // The stale completion must not have ended b or advanced the queue.
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.now_playing.as_ref().unwrap().title, "b");

        audio.complete(None);
        expect_ended(&events, "b").await;
        assert!(matches!(next_event(&events).await, PlayerEvent::QueueFinished));
        assert!(!audio.overlapped());
    }

    #[tokio::test]
    async fn mid_stream_error_counts_toward_auto_advance() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        handle.play(&url("a"), false).await.unwrap();
        handle.play(&url("b"), false).await.unwrap();
        expect_started(&events, "a").await;

        audio.complete(Some("decoder blew up".to_string()));
        expect_failed(&events, "a").await;
        expect_started(&events, "b").await;
    }

    #[tokio::test]
    async fn search_select_enqueues_the_chosen_candidate() {
        let (handle, audio) = harness(StubExtractor::new());
        let events = handle.events();

        let candidates = handle.search("lofi beats").await.unwrap();
        assert_eq!(candidates.len(), 1);

        // Out-of-range selection leaves the prompt usable.
        assert!(matches!(
            handle.select(5).await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));

        let tracks = handle.select(0).await.unwrap();
        assert_eq!(tracks.len(), 1);
        expect_started(&events, "lofi beats").await;
        assert!(audio.is_playing());
    }

    #[tokio::test]
    async fn select_without_a_search_is_an_invalid_state() {
        let (handle, _audio) = harness(StubExtractor::new());
        assert!(matches!(
            handle.select(0).await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn expired_search_prompt_selects_nothing() {
        let config = PlaybackConfig {
            select_timeout_secs: 0,
            ..PlaybackConfig::default()
        };
        let (handle, _audio) = harness_with_config(StubExtractor::new(), config);

        handle.search("lofi beats").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            handle.select(0).await.unwrap_err(),
            PlayerError::InvalidState(_)
        ));
        // Expiry must not have touched the queue.
        assert!(handle.status().await.unwrap().queue.is_empty());
    }
}
