//! Shared mocks for actor tests: a scriptable extraction backend and an
//! audio pipeline that records stream lifecycles and lets tests drive
//! completion callbacks from outside the actor.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::common::errors::PlayerError;
use crate::player::audio::{AudioOutput, AudioOutputFactory, CompletionCallback};
use crate::sources::extractor::{ExtractMode, ExtractedEntry, ExtractionResult, Extractor};

/// Extractor stub. Every reference resolves to a one-entry result whose
/// stream URL is derived from the reference. References registered as
/// failing only fail in `Single` mode, i.e. at dequeue-time stream
/// resolution, so tests can enqueue them and then watch auto-advance.
/// Registered playlists expand into one entry per item.
pub(crate) struct StubExtractor {
    failing: HashSet<String>,
    playlists: HashMap<String, Vec<String>>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            playlists: HashMap::new(),
        }
    }

    pub fn failing(references: impl IntoIterator<Item = String>) -> Self {
        Self {
            failing: references.into_iter().collect(),
            playlists: HashMap::new(),
        }
    }

    pub fn with_playlist(mut self, reference: &str, items: &[String]) -> Self {
        self.playlists.insert(reference.to_string(), items.to_vec());
        self
    }
}

fn stub_entry(reference: &str) -> ExtractedEntry {
    ExtractedEntry {
        title: reference
            .rsplit('/')
            .next()
            .unwrap_or(reference)
            .to_string(),
        webpage_url: reference.to_string(),
        stream_url: Some(format!("stream://{reference}")),
        duration_ms: 60_000,
        thumbnail: None,
        uploader: "Stub".to_string(),
        extractor_id: "soundcloud".to_string(),
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(
        &self,
        reference: &str,
        mode: ExtractMode,
    ) -> Result<ExtractionResult, PlayerError> {
        if mode == ExtractMode::Single && self.failing.contains(reference) {
            return Err(PlayerError::Resolution(format!("stub failure for {reference}")));
        }
        let entries = match self.playlists.get(reference) {
            Some(items) => items.iter().map(|item| stub_entry(item)).collect(),
            None => vec![stub_entry(reference)],
        };
        Ok(ExtractionResult {
            entries,
            skipped: 0,
        })
    }
}

/// Audio pipeline mock. `overlapped` flips if a second stream is started
/// while one is still live, which is exactly the serialization violation
/// the orchestrator must prevent.
pub(crate) struct MockAudio {
    active: Mutex<Option<CompletionCallback>>,
    plays: Mutex<Vec<String>>,
    overlapped: AtomicBool,
    paused: AtomicBool,
}

impl MockAudio {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            plays: Mutex::new(Vec::new()),
            overlapped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    /// Fire the live stream's completion callback, as the audio subsystem
    /// would from its own thread. Returns false when no stream is live.
    pub fn complete(&self, error: Option<String>) -> bool {
        let callback = self.active.lock().unwrap().take();
        match callback {
            Some(callback) => {
                callback(error);
                true
            }
            None => false,
        }
    }

    /// Take the live callback without ending the stream, so a test can
    /// deliver it late, after the slot has been superseded.
    pub fn steal_callback(&self) -> Option<CompletionCallback> {
        self.active.lock().unwrap().take()
    }

    pub fn play_log(&self) -> Vec<String> {
        self.plays.lock().unwrap().clone()
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

impl AudioOutput for MockAudio {
    fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> Result<(), PlayerError> {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        *active = Some(on_complete);
        self.paused.store(false, Ordering::SeqCst);
        self.plays.lock().unwrap().push(stream_url.to_string());
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        // Dropping the callback models the pipeline's exactly-once
        // guarantee: a stopped stream never completes.
        *self.active.lock().unwrap() = None;
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.active.lock().unwrap().is_some() && !self.paused.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockAudioFactory;

impl AudioOutputFactory for MockAudioFactory {
    fn open(&self) -> Arc<dyn AudioOutput> {
        Arc::new(MockAudio::new())
    }
}
