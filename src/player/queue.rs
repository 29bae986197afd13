use std::collections::VecDeque;

use rand::seq::SliceRandom;

use crate::player::track::TrackInfo;

/// Ordered track queue, FIFO by default. Owned exclusively by one session
/// actor; the head is removed only by the orchestrator.
#[derive(Debug, Default)]
pub struct TrackQueue {
    tracks: VecDeque<TrackInfo>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, tracks: impl IntoIterator<Item = TrackInfo>) {
        self.tracks.extend(tracks);
    }

    pub fn dequeue_front(&mut self) -> Option<TrackInfo> {
        self.tracks.pop_front()
    }

    pub fn peek_front(&self) -> Option<&TrackInfo> {
        self.tracks.front()
    }

    /// Loop mode: the just-finished track goes to the back.
    pub fn requeue_to_back(&mut self, track: TrackInfo) {
        self.tracks.push_back(track);
    }

    /// Random permutation of everything queued. The now-playing track lives
    /// outside the queue while active and is therefore unaffected.
    pub fn shuffle_remaining(&mut self) {
        if self.tracks.len() <= 1 {
            return;
        }
        let mut rng = rand::thread_rng();
        self.tracks.make_contiguous().shuffle(&mut rng);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TrackInfo> {
        self.tracks.iter().cloned().collect()
    }
}
