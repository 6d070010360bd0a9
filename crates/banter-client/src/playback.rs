//! In-order, non-overlapping audio playback.
//!
//! The delivery protocol hands the client outbound messages in ascending id
//! order, but batches can arrive bunched together, be re-delivered after a
//! retry, or (with a buggy transport) arrive out of order. The sequencer
//! absorbs all of that: audio plays strictly by ascending message id, one
//! artifact at a time, and no id plays twice.

use banter_types::{Direction, Message};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use thiserror::Error;

/// Playback failure from the underlying audio device.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio playback failed: {0}")]
    Sink(String),
}

/// The actual audio output.
///
/// `play` resolves only when the artifact has finished playing; the
/// sequencer relies on that to guarantee non-overlap.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync + 'static {
    async fn play(&self, audio_ref: &str) -> Result<(), PlaybackError>;
}

/// Ordered, duplicate-free playback queue over an [`AudioSink`].
pub struct PlaybackSequencer<S: AudioSink> {
    sink: S,
    /// Min-heap keyed by message id, so a late-arriving lower id still
    /// plays before a higher one that is already queued.
    queue: BinaryHeap<Reverse<(i64, String)>>,
    /// Ids currently queued, for duplicate suppression.
    queued: HashSet<i64>,
    /// Highest id that has finished playing.
    last_played: i64,
}

impl<S: AudioSink> PlaybackSequencer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            queue: BinaryHeap::new(),
            queued: HashSet::new(),
            last_played: 0,
        }
    }

    /// Queues the playable messages from a delivered batch.
    ///
    /// Only outbound messages carrying an audio reference are playable;
    /// inbound rows and degraded (text-only) replies are skipped. Returns
    /// how many messages were actually queued.
    pub fn enqueue_batch(&mut self, messages: &[Message]) -> usize {
        let mut added = 0;
        for message in messages {
            if message.direction != Direction::Outbound {
                continue;
            }
            let Some(audio_ref) = &message.audio_ref else {
                continue;
            };
            if message.id <= self.last_played || !self.queued.insert(message.id) {
                continue;
            }
            self.queue.push(Reverse((message.id, audio_ref.clone())));
            added += 1;
        }
        added
    }

    /// Plays everything queued, in ascending id order, one at a time.
    ///
    /// Returns the ids that finished playing, in play order; the caller
    /// typically reports them via `/api/delivered/{id}`. A sink failure
    /// stops the drain; the failed id stays unplayed and the caller may
    /// retry it on the next drain.
    pub async fn drain(&mut self) -> Result<Vec<i64>, PlaybackError> {
        let mut played = Vec::new();

        while let Some(Reverse((id, audio_ref))) = self.queue.pop() {
            if let Err(e) = self.sink.play(&audio_ref).await {
                // Put it back; the queue invariantly holds unplayed ids.
                self.queue.push(Reverse((id, audio_ref)));
                return Err(e);
            }
            self.queued.remove(&id);
            self.last_played = id;
            played.push(id);
        }

        Ok(played)
    }

    /// Whether anything is waiting to play.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}
