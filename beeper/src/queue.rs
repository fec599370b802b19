//! Queued-buffer bookkeeping for a streaming source
//!
//! A streaming device consumes one continuous run of samples, but the engine
//! thinks in whole buffers. `PlaybackQueue` maps between the two: every
//! enqueued buffer occupies a span of absolute sample offsets, and the device
//! only has to report how many samples it has consumed so far.
//!
//! Stopping marks everything pushed so far for discarding, so all queued
//! buffers count as processed immediately, the same way a stopped source
//! reports its whole queue as processed.

use std::collections::VecDeque;

use crate::backend::{BackendError, BufferHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedSpan {
    buffer: BufferHandle,
    /// Absolute sample offset one past the buffer's last sample
    end: u64,
}

/// Play queue of a single source, in absolute sample offsets
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    spans: VecDeque<QueuedSpan>,
    /// Total samples ever pushed
    pushed: u64,
    /// Samples before this offset are dropped unplayed
    discard_until: u64,
    playing: bool,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buffer of `len` samples appended to the stream
    ///
    /// Returns the new total of pushed samples.
    pub fn enqueue(&mut self, buffer: BufferHandle, len: usize) -> u64 {
        self.pushed += len as u64;
        self.spans.push_back(QueuedSpan {
            buffer,
            end: self.pushed,
        });
        self.pushed
    }

    /// Buffers fully consumed (or discarded) given the device's consumed count
    pub fn processed(&self, consumed: u64) -> usize {
        let done = consumed.max(self.discard_until);
        self.spans.iter().take_while(|span| span.end <= done).count()
    }

    /// Remove `count` processed buffers from the front of the queue
    pub fn unqueue(
        &mut self,
        count: usize,
        consumed: u64,
    ) -> Result<Vec<BufferHandle>, BackendError> {
        if count > self.processed(consumed) {
            return Err(BackendError::InvalidHandle);
        }
        Ok(self.spans.drain(..count).map(|span| span.buffer).collect())
    }

    /// Whether `buffer` is still attached to the queue
    pub fn contains(&self, buffer: BufferHandle) -> bool {
        self.spans.iter().any(|span| span.buffer == buffer)
    }

    /// Queued buffers, processed or not
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop playback and discard everything pushed so far
    ///
    /// Returns the offset the device must skip to.
    pub fn stop(&mut self) -> u64 {
        self.playing = false;
        self.discard_until = self.pushed;
        self.discard_until
    }

    /// Playing means started and not yet run dry
    pub fn is_playing(&self, consumed: u64) -> bool {
        self.playing && consumed.max(self.discard_until) < self.pushed
    }

    /// Total samples ever pushed
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Forget all spans (source released)
    pub fn clear(&mut self) -> u64 {
        self.spans.clear();
        self.stop()
    }
}
