//! Reassembly of events split across several data frames.
//!
//! Chunks are keyed by `message_id`. A buffer is created on the first chunk,
//! filled slot by slot, and removed the moment its last slot arrives. Buffers
//! that never complete are evicted once they are older than the TTL; eviction
//! runs lazily on every insert.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Largest `sum` accepted for a single message.
pub const MAX_CHUNK_COUNT: usize = 4096;

/// Result of feeding one chunk into the cache.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Stored; more chunks are needed.
    Pending,
    /// This slot was already filled; the chunk was ignored.
    Duplicate,
    /// `seq` does not fit the buffer already open for this message.
    OutOfRange,
    /// All chunks present; the concatenated payload in `seq` order.
    Complete(Vec<u8>),
}

struct ChunkBuffer {
    parts: Vec<Option<Vec<u8>>>,
    filled: usize,
    created_at: Instant,
}

impl ChunkBuffer {
    fn new(sum: usize, created_at: Instant) -> Self {
        Self {
            parts: vec![None; sum],
            filled: 0,
            created_at,
        }
    }

    fn is_complete(&self) -> bool {
        self.filled == self.parts.len()
    }

    fn concat(self) -> Vec<u8> {
        self.parts.into_iter().flatten().flatten().collect()
    }
}

/// Per-connection chunk buffers.
pub struct ChunkCache {
    buffers: HashMap<String, ChunkBuffer>,
    ttl: Option<Duration>,
}

impl ChunkCache {
    /// Empty cache; `ttl` of `None` keeps incomplete buffers until the
    /// connection ends.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            buffers: HashMap::new(),
            ttl,
        }
    }

    /// Store chunk `seq` of `sum` for `message_id`.
    ///
    /// Callers validate `sum > 0` and `seq < sum` before calling.
    pub fn insert(
        &mut self,
        message_id: &str,
        sum: usize,
        seq: usize,
        payload: Vec<u8>,
    ) -> ChunkOutcome {
        let now = Instant::now();
        self.evict_expired(now);

        if sum == 1 && !self.buffers.contains_key(message_id) {
            return ChunkOutcome::Complete(payload);
        }

        let buffer = self
            .buffers
            .entry(message_id.to_owned())
            .or_insert_with(|| ChunkBuffer::new(sum, now));

        let Some(slot) = buffer.parts.get_mut(seq) else {
            return ChunkOutcome::OutOfRange;
        };
        if slot.is_some() {
            return ChunkOutcome::Duplicate;
        }
        *slot = Some(payload);
        buffer.filled += 1;

        if !buffer.is_complete() {
            return ChunkOutcome::Pending;
        }
        match self.buffers.remove(message_id) {
            Some(buffer) => ChunkOutcome::Complete(buffer.concat()),
            None => ChunkOutcome::Pending,
        }
    }

    /// Number of incomplete messages held.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no incomplete messages are held.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        let Some(ttl) = self.ttl else {
            return;
        };
        self.buffers.retain(|message_id, buffer| {
            let keep = now.duration_since(buffer.created_at) < ttl;
            if !keep {
                debug!(
                    message_id = %message_id,
                    received = buffer.filled,
                    sum = buffer.parts.len(),
                    "dropping incomplete chunked message"
                );
            }
            keep
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
