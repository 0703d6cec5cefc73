//! Score tracking and the side channel that reports it.
//!
//! The score board counts collected markers over the whole process, across
//! episode boundaries; callers decide when (if ever) to reset it. The side
//! channel serializes score snapshots into the fixed 8-byte wire form a
//! trainer-side listener expects.

use forager_core::{CollectionObserver, MarkerKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Byte length of one score message: two little-endian i32 values.
pub const SCORE_MESSAGE_LEN: usize = 8;

/// Errors produced when decoding score messages.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Message payload is not exactly [`SCORE_MESSAGE_LEN`] bytes.
    #[error("score message must be {SCORE_MESSAGE_LEN} bytes, got {0}")]
    BadLength(usize),
}

/// Running tally of collected markers.
///
/// The counters are lifetime totals, not per-episode: they keep climbing
/// until [`ScoreBoard::reset`] is called explicitly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBoard {
    good: i32,
    bad: i32,
}

impl ScoreBoard {
    /// Create a zeroed score board.
    #[must_use]
    pub const fn new() -> Self {
        Self { good: 0, bad: 0 }
    }

    /// Good markers collected so far.
    #[must_use]
    pub const fn good(&self) -> i32 {
        self.good
    }

    /// Bad markers collected so far.
    #[must_use]
    pub const fn bad(&self) -> i32 {
        self.bad
    }

    /// Record one collection of the given kind.
    pub fn record(&mut self, kind: MarkerKind) {
        if kind.is_good() {
            self.good += 1;
        } else {
            self.bad += 1;
        }
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Thread-shareable score board usable as a world collection observer.
///
/// Clones share the same counters; a poisoned lock is recovered rather than
/// propagated since the counters stay valid after a panic elsewhere.
#[derive(Debug, Clone, Default)]
pub struct SharedScoreBoard {
    inner: Arc<Mutex<ScoreBoard>>,
}

impl SharedScoreBoard {
    /// Create a zeroed shared score board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current counters.
    #[must_use]
    pub fn snapshot(&self) -> ScoreBoard {
        *self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero both counters.
    pub fn reset(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

impl CollectionObserver for SharedScoreBoard {
    fn on_collected(&mut self, kind: MarkerKind) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(kind);
    }
}

/// Builder for an outgoing side-channel payload.
#[derive(Debug, Default)]
pub struct OutgoingMessage {
    buffer: Vec<u8>,
}

impl OutgoingMessage {
    /// Start an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one little-endian i32 to the payload.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Finish the message, yielding its raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Outbound side channel carrying score snapshots to a trainer process.
///
/// Messages queue in order until the transport drains them. Inbound traffic
/// is accepted and discarded; the score channel is one-way by design.
#[derive(Debug, Default)]
pub struct ScoreChannel {
    outgoing: VecDeque<Vec<u8>>,
}

impl ScoreChannel {
    /// Create a channel with an empty outbound queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one score snapshot: good count then bad count, 4 bytes each.
    pub fn send_scores(&mut self, scores: ScoreBoard) {
        let mut message = OutgoingMessage::new();
        message.write_i32(scores.good());
        message.write_i32(scores.bad());
        self.outgoing.push_back(message.into_bytes());
    }

    /// Number of queued outbound messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    /// Drain queued messages in send order.
    pub fn drain_outgoing(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.outgoing.drain(..)
    }

    /// Handle an inbound message: logged and dropped.
    pub fn on_message_received(&mut self, payload: &[u8]) {
        debug!(len = payload.len(), "discarding inbound score-channel message");
    }
}

/// Decode one score message back into counters (trainer-side view).
pub fn decode_scores(payload: &[u8]) -> Result<(i32, i32), ChannelError> {
    let bytes: &[u8; SCORE_MESSAGE_LEN] = payload
        .try_into()
        .map_err(|_| ChannelError::BadLength(payload.len()))?;
    let good = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let bad = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((good, bad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_board_counts_each_kind() {
        let mut board = ScoreBoard::new();
        board.record(MarkerKind::Good);
        board.record(MarkerKind::Good);
        board.record(MarkerKind::Bad);
        assert_eq!(board.good(), 2);
        assert_eq!(board.bad(), 1);

        board.reset();
        assert_eq!(board, ScoreBoard::new());
    }

    #[test]
    fn shared_board_clones_share_counters() {
        let shared = SharedScoreBoard::new();
        let mut observer = shared.clone();
        observer.on_collected(MarkerKind::Good);
        observer.on_collected(MarkerKind::Bad);
        observer.on_collected(MarkerKind::Bad);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.good(), 1);
        assert_eq!(snapshot.bad(), 2);

        shared.reset();
        assert_eq!(shared.snapshot(), ScoreBoard::new());
    }

    #[test]
    fn score_message_is_eight_little_endian_bytes() {
        let mut board = ScoreBoard::new();
        for _ in 0..3 {
            board.record(MarkerKind::Good);
        }
        for _ in 0..5 {
            board.record(MarkerKind::Bad);
        }

        let mut channel = ScoreChannel::new();
        channel.send_scores(board);
        let messages: Vec<_> = channel.drain_outgoing().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], vec![3, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn messages_drain_in_send_order() {
        let mut channel = ScoreChannel::new();
        let mut board = ScoreBoard::new();
        channel.send_scores(board);
        board.record(MarkerKind::Good);
        channel.send_scores(board);
        assert_eq!(channel.pending(), 2);

        let decoded: Vec<_> = channel
            .drain_outgoing()
            .map(|m| decode_scores(&m).expect("valid message"))
            .collect();
        assert_eq!(decoded, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn decode_rejects_wrong_lengths() {
        assert!(matches!(
            decode_scores(&[1, 2, 3]),
            Err(ChannelError::BadLength(3))
        ));
        assert!(matches!(
            decode_scores(&[0; 9]),
            Err(ChannelError::BadLength(9))
        ));
        assert_eq!(decode_scores(&[0; 8]).expect("valid"), (0, 0));
    }

    #[test]
    fn negative_counts_round_trip() {
        let mut message = OutgoingMessage::new();
        message.write_i32(-1);
        message.write_i32(i32::MAX);
        let bytes = message.into_bytes();
        assert_eq!(decode_scores(&bytes).expect("valid"), (-1, i32::MAX));
    }

    #[test]
    fn inbound_messages_are_discarded() {
        let mut channel = ScoreChannel::new();
        channel.on_message_received(&[9, 9, 9]);
        assert_eq!(channel.pending(), 0);
    }
}
