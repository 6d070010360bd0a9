//! Shared types and constants for the banter voice-message core.
//!
//! This crate provides the foundational types used across all banter crates:
//! the message row exchanged over the polling protocol, the message
//! direction, and the wire envelope returned by a poll.
//!
//! No crate in the workspace depends on anything *except* `banter-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Who produced a message.
///
/// `Inbound` rows are created synchronously when a user turn is submitted;
/// `Outbound` rows are created exactly once by the reply pipeline after both
/// the reply text and (unless degraded) its audio artifact are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Produced by the user (a transcribed voice turn).
    Inbound,
    /// Produced by the agent (a reply, possibly degraded).
    Outbound,
}

impl Direction {
    /// Returns the storage label for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a direction label fails.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown message direction: {0}")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// A single message in the conversation log.
///
/// Once a message has been returned by any read, every field is final: the
/// store never mutates a visible row. The `delivered` bookkeeping column in
/// the database is deliberately not part of this type, so repeated reads of
/// the same id are byte-identical on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Strictly increasing id assigned at insertion; never reused. The sole
    /// ordering key for the polling protocol.
    pub id: i64,
    /// Creation timestamp (ISO 8601 UTC), monotonic with `id` but not
    /// independently authoritative.
    pub created_at: String,
    /// Who produced this message.
    pub direction: Direction,
    /// Textual content. Required for all messages.
    pub text: String,
    /// Opaque reference to an audio artifact (e.g. `/audio/<file>.wav`).
    /// Absent for inbound rows and for degraded outbound rows.
    pub audio_ref: Option<String>,
}

/// Wire envelope for `GET /api/poll`.
///
/// `next_cursor` is the highest id contained in `messages`, or the caller's
/// own cursor when the batch is empty — it is always safe to feed straight
/// back into the next poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollBatch {
    pub messages: Vec<Message>,
    pub next_cursor: i64,
}

impl PollBatch {
    /// Builds a batch from an ordered message slice and the cursor the
    /// caller polled with.
    pub fn new(messages: Vec<Message>, polled_from: i64) -> Self {
        let next_cursor = messages.last().map(|m| m.id).unwrap_or(polled_from);
        Self {
            messages,
            next_cursor,
        }
    }
}
