//! The append-only conversation log for the banter core.
//!
//! Implements the message store contract: durable ordered appends with
//! atomically assigned ids, incremental reads from a cursor, bounded history
//! replay, and the delivered bookkeeping flag.
//!
//! All functions operate on a `&rusqlite::Connection`; callers on the async
//! request path drive them through the `banter-db` pool inside
//! `tokio::task::spawn_blocking`. SQLite serializes writers, so id
//! assignment is atomic with persistence: no caller ever observes an id
//! before the row it names is durable.
//!
//! Rows are immutable once visible. The only column ever updated after
//! insert is `delivered`, which is reader-side bookkeeping and is not part
//! of the [`Message`] payload, so repeated reads of the same id return
//! byte-identical protocol content.

use banter_types::{Direction, Message};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

/// Default number of rows returned by a single incremental read.
pub const DEFAULT_BATCH_LIMIT: u32 = 50;

/// Hard cap on rows per read, bounding response size regardless of what the
/// caller asks for.
pub const MAX_BATCH_LIMIT: u32 = 200;

/// Errors that can occur during store operations.
///
/// `Unavailable` (storage failure) is deliberately distinct from an empty
/// read result: callers retry the former and treat the latter as a normal
/// quiet poll.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage failed (I/O, lock, corruption).
    #[error("message store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    /// The caller supplied a cursor beyond any id the store has ever issued.
    #[error("invalid cursor {0}: no such message id has been issued")]
    InvalidCursor(i64),

    /// No message with the given id exists.
    #[error("message not found: {0}")]
    NotFound(i64),
}

/// Appends a new message and returns the fully materialized row.
///
/// A single `INSERT … RETURNING` statement, so the id, the timestamp, and
/// durability are all decided atomically: concurrent appends cannot
/// interleave a lower id after a higher one is visible.
pub fn append(
    conn: &Connection,
    direction: Direction,
    text: &str,
    audio_ref: Option<&str>,
) -> Result<Message, StoreError> {
    let message = conn.query_row(
        "INSERT INTO messages (direction, text, audio_ref)
         VALUES (?1, ?2, ?3)
         RETURNING id, created_at, direction, text, audio_ref",
        params![direction.as_str(), text, audio_ref],
        map_row_to_message,
    )?;

    tracing::debug!(id = message.id, direction = %direction, "appended message");
    Ok(message)
}

/// Returns all rows with `id > cursor` in ascending id order, as a bounded,
/// fully materialized batch.
///
/// A cursor that no issued id can satisfy (negative, or beyond the highest
/// id ever assigned) is a protocol error: the caller's state is out of sync
/// with this store and it should re-bootstrap from [`read_recent`].
pub fn read_since(
    conn: &Connection,
    cursor: i64,
    limit: Option<u32>,
) -> Result<Vec<Message>, StoreError> {
    if cursor < 0 || cursor > max_id(conn)? {
        return Err(StoreError::InvalidCursor(cursor));
    }

    let limit = limit.unwrap_or(DEFAULT_BATCH_LIMIT).min(MAX_BATCH_LIMIT);

    let mut stmt = conn.prepare(
        "SELECT id, created_at, direction, text, audio_ref
         FROM messages
         WHERE id > ?1
         ORDER BY id ASC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![cursor, limit], map_row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

/// Returns the most recent `limit` rows in ascending id order.
///
/// This is the bootstrap read for a client with no prior cursor: replay a
/// bounded tail of history, then poll forward from the last id in it.
pub fn read_recent(conn: &Connection, limit: u32) -> Result<Vec<Message>, StoreError> {
    let limit = limit.min(MAX_BATCH_LIMIT);

    let mut stmt = conn.prepare(
        "SELECT id, created_at, direction, text, audio_ref
         FROM (SELECT id, created_at, direction, text, audio_ref
               FROM messages ORDER BY id DESC LIMIT ?1)
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![limit], map_row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

/// Returns the highest id the store has issued, or 0 when empty.
pub fn max_id(conn: &Connection) -> Result<i64, StoreError> {
    // AUTOINCREMENT records the high-water mark in sqlite_sequence even if
    // the newest rows were deleted by retention, so a cursor pointing at a
    // pruned id is still recognized as previously issued.
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'messages'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(seq.unwrap_or(0))
}

/// Marks a message as delivered.
///
/// Bookkeeping only: the flag never appears in protocol payloads and no
/// correctness property depends on it.
pub fn mark_delivered(conn: &Connection, id: i64) -> Result<(), StoreError> {
    let count = conn.execute("UPDATE messages SET delivered = 1 WHERE id = ?1", [id])?;
    if count == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

fn map_row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let direction_str: String = row.get(2)?;
    let direction: Direction = direction_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: row.get(0)?,
        created_at: row.get(1)?,
        direction,
        text: row.get(3)?,
        audio_ref: row.get(4)?,
    })
}
