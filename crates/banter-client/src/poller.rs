//! Cursor reconciliation over the polling endpoint.

use banter_types::{Message, PollBatch};
use thiserror::Error;

/// History size requested when bootstrapping without a cursor.
const BOOTSTRAP_HISTORY_LIMIT: u32 = 20;

/// Errors surfaced to the polling loop.
#[derive(Debug, Error)]
pub enum PollerError {
    /// Transport failure; the caller keeps its cursor and just polls again.
    #[error("poll request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an unexpected status.
    #[error("server rejected the poll: status {0}")]
    Status(reqwest::StatusCode),
}

/// A polling client with a monotone cursor.
///
/// The server keeps no per-client state, so this struct *is* the entire
/// session: after a disconnect, the same `Poller` (or a new one seeded with
/// the same cursor) resumes exactly where it left off. Retried polls may
/// deliver rows the client has already seen; [`Poller::reconcile`] drops
/// them before they reach the caller.
#[derive(Debug)]
pub struct Poller {
    http: reqwest::Client,
    base_url: String,
    cursor: i64,
}

impl Poller {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cursor: 0,
        }
    }

    /// Resumes a previous session from a known cursor.
    pub fn with_cursor(base_url: impl Into<String>, http: reqwest::Client, cursor: i64) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cursor,
        }
    }

    /// The highest message id this client has consumed.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Fetches one batch of new messages.
    ///
    /// On an invalid-cursor response (the server never issued our cursor —
    /// e.g. the database was reset) the poller re-bootstraps from history
    /// instead of failing: the protocol treats a bad cursor as "start
    /// over", never as a crash.
    pub async fn poll_once(&mut self) -> Result<Vec<Message>, PollerError> {
        let url = format!("{}/api/poll?since={}", self.base_url, self.cursor);
        let response = self.http.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::warn!(cursor = self.cursor, "server rejected cursor, re-bootstrapping");
            self.cursor = 0;
            return self.bootstrap(BOOTSTRAP_HISTORY_LIMIT).await;
        }
        if !response.status().is_success() {
            return Err(PollerError::Status(response.status()));
        }

        let batch: PollBatch = response.json().await?;
        Ok(self.reconcile(batch.messages))
    }

    /// Replays the recent history tail; the bootstrap read for a client
    /// with no prior cursor.
    pub async fn bootstrap(&mut self, limit: u32) -> Result<Vec<Message>, PollerError> {
        let url = format!("{}/api/history?limit={}", self.base_url, limit);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(PollerError::Status(response.status()));
        }

        let messages: Vec<Message> = response.json().await?;
        Ok(self.reconcile(messages))
    }

    /// Drops already-seen rows and advances the cursor.
    ///
    /// Keeping this separate from the HTTP calls makes the monotonicity
    /// argument a pure function: whatever the network re-delivers, the
    /// caller only ever sees each id once, in ascending order.
    fn reconcile(&mut self, messages: Vec<Message>) -> Vec<Message> {
        let mut fresh = Vec::with_capacity(messages.len());
        for message in messages {
            if message.id > self.cursor {
                self.cursor = message.id;
                fresh.push(message);
            }
        }
        fresh
    }
}
