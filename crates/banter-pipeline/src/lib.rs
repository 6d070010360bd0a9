//! The background reply pipeline.
//!
//! Each accepted user turn runs through `agent call → speech synthesis →
//! atomic commit` off the request path. The caller gets its inbound message
//! id back as soon as the inbound row is durable; the outbound row appears
//! later, complete, through the polling protocol.
//!
//! A single worker task consumes a bounded queue, so pipeline execution is
//! serialized per process: outbound commit order tracks inbound arrival
//! order by construction. That is a deliberate design choice; the polling
//! protocol's ordering guarantee depends on it.
//!
//! Failure discipline: the store is never touched until the reply text and
//! (unless degraded) its audio artifact are both ready. Whatever goes wrong
//! (agent failure after the retry budget, synthesis failure, the whole-turn
//! watchdog firing), the worker still commits exactly one outbound row, so
//! a polling reader's wait always terminates. Every processed turn
//! broadcasts a [`TurnOutcome`].

use banter_db::DbPool;
use banter_log::StoreError;
use banter_types::{Direction, Message};
use banter_voice::{ReplyGenerator, Synthesizer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Capacity of the turn-outcome broadcast channel.
const OUTCOME_BROADCAST_CAPACITY: usize = 64;

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum queued turns before submissions are rejected with `Busy`.
    pub queue_capacity: usize,
    /// Additional agent attempts after the first failure.
    pub agent_retries: u32,
    /// Pause between agent attempts.
    pub retry_delay: Duration,
    /// Whole-turn watchdog budget. A turn that exhausts it is resolved to a
    /// degraded commit, never left pending.
    pub turn_budget: Duration,
    /// Text committed when the agent call fails outright.
    pub fallback_text: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            agent_retries: 1,
            retry_delay: Duration::from_millis(500),
            turn_budget: Duration::from_secs(120),
            fallback_text: "Sorry, I couldn't come up with a reply just now.".to_string(),
        }
    }
}

/// The pipeline stage a turn was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    AwaitingAgentReply,
    AwaitingSynthesis,
}

impl TurnStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingAgentReply => "awaiting_agent_reply",
            Self::AwaitingSynthesis => "awaiting_synthesis",
        }
    }
}

/// Terminal result of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    /// Reply text and audio both committed.
    Committed,
    /// A stage failed; a text-only (or fallback-text) row was committed.
    Degraded { stage: TurnStage, reason: String },
    /// The store itself refused the commit. Nothing is visible for this
    /// turn; the error has been logged and broadcast.
    StoreFailed { reason: String },
}

/// Completion signal for one processed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The inbound row that triggered the turn; `None` for out-of-band
    /// replies pushed past the agent.
    pub inbound_id: Option<i64>,
    /// The committed outbound row id, when the store accepted it.
    pub outbound_id: Option<i64>,
    pub result: TurnResult,
}

/// Errors surfaced to the request path.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store rejected the inbound append.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The database pool or the blocking task plumbing failed.
    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),

    /// The turn queue is full; the caller should retry shortly.
    #[error("pipeline queue is full")]
    Busy,

    /// The worker task is gone; the process is shutting down.
    #[error("pipeline worker has shut down")]
    Closed,
}

enum TurnJob {
    /// A user turn: generate a reply, synthesize it, commit.
    Respond { inbound_id: i64, text: String },
    /// An externally produced reply: synthesize and commit, no agent call.
    Direct { text: String },
}

/// Handle for submitting turns and observing their outcomes.
///
/// Cloning is cheap; dropping the last handle closes the queue and lets the
/// worker task drain and exit.
#[derive(Clone)]
pub struct Pipeline {
    pool: DbPool,
    job_tx: mpsc::Sender<TurnJob>,
    outcome_tx: broadcast::Sender<TurnOutcome>,
}

impl Pipeline {
    /// Starts the worker task and returns the submission handle alongside
    /// the worker's join handle (for supervised shutdown).
    pub fn spawn(
        pool: DbPool,
        agent: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
        config: PipelineConfig,
    ) -> (Self, JoinHandle<()>) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (outcome_tx, _) = broadcast::channel(OUTCOME_BROADCAST_CAPACITY);

        let worker = Worker {
            pool: pool.clone(),
            agent,
            synthesizer,
            config,
            outcome_tx: outcome_tx.clone(),
        };
        let handle = tokio::spawn(worker.run(job_rx));

        (
            Self {
                pool,
                job_tx,
                outcome_tx,
            },
            handle,
        )
    }

    /// Submits a transcribed user turn.
    ///
    /// Durably appends the inbound row and enqueues the reply work, then
    /// returns the inbound id. It never waits for the agent or synthesis.
    /// Queue capacity is reserved *before* the append so an accepted turn
    /// can always be processed.
    pub async fn submit_turn(&self, text: &str) -> Result<i64, PipelineError> {
        let permit = self.reserve_slot()?;
        let inbound = append_blocking(&self.pool, Direction::Inbound, text.to_string(), None).await?;
        tracing::info!(id = inbound.id, "accepted user turn");

        permit.send(TurnJob::Respond {
            inbound_id: inbound.id,
            text: text.to_string(),
        });
        Ok(inbound.id)
    }

    /// Pushes an externally generated reply, bypassing the agent call.
    ///
    /// The reply goes through the same queue as agent turns, so its commit
    /// keeps its place relative to everything already in flight. It becomes
    /// visible through polling like any other outbound row.
    pub async fn push_reply(&self, text: &str) -> Result<(), PipelineError> {
        let permit = self.reserve_slot()?;
        permit.send(TurnJob::Direct {
            text: text.to_string(),
        });
        Ok(())
    }

    /// Subscribes to per-turn completion signals.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<TurnOutcome> {
        self.outcome_tx.subscribe()
    }

    fn reserve_slot(&self) -> Result<mpsc::Permit<'_, TurnJob>, PipelineError> {
        self.job_tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => PipelineError::Busy,
            mpsc::error::TrySendError::Closed(()) => PipelineError::Closed,
        })
    }
}

async fn append_blocking(
    pool: &DbPool,
    direction: Direction,
    text: String,
    audio_ref: Option<String>,
) -> Result<Message, PipelineError> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;
        banter_log::append(&conn, direction, &text, audio_ref.as_deref())
            .map_err(PipelineError::Store)
    })
    .await
    .map_err(|e| PipelineError::StoreUnavailable(format!("append task join error: {e}")))?
}

struct Worker {
    pool: DbPool,
    agent: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    config: PipelineConfig,
    outcome_tx: broadcast::Sender<TurnOutcome>,
}

impl Worker {
    async fn run(self, mut job_rx: mpsc::Receiver<TurnJob>) {
        tracing::info!("reply pipeline worker started");
        while let Some(job) = job_rx.recv().await {
            let outcome = match job {
                TurnJob::Respond { inbound_id, text } => self.respond(inbound_id, &text).await,
                TurnJob::Direct { text } => self.direct(&text).await,
            };

            match &outcome.result {
                TurnResult::Committed => tracing::info!(
                    inbound_id = outcome.inbound_id,
                    outbound_id = outcome.outbound_id,
                    "turn committed"
                ),
                TurnResult::Degraded { stage, reason } => tracing::warn!(
                    inbound_id = outcome.inbound_id,
                    outbound_id = outcome.outbound_id,
                    stage = stage.as_str(),
                    reason = %reason,
                    "turn committed degraded"
                ),
                TurnResult::StoreFailed { reason } => tracing::error!(
                    inbound_id = outcome.inbound_id,
                    reason = %reason,
                    "turn lost: store rejected outbound commit"
                ),
            }

            // No receivers is fine; outcomes are advisory.
            let _ = self.outcome_tx.send(outcome);
        }
        tracing::info!("reply pipeline worker stopped");
    }

    /// Full turn: agent call (with retries), synthesis, atomic commit, all
    /// under the whole-turn watchdog.
    async fn respond(&self, inbound_id: i64, text: &str) -> TurnOutcome {
        // The watchdog needs to know which stage it interrupted. The lock is
        // only ever touched between awaits, never across them.
        let stage = Arc::new(Mutex::new(TurnStage::AwaitingAgentReply));

        let staged = {
            let stage = stage.clone();
            tokio::time::timeout(self.config.turn_budget, async move {
                let reply = match self.call_agent_with_retries(text).await {
                    Ok(reply) => reply,
                    Err(reason) => {
                        return (
                            self.config.fallback_text.clone(),
                            None,
                            TurnResult::Degraded {
                                stage: TurnStage::AwaitingAgentReply,
                                reason,
                            },
                        )
                    }
                };

                *stage.lock().unwrap_or_else(|e| e.into_inner()) = TurnStage::AwaitingSynthesis;

                match self.synthesizer.synthesize(&reply).await {
                    Ok(audio_ref) => (reply, Some(audio_ref), TurnResult::Committed),
                    Err(e) => (
                        reply,
                        None,
                        TurnResult::Degraded {
                            stage: TurnStage::AwaitingSynthesis,
                            reason: e.to_string(),
                        },
                    ),
                }
            })
            .await
        };

        let (reply_text, audio_ref, result) = staged.unwrap_or_else(|_| {
            let stalled = *stage.lock().unwrap_or_else(|e| e.into_inner());
            (
                self.config.fallback_text.clone(),
                None,
                TurnResult::Degraded {
                    stage: stalled,
                    reason: format!(
                        "turn budget of {}s exhausted",
                        self.config.turn_budget.as_secs()
                    ),
                },
            )
        });

        self.commit(Some(inbound_id), reply_text, audio_ref, result)
            .await
    }

    /// Out-of-band reply: synthesis and commit only.
    async fn direct(&self, text: &str) -> TurnOutcome {
        let staged = tokio::time::timeout(self.config.turn_budget, async {
            match self.synthesizer.synthesize(text).await {
                Ok(audio_ref) => (Some(audio_ref), TurnResult::Committed),
                Err(e) => (
                    None,
                    TurnResult::Degraded {
                        stage: TurnStage::AwaitingSynthesis,
                        reason: e.to_string(),
                    },
                ),
            }
        })
        .await;

        let (audio_ref, result) = staged.unwrap_or_else(|_| {
            (
                None,
                TurnResult::Degraded {
                    stage: TurnStage::AwaitingSynthesis,
                    reason: format!(
                        "turn budget of {}s exhausted",
                        self.config.turn_budget.as_secs()
                    ),
                },
            )
        });

        self.commit(None, text.to_string(), audio_ref, result).await
    }

    async fn call_agent_with_retries(&self, text: &str) -> Result<String, String> {
        let attempts = 1 + self.config.agent_retries;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.agent.generate_reply(text).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "agent call failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        Err(format!(
            "{last_error} (after {attempts} attempt{})",
            if attempts == 1 { "" } else { "s" }
        ))
    }

    /// The single atomic append of the outbound row. Text and audio are both
    /// final before the store is touched; no reader ever sees a partial row.
    async fn commit(
        &self,
        inbound_id: Option<i64>,
        text: String,
        audio_ref: Option<String>,
        result: TurnResult,
    ) -> TurnOutcome {
        match append_blocking(&self.pool, Direction::Outbound, text, audio_ref).await {
            Ok(row) => TurnOutcome {
                inbound_id,
                outbound_id: Some(row.id),
                result,
            },
            Err(e) => TurnOutcome {
                inbound_id,
                outbound_id: None,
                result: TurnResult::StoreFailed {
                    reason: e.to_string(),
                },
            },
        }
    }
}
