//! Poller behavior against a live server instance.
//!
//! Each test binds a real server (with scripted adapters) on an ephemeral
//! port and drives the client over actual HTTP, covering the reconnect and
//! invalid-cursor paths that unit tests can't reach.

use async_trait::async_trait;
use banter_db::{create_pool, run_migrations, DbRuntimeSettings};
use banter_pipeline::{Pipeline, PipelineConfig};
use banter_server::{app, AppState};
use banter_types::Direction;
use banter_voice::{ReplyGenerator, Synthesizer, Transcriber, VoiceError};
use banter_client::Poller;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

struct EchoAgent;

#[async_trait]
impl ReplyGenerator for EchoAgent {
    async fn generate_reply(&self, user_text: &str) -> Result<String, VoiceError> {
        Ok(format!("echo: {user_text}"))
    }
}

struct MockSynth;

#[async_trait]
impl Synthesizer for MockSynth {
    async fn synthesize(&self, _text: &str) -> Result<String, VoiceError> {
        Ok("/audio/mock.wav".to_string())
    }
}

struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
        Err(VoiceError::Transcription("not under test".to_string()))
    }
}

struct ServerHandle {
    addr: SocketAddr,
    pipeline: Pipeline,
    server_task: JoinHandle<()>,
    _dir: TempDir,
}

impl ServerHandle {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn stop(self) {
        self.server_task.abort();
    }
}

async fn start_server() -> ServerHandle {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = create_pool(
        dir.path().join("server.db").to_str().unwrap(),
        DbRuntimeSettings::default(),
    )
    .expect("pool");
    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
    }

    let (pipeline, _worker) = Pipeline::spawn(
        pool.clone(),
        Arc::new(EchoAgent),
        Arc::new(MockSynth),
        PipelineConfig {
            retry_delay: Duration::from_millis(10),
            ..PipelineConfig::default()
        },
    );

    let state = AppState {
        pool,
        pipeline: pipeline.clone(),
        transcriber: Arc::new(NoTranscriber),
        audio_dir: dir.path().join("audio").to_string_lossy().into_owned(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let router = app(state);
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    ServerHandle {
        addr,
        pipeline,
        server_task,
        _dir: dir,
    }
}

#[tokio::test]
async fn poller_follows_a_conversation_end_to_end() {
    let server = start_server().await;
    let mut outcomes = server.pipeline.subscribe_outcomes();
    let http = reqwest::Client::new();
    let mut poller = Poller::new(server.base_url(), http.clone());

    // Quiet log: polls are empty and cheap.
    assert!(poller.poll_once().await.expect("poll").is_empty());
    assert_eq!(poller.cursor(), 0);

    // Submit a turn through the HTTP surface.
    let resp: serde_json::Value = http
        .post(format!("{}/api/speak", server.base_url()))
        .json(&serde_json::json!({"text": "hello out there"}))
        .send()
        .await
        .expect("speak")
        .json()
        .await
        .expect("json");
    assert_eq!(resp["message_id"], 1);

    outcomes.recv().await.expect("outcome");

    // One poll drains the inbound turn and its committed reply, in order.
    let batch = poller.poll_once().await.expect("poll");
    let ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(batch[0].direction, Direction::Inbound);
    assert_eq!(batch[1].direction, Direction::Outbound);
    assert_eq!(batch[1].text, "echo: hello out there");
    assert_eq!(poller.cursor(), 2);

    // Polling again with nothing new is a clean empty batch.
    assert!(poller.poll_once().await.expect("poll").is_empty());

    server.stop();
}

#[tokio::test]
async fn a_reconnecting_client_resumes_from_its_cursor() {
    let server = start_server().await;
    let mut outcomes = server.pipeline.subscribe_outcomes();
    let http = reqwest::Client::new();

    for text in ["one", "two"] {
        http.post(format!("{}/api/speak", server.base_url()))
            .json(&serde_json::json!({"text": text}))
            .send()
            .await
            .expect("speak");
        outcomes.recv().await.expect("outcome");
    }

    // First client session consumes everything.
    let mut first = Poller::new(server.base_url(), http.clone());
    let batch = first.poll_once().await.expect("poll");
    assert_eq!(batch.len(), 4);
    let cursor = first.cursor();
    drop(first);

    // A new turn lands while the client is away.
    http.post(format!("{}/api/speak", server.base_url()))
        .json(&serde_json::json!({"text": "three"}))
        .send()
        .await
        .expect("speak");
    outcomes.recv().await.expect("outcome");

    // The "reconnected" session sees only what it missed — no duplicates,
    // no gaps.
    let mut resumed = Poller::with_cursor(server.base_url(), http.clone(), cursor);
    let batch = resumed.poll_once().await.expect("poll");
    let texts: Vec<&str> = batch.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["three", "echo: three"]);

    server.stop();
}

#[tokio::test]
async fn an_invalid_cursor_falls_back_to_bootstrap() {
    // The client followed an old deployment to id 4, then the server's
    // database was reset.
    let old_server = start_server().await;
    let mut outcomes = old_server.pipeline.subscribe_outcomes();
    let http = reqwest::Client::new();

    for text in ["one", "two"] {
        http.post(format!("{}/api/speak", old_server.base_url()))
            .json(&serde_json::json!({"text": text}))
            .send()
            .await
            .expect("speak");
        outcomes.recv().await.expect("outcome");
    }

    let mut poller = Poller::new(old_server.base_url(), http.clone());
    poller.poll_once().await.expect("poll");
    let stale_cursor = poller.cursor();
    assert_eq!(stale_cursor, 4);
    old_server.stop();

    let fresh_server = start_server().await;
    let mut outcomes = fresh_server.pipeline.subscribe_outcomes();
    let mut poller = Poller::with_cursor(fresh_server.base_url(), http.clone(), stale_cursor);

    // The fresh store never issued id 4: the poller re-bootstraps instead
    // of erroring, and an empty store yields an empty history.
    let batch = poller.poll_once().await.expect("poll");
    assert!(batch.is_empty());
    assert_eq!(poller.cursor(), 0);

    // From there, normal polling picks up new conversation.
    http.post(format!("{}/api/speak", fresh_server.base_url()))
        .json(&serde_json::json!({"text": "fresh start"}))
        .send()
        .await
        .expect("speak");
    outcomes.recv().await.expect("outcome");

    let batch = poller.poll_once().await.expect("poll");
    let ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);

    fresh_server.stop();
}
