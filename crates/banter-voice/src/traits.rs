//! Adapter seams between the reply pipeline and its external collaborators.
//!
//! The pipeline is written entirely against these traits; the concrete
//! subprocess/HTTP implementations in this crate plug in at startup, and
//! tests substitute deterministic mocks.

use crate::error::VoiceError;
use async_trait::async_trait;

/// Speech-to-text.
///
/// Accepts raw audio bytes in whatever container the client recorded
/// (webm/ogg/wav); any container conversion is the implementation's own
/// business. Bounded-time: implementations must fail with a typed error
/// rather than hang.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// Reply generation.
///
/// Stateless from this core's perspective — any conversation memory lives
/// entirely inside the external agent.
#[async_trait]
pub trait ReplyGenerator: Send + Sync + 'static {
    async fn generate_reply(&self, user_text: &str) -> Result<String, VoiceError>;
}

/// Text-to-speech.
///
/// On success the returned `audio_ref` names a durable artifact: the audio
/// file is fully written before the reference exists, so a message row
/// carrying the reference never points at a partial file.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str) -> Result<String, VoiceError>;
}
