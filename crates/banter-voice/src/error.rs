use thiserror::Error;

/// Errors produced by the external-service adapters.
///
/// Each variant maps to one pipeline stage, so a failed turn can report
/// which stage broke. All variants are recoverable at the turn level: the
/// pipeline commits a degraded reply rather than dropping the turn.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("agent call failed: {0}")]
    Agent(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid adapter configuration: {0}")]
    Config(String),
}
