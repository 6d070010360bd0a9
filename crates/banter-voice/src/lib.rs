//! External-service adapters for the banter core.
//!
//! The reply pipeline treats transcription, reply generation, and speech
//! synthesis as black boxes behind the async traits in [`traits`]. This
//! crate provides the production implementations: an ffmpeg + whisper.cpp
//! subprocess chain for speech-to-text, an OpenAI-compatible chat endpoint
//! for reply generation, and a piper subprocess for text-to-speech.
//!
//! Every adapter call is bounded by a timeout and resolves to a typed
//! [`VoiceError`] on failure — callers never hang on an external service.

pub mod agent;
pub mod config;
pub mod error;
pub mod stt;
pub mod traits;
pub mod tts;

pub use agent::ChatAgent;
pub use config::{AgentConfig, SttConfig, TtsConfig};
pub use error::VoiceError;
pub use stt::WhisperStt;
pub use traits::{ReplyGenerator, Synthesizer, Transcriber};
pub use tts::PiperTts;
