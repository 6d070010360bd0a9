//! Adapter configuration, deserialized from the server's TOML config.

use serde::{Deserialize, Serialize};
use std::fmt;

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_whisper_binary() -> String {
    "whisper-cli".to_string()
}

fn default_stt_timeout_secs() -> u64 {
    30
}

fn default_whisper_model() -> String {
    "models/ggml-tiny.en.bin".to_string()
}

/// Speech-to-text adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// ffmpeg binary used to convert client containers to 16 kHz mono WAV.
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,

    /// whisper.cpp CLI binary.
    #[serde(default = "default_whisper_binary")]
    pub whisper_binary: String,

    /// Path to the GGML model file.
    #[serde(default = "default_whisper_model")]
    pub model_path: String,

    /// Timeout for the whole transcode + transcribe chain, in seconds.
    #[serde(default = "default_stt_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            whisper_binary: default_whisper_binary(),
            model_path: default_whisper_model(),
            timeout_secs: default_stt_timeout_secs(),
        }
    }
}

fn default_piper_binary() -> String {
    "piper".to_string()
}

fn default_tts_timeout_secs() -> u64 {
    20
}

fn default_audio_dir() -> String {
    "audio".to_string()
}

fn default_piper_model() -> String {
    "voices/en_US-lessac-medium.onnx".to_string()
}

/// Text-to-speech adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// piper binary.
    #[serde(default = "default_piper_binary")]
    pub piper_binary: String,

    /// Path to the piper voice model (.onnx).
    #[serde(default = "default_piper_model")]
    pub model_path: String,

    /// Directory where synthesized WAV artifacts are written. Served by the
    /// server under `/audio/`.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Timeout for a single synthesis call, in seconds.
    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            piper_binary: default_piper_binary(),
            model_path: default_piper_model(),
            audio_dir: default_audio_dir(),
            timeout_secs: default_tts_timeout_secs(),
        }
    }
}

fn default_agent_model() -> String {
    "agent:main".to_string()
}

fn default_agent_timeout_secs() -> u64 {
    60
}

/// Reply-backend settings: an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Full URL of the chat completions endpoint.
    pub url: String,

    /// Bearer token. Never logged.
    #[serde(default, skip_serializing)]
    pub api_token: String,

    /// Model identifier passed through to the backend.
    #[serde(default = "default_agent_model")]
    pub model: String,

    /// Optional system instruction prepended to every request (e.g. "keep
    /// replies short, they will be spoken aloud").
    #[serde(default)]
    pub instruction: Option<String>,

    /// Timeout for a single agent call, in seconds.
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_token: String::new(),
            model: default_agent_model(),
            instruction: None,
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("url", &self.url)
            .field("api_token", &"[REDACTED]")
            .field("model", &self.model)
            .field("instruction", &self.instruction)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
