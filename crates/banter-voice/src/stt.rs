use crate::config::SttConfig;
use crate::error::VoiceError;
use crate::traits::Transcriber;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized
/// payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Speech-to-text via an ffmpeg → whisper.cpp subprocess chain.
///
/// Clients record in whatever container their platform produces (webm, ogg,
/// wav). ffmpeg normalizes to the 16 kHz mono WAV whisper expects; whisper
/// then emits the transcript on stdout. The chaining is internal; callers
/// see one bounded-time `transcribe` call.
#[derive(Debug, Clone)]
pub struct WhisperStt {
    config: SttConfig,
}

impl WhisperStt {
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }

    async fn convert_to_wav(
        &self,
        input: &std::path::Path,
        output: &std::path::Path,
    ) -> Result<(), VoiceError> {
        let output_status = Command::new(&self.config.ffmpeg_binary)
            .arg("-i")
            .arg(input)
            .args(["-ar", "16000", "-ac", "1", "-f", "wav", "-y"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to spawn ffmpeg: {e}")))?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(VoiceError::Transcription(format!(
                "ffmpeg conversion failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }

    async fn run_whisper(&self, wav: &std::path::Path) -> Result<String, VoiceError> {
        let output = Command::new(&self.config.whisper_binary)
            .arg("-m")
            .arg(&self.config.model_path)
            .arg("-f")
            .arg(wav)
            .args(["--no-timestamps", "--no-prints"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to spawn whisper: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Transcription(format!(
                "whisper failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn transcribe_inner(&self, audio: &[u8]) -> Result<String, VoiceError> {
        // ffmpeg probes container format from file contents, so the temp
        // file needs no particular extension.
        let workdir = tempfile::tempdir()
            .map_err(|e| VoiceError::Transcription(format!("failed to create temp dir: {e}")))?;
        let input_path = workdir.path().join("input.audio");
        let wav_path = workdir.path().join("input.wav");

        tokio::fs::write(&input_path, audio)
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to write audio: {e}")))?;

        self.convert_to_wav(&input_path, &wav_path).await?;
        let text = self.run_whisper(&wav_path).await?;

        if text.is_empty() {
            return Err(VoiceError::Transcription(
                "empty transcript (silence or unsupported audio)".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Transcriber for WhisperStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Transcription(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }
        if audio.is_empty() {
            return Err(VoiceError::Transcription("empty audio payload".to_string()));
        }

        let budget = Duration::from_secs(self.config.timeout_secs);
        tokio::time::timeout(budget, self.transcribe_inner(audio))
            .await
            .map_err(|_| {
                VoiceError::Transcription(format!(
                    "transcription timed out after {} seconds",
                    budget.as_secs()
                ))
            })?
    }
}
