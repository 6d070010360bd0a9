use crate::config::TtsConfig;
use crate::error::VoiceError;
use crate::traits::Synthesizer;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion
/// from oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Text-to-speech via a piper subprocess, producing durable WAV artifacts.
///
/// Artifacts are written under `audio_dir` to a `.part` path first and
/// renamed into place only after piper exits successfully, so the returned
/// `audio_ref` never names a partial file. Files are named by UUID rather
/// than message id: at synthesis time the outbound message does not exist
/// yet, since the row is committed afterwards, already carrying the
/// reference.
#[derive(Debug, Clone)]
pub struct PiperTts {
    config: TtsConfig,
}

impl PiperTts {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    /// Directory the server should expose under `/audio/`.
    pub fn audio_dir(&self) -> &str {
        &self.config.audio_dir
    }

    async fn run_piper(&self, text: &str, out_path: &std::path::Path) -> Result<(), VoiceError> {
        let mut command = Command::new(&self.config.piper_binary);
        command
            .arg("--model")
            .arg(&self.config.model_path)
            .arg("--output_file")
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("failed to spawn piper: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Synthesis("failed to open piper stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write on a separate task to avoid deadlock if piper's output
        // buffer fills before it drains stdin.
        let write_task = tokio::spawn(async move {
            let res = stdin.write_all(text_owned.as_bytes()).await;
            drop(stdin);
            res
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to wait for piper: {e}")))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Synthesis(format!(
                    "failed to write to piper stdin: {e}"
                )))
            }
            Err(e) => return Err(VoiceError::Synthesis(format!("stdin task failed: {e}"))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Synthesis(format!(
                "piper failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }

    async fn synthesize_inner(&self, text: &str) -> Result<String, VoiceError> {
        let filename = format!("reply-{}.wav", Uuid::new_v4());
        let final_path = PathBuf::from(&self.config.audio_dir).join(&filename);
        let part_path = final_path.with_extension("wav.part");

        tokio::fs::create_dir_all(&self.config.audio_dir)
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to create audio dir: {e}")))?;

        self.run_piper(text, &part_path).await?;

        let meta = tokio::fs::metadata(&part_path)
            .await
            .map_err(|e| VoiceError::Synthesis(format!("piper produced no output file: {e}")))?;
        if meta.len() == 0 {
            return Err(VoiceError::Synthesis(
                "piper produced an empty audio file".to_string(),
            ));
        }

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to finalize audio file: {e}")))?;

        tracing::debug!(file = %filename, bytes = meta.len(), "synthesized audio artifact");
        Ok(format!("/audio/{filename}"))
    }
}

#[async_trait]
impl Synthesizer for PiperTts {
    async fn synthesize(&self, text: &str) -> Result<String, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if text.trim().is_empty() {
            return Err(VoiceError::Synthesis("empty synthesis text".to_string()));
        }

        let budget = Duration::from_secs(self.config.timeout_secs);
        tokio::time::timeout(budget, self.synthesize_inner(text))
            .await
            .map_err(|_| {
                VoiceError::Synthesis(format!(
                    "synthesis timed out after {} seconds",
                    budget.as_secs()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(audio_dir: &str) -> TtsConfig {
        TtsConfig {
            piper_binary: "/nonexistent/piper".to_string(),
            model_path: "/nonexistent/voice.onnx".to_string(),
            audio_dir: audio_dir.to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_spawning() {
        let tts = PiperTts::new(test_config("audio"));
        let text = "x".repeat(MAX_TTS_INPUT_BYTES + 1);
        let err = tts.synthesize(&text).await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
        assert!(err.to_string().contains("maximum size"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let tts = PiperTts::new(test_config("audio"));
        let err = tts.synthesize("   ").await.unwrap_err();
        assert!(err.to_string().contains("empty synthesis text"));
    }

    #[tokio::test]
    async fn missing_piper_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let tts = PiperTts::new(test_config(dir.path().to_str().unwrap()));
        let err = tts.synthesize("hello there").await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
        assert!(err.to_string().contains("piper"));

        // No artifact, partial or otherwise, is left behind.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
