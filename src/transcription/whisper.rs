//! OpenAI Whisper speech backend.

use super::SpeechBackend;
use crate::config::RecognitionSettings;
use crate::error::{Result, SkriftError};
use crate::openai::create_client_with_timeout;
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// Sends one audio file per request to the Whisper transcription endpoint.
pub struct WhisperSpeechBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl WhisperSpeechBackend {
    pub fn new(settings: &RecognitionSettings) -> Result<Self> {
        let client =
            create_client_with_timeout(Duration::from_secs(settings.request_timeout_seconds))?;

        Ok(Self {
            client,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl SpeechBackend for WhisperSpeechBackend {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn recognize(&self, audio_path: &Path, language: Option<&str>) -> Result<String> {
        let file_bytes = tokio::fs::read(audio_path).await?;

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::Json);

        if let Some(lang) = language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| SkriftError::Backend(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| SkriftError::Backend(format!("Whisper API error: {}", e)))?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(SkriftError::Unrecognizable);
        }

        debug!("Recognized {} characters", text.len());
        Ok(text.to_string())
    }
}
