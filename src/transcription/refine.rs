//! Optional language-model cleanup of raw transcripts.

use crate::config::{RefinePrompts, RefineSettings};
use crate::error::{Result, SkriftError};
use crate::openai::{create_client_with_timeout, is_api_key_configured};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A single request/response cleanup pass.
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn refine(&self, raw: &str) -> Result<String>;
}

/// Refine `raw`, falling back to it unchanged on any failure.
pub async fn refine_or_raw(refiner: &dyn Refiner, raw: &str) -> (String, bool) {
    match refiner.refine(raw).await {
        Ok(text) if !text.trim().is_empty() => (text, true),
        Ok(_) => {
            warn!("Refiner returned empty text, keeping raw transcript");
            (raw.to_string(), false)
        }
        Err(e) => {
            warn!("Refinement failed, keeping raw transcript: {}", e);
            (raw.to_string(), false)
        }
    }
}

/// Chat-completion cleanup through the OpenAI API.
pub struct OpenAiRefiner {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: RefinePrompts,
}

impl OpenAiRefiner {
    pub fn new(settings: &RefineSettings, prompts: RefinePrompts) -> Result<Self> {
        let client = create_client_with_timeout(Duration::from_secs(settings.timeout_seconds))?;
        Ok(Self {
            client,
            model: settings.model.clone(),
            prompts,
        })
    }

    /// The configured refiner, or `None` when refinement is off or no API key
    /// is available.
    pub fn from_settings(settings: &RefineSettings, prompts: RefinePrompts) -> Result<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }
        if !is_api_key_configured() {
            debug!("OPENAI_API_KEY not set, refinement disabled");
            return Ok(None);
        }
        Self::new(settings, prompts).map(Some)
    }
}

#[async_trait]
impl Refiner for OpenAiRefiner {
    #[instrument(skip_all, fields(model = %self.model, chars = raw.len()))]
    async fn refine(&self, raw: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("transcript".to_string(), raw.to_string());
        let user_prompt = crate::config::Prompts::render(&self.prompts.user, &vars);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.prompts.system.clone())
                .build()
                .map_err(|e| SkriftError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| SkriftError::OpenAI(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.1)
            .build()
            .map_err(|e| SkriftError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| SkriftError::OpenAI(format!("Refinement error: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SkriftError::OpenAI("Empty response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<String>);

    #[async_trait]
    impl Refiner for Fixed {
        async fn refine(&self, _raw: &str) -> Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(SkriftError::OpenAI(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_refined_text_used() {
        let (text, refined) = refine_or_raw(&Fixed(Ok("Hello, world.".into())), "hello world").await;
        assert_eq!(text, "Hello, world.");
        assert!(refined);
    }

    #[tokio::test]
    async fn test_failure_returns_raw() {
        let refiner = Fixed(Err(SkriftError::OpenAI("quota exceeded".into())));
        let (text, refined) = refine_or_raw(&refiner, "[00:00] hello world").await;
        assert_eq!(text, "[00:00] hello world");
        assert!(!refined);
    }

    #[tokio::test]
    async fn test_empty_response_returns_raw() {
        let (text, refined) = refine_or_raw(&Fixed(Ok("   ".into())), "raw").await;
        assert_eq!(text, "raw");
        assert!(!refined);
    }

    #[test]
    fn test_disabled_refiner_is_none() {
        let settings = RefineSettings {
            enabled: false,
            ..Default::default()
        };
        let refiner = OpenAiRefiner::from_settings(&settings, RefinePrompts::default()).unwrap();
        assert!(refiner.is_none());
    }
}
