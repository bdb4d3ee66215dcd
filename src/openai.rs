//! OpenAI client construction shared by the speech and refiner backends.

use crate::error::{Result, SkriftError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create an OpenAI client whose every request carries `timeout`.
///
/// A request without a deadline could block a run indefinitely, so there is
/// no constructor without one.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SkriftError::Config(format!("Failed to create HTTP client: {e}")))?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.trim().is_empty())
}
