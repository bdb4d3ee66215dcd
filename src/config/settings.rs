//! Configuration settings for Skrift.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub captions: CaptionSettings,
    pub media: MediaSettings,
    pub recognition: RecognitionSettings,
    pub refine: RefineSettings,
    pub endpoints: EndpointSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Parent directory for per-run scratch directories.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            temp_dir: "/tmp/skrift".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Platform caption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    /// Languages to try, highest priority first. An `a.` prefix selects
    /// auto-generated tracks only (e.g. `a.en`).
    pub language_preferences: Vec<String>,
    /// Try any other available track once every preference came back empty.
    pub fallback_to_any_language: bool,
    /// Timeout for each caption provider call.
    pub timeout_seconds: u64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            language_preferences: vec![
                "en".to_string(),
                "en-US".to_string(),
                "en-GB".to_string(),
                "a.en".to_string(),
            ],
            fallback_to_any_language: true,
            timeout_seconds: 30,
        }
    }
}

impl CaptionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Media download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Audio container requested from yt-dlp.
    pub audio_format: String,
    /// Audio quality passed to yt-dlp.
    pub audio_quality: String,
    /// yt-dlp socket timeout.
    pub socket_timeout_seconds: u64,
    /// Wall-clock limit for the metadata lookup.
    pub metadata_timeout_seconds: u64,
    /// Wall-clock limit for one download attempt.
    pub download_timeout_seconds: u64,
    /// Extra download attempts on a different endpoint.
    pub download_retries: u32,
    /// Longest video accepted for the audio fallback.
    pub max_duration_seconds: u32,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            socket_timeout_seconds: 15,
            metadata_timeout_seconds: 60,
            download_timeout_seconds: 600,
            download_retries: 1,
            max_duration_seconds: 14_400, // 4 hours
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Speech-to-text model.
    pub model: String,
    /// Language hint passed to the speech backend.
    pub language: Option<String>,
    /// Length of each audio window.
    pub chunk_duration_seconds: u32,
    /// Extra attempts per chunk after a backend error.
    pub retry_budget: u32,
    /// Pause before each retry.
    pub retry_delay_seconds: u64,
    /// Timeout for one speech request.
    pub request_timeout_seconds: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: Some("en".to_string()),
            chunk_duration_seconds: 60,
            retry_budget: 1,
            retry_delay_seconds: 5,
            request_timeout_seconds: 120,
        }
    }
}

impl RecognitionSettings {
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.chunk_duration_seconds))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

/// Transcript refinement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    pub enabled: bool,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// A single configured egress candidate.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointCandidate {
    /// Human-readable name used in logs. Defaults to the proxy URL.
    pub label: Option<String>,
    /// Proxy URL (http://, https:// or socks5://).
    pub proxy: Option<String>,
    /// Netscape-format cookies file identifying the request.
    pub cookies_file: Option<String>,
    pub user_agent: Option<String>,
}

/// Endpoint rotation settings. No candidates means direct egress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Consecutive failures after which a candidate is retired.
    pub failure_threshold: u32,
    pub candidates: Vec<EndpointCandidate>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            candidates: Vec::new(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SkriftError;

        if self.recognition.chunk_duration_seconds == 0 {
            return Err(SkriftError::Config(
                "recognition.chunk_duration_seconds must be greater than zero".to_string(),
            ));
        }
        if self.endpoints.failure_threshold == 0 {
            return Err(SkriftError::Config(
                "endpoints.failure_threshold must be greater than zero".to_string(),
            ));
        }
        for candidate in &self.endpoints.candidates {
            if let Some(proxy) = &candidate.proxy {
                url::Url::parse(proxy).map_err(|e| {
                    SkriftError::Config(format!("Invalid proxy URL '{}': {}", proxy, e))
                })?;
            }
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SkriftError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skrift")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }
}
