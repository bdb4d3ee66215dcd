//! Configuration module for Skrift.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RefinePrompts};
pub use settings::{
    CaptionSettings, EndpointCandidate, EndpointSettings, GeneralSettings, MediaSettings,
    PromptSettings, RecognitionSettings, RefineSettings, Settings,
};
