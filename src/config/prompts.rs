//! Prompt templates for Skrift.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    /// Prompts for raw transcript cleanup.
    pub refine: RefinePrompts,
}

/// Prompts for transcript refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinePrompts {
    pub system: String,
    pub user: String,
}

impl Default for RefinePrompts {
    fn default() -> Self {
        Self {
            system: r#"You clean up raw speech-to-text transcripts.

## Rules
- Add proper punctuation and capitalization
- Break the text into logical paragraphs
- Correct obvious transcription errors from context
- Keep the original meaning and content; never add information
- Keep the existing [MM:SS] timestamp markers where natural breaks occur
- Do not translate
- Return only the cleaned transcript, without commentary"#
                .to_string(),

            user: r#"Raw transcript:
{{transcript}}

Clean, well-structured transcript:"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, overriding defaults with files from `custom_dir` when present.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let refine_path = custom_path.join("refine.toml");
            if refine_path.exists() {
                let content = std::fs::read_to_string(&refine_path)?;
                prompts.refine = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}
