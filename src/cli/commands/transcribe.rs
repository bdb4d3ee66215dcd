//! Transcribe command implementation.

use crate::cli::output::format_duration;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::endpoint::EndpointPool;
use crate::orchestrator::{AcquireOptions, Acquisition, Orchestrator};
use crate::transcription::{format_acquisition, OutputFormat};
use crate::video::VideoReference;
use anyhow::Result;
use std::sync::Arc;

/// Run the transcribe command.
pub async fn run_transcribe(
    url: &str,
    languages: &[String],
    no_refine: bool,
    output: Option<String>,
    format: &str,
    settings: Settings,
) -> Result<()> {
    let format: OutputFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let video = match VideoReference::parse(url) {
        Ok(v) => v,
        Err(e) => {
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    };

    if let Err(e) = preflight::check(Operation::Transcribe) {
        Output::warning(&format!("{}", e));
        Output::info("Run 'skrift doctor' for detailed diagnostics.");
    }

    let pool = Arc::new(EndpointPool::from_settings(&settings.endpoints));
    let orchestrator = Orchestrator::new(settings, pool)?;

    let options = AcquireOptions {
        refine: !no_refine,
        with_metadata: format == OutputFormat::Report,
    };

    Output::info(&format!("Processing: {}", video.url()));
    let spinner = Output::spinner("Starting...");
    let result = orchestrator
        .acquire_with_progress(&video, languages, options, &|p| {
            spinner.set_message(Output::progress_message(p));
        })
        .await;
    spinner.finish_and_clear();

    let acquisition = match result {
        Ok(a) => a,
        Err(e) => {
            Output::error(&format!("Failed to acquire transcript: {}", e));
            return Err(e.into());
        }
    };

    report_summary(&acquisition);

    let rendered = format_acquisition(&acquisition, format);
    match output {
        Some(path) => {
            let path = Settings::expand_path(&path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &rendered)?;
            Output::success(&format!("Transcript written to {}", path.display()));
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn report_summary(acq: &Acquisition) {
    let mut summary = format!(
        "Acquired via {} ({} segments, {})",
        acq.method,
        acq.transcript.segments.len(),
        format_duration(acq.transcript.duration_seconds)
    );
    if let Some(language) = &acq.language {
        summary.push_str(&format!(", language {}", language));
    }
    Output::success(&summary);

    if let Some(stats) = acq.stats {
        if stats.recognized < stats.total_chunks {
            Output::warning(&format!(
                "{} of {} chunks produced no text ({} silent, {} failed)",
                stats.total_chunks - stats.recognized,
                stats.total_chunks,
                stats.unrecognized,
                stats.backend_errors
            ));
        }
    }
}
