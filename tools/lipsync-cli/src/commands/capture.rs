//! Recognize mouth cues in an audio file.

use std::path::PathBuf;
use std::time::Duration;

use lipsync_capture_engine::{CaptureCommand, CaptureJob, JobStatus};
use lipsync_common::config::{AppConfig, Recognizer};

pub async fn run(
    config: &AppConfig,
    audio: PathBuf,
    output: Option<PathBuf>,
    dialog: Option<PathBuf>,
    recognizer: Option<String>,
    executable: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut command = CaptureCommand::from_config(&config.executable, &audio);
    command.executable = super::executable_path(config, executable);
    if let Some(name) = recognizer {
        command = command.with_recognizer(parse_recognizer(&name)?);
    }
    if dialog.is_some() {
        command = command.with_dialog_file(dialog);
    }
    let output = output.unwrap_or_else(|| audio.with_extension("json"));

    println!("Capturing mouth cues: {}", audio.display());
    println!("  Recognizer: {}", command.recognizer.cli_name());
    println!("  Output: {}", output.display());
    println!();
    println!("Press Ctrl+C to cancel...");

    let mut job = CaptureJob::spawn(&command)?
        .with_join_timeout(Duration::from_secs(config.job.join_timeout_secs));

    let mut ticker = tokio::time::interval(Duration::from_millis(config.job.poll_interval_ms.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut last_progress = None;

    while !job.status().is_terminal() {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = &mut ctrl_c, if !cancel_requested => {
                signal?;
                cancel_requested = true;
                tracing::info!("Interrupted, cancelling capture");
                job.cancel();
                println!("{}", job.status_line());
                continue;
            }
        }

        // Finishing a cancel waits on the recognizer and its readers.
        let polled = if job.status() == JobStatus::Cancelling {
            tokio::task::block_in_place(|| job.poll_progress())
        } else {
            job.poll_progress()
        };
        match polled {
            Ok(Some(progress)) if last_progress != Some(progress) => {
                last_progress = Some(progress);
                println!("  {}", job.status_line());
            }
            Ok(_) => {}
            Err(e) => anyhow::bail!("Capture failed: {e}"),
        }
    }

    match job.status() {
        JobStatus::Done => {
            let document = job.document()?;
            document.save(&output)?;
            let elapsed = job
                .job()
                .elapsed()
                .map(|d| d.num_milliseconds() as f64 / 1000.0)
                .unwrap_or_default();
            println!();
            println!(
                "Captured {} cue(s) in {elapsed:.1}s, saved to: {}",
                document.cues.len(),
                output.display()
            );
        }
        _ => println!("{}", job.status_line()),
    }

    Ok(())
}

fn parse_recognizer(name: &str) -> anyhow::Result<Recognizer> {
    match name {
        "pocket-sphinx" | "pocketsphinx" | "pocketSphinx" => Ok(Recognizer::PocketSphinx),
        "phonetic" => Ok(Recognizer::Phonetic),
        other => anyhow::bail!("unknown recognizer '{other}' (expected pocket-sphinx|phonetic)"),
    }
}
