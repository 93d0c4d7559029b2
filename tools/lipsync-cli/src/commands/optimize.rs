//! Optimize a cue document in place.

use std::path::PathBuf;

use lipsync_common::config::AppConfig;
use lipsync_cue_model::frame::CueFrame;
use lipsync_cue_model::protocol::CueDocument;

pub fn run(
    config: &AppConfig,
    cues: PathBuf,
    output: Option<PathBuf>,
    fps: Option<u32>,
    max_duration: Option<f64>,
    blend_in: Option<f64>,
) -> anyhow::Result<()> {
    let frame = super::frame_config(config, fps)?;
    let max_duration = max_duration.unwrap_or(config.optimize.max_cue_duration);
    let blend_in = blend_in.unwrap_or(config.optimize.blend_in_time);

    let mut document = CueDocument::load(&cues)?;
    println!("Optimizing {} cue(s) from: {}", document.cues.len(), cues.display());
    println!("  Frame rate: {} fps", frame.rate());
    println!("  Max cue duration: {max_duration}s (tolerance {blend_in}s)");

    let mut frames = CueFrame::wrap_all(&document.cues, &frame);
    let report = super::optimize_frames(config, &mut frames, max_duration, blend_in);
    println!("  {report}");

    let optimized = frames.iter().map(|f| f.cue).collect();
    document = CueDocument::new(
        optimized,
        document.metadata.sound_file,
        document.metadata.version,
    );

    let output = output.unwrap_or(cues);
    document.save(&output)?;
    println!("\nSaved {} cue(s) to: {}", document.cues.len(), output.display());

    Ok(())
}
