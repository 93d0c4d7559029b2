//! Optimize cues and place them onto in-memory tracks.

use std::path::PathBuf;

use serde::Serialize;

use lipsync_common::config::{AppConfig, BlendMode};
use lipsync_cue_model::frame::CueFrame;
use lipsync_cue_model::protocol::CueDocument;
use lipsync_processing_core::track::Strip;
use lipsync_processing_core::{
    BakeTarget, Baker, MemoryTrack, PlacementConfig, PlacementPlanner, ShapeMapping, TrackSlot,
};

pub struct BakeArgs {
    pub cues: PathBuf,
    pub mapping: PathBuf,
    pub fps: Option<u32>,
    pub tracks: usize,
    pub blend_ratio: Option<f64>,
    pub blend_mode: Option<String>,
    pub json: bool,
}

#[derive(Serialize)]
struct TrackListing<'a> {
    track: &'a str,
    strips: &'a [Strip],
}

pub fn run(config: &AppConfig, args: BakeArgs) -> anyhow::Result<()> {
    if !(1..=2).contains(&args.tracks) {
        anyhow::bail!("--tracks must be 1 or 2, got {}", args.tracks);
    }
    let frame = super::frame_config(config, args.fps)?;

    let mut placement = PlacementConfig::from(&config.placement);
    if let Some(ratio) = args.blend_ratio {
        placement.blend_ratio = ratio;
    }
    if let Some(mode) = &args.blend_mode {
        placement.blend_mode = parse_blend_mode(mode)?;
    }
    placement.validate()?;

    let document = CueDocument::load(&args.cues)?;
    let mapping = ShapeMapping::load(&args.mapping)?;
    println!("Baking {} cue(s) from: {}", document.cues.len(), args.cues.display());
    println!("  Mapping: {} shape(s)", mapping.len());

    let mut frames = CueFrame::wrap_all(&document.cues, &frame);
    let optimized = super::optimize_frames(
        config,
        &mut frames,
        config.optimize.max_cue_duration,
        config.optimize.blend_in_time,
    );
    println!("  {optimized}");

    let mut target = BakeTarget::new("mouth")
        .with_mapping(mapping)
        .with_track(TrackSlot::First, MemoryTrack::new("mouth.1"));
    if args.tracks == 2 {
        target = target.with_track(TrackSlot::Second, MemoryTrack::new("mouth.2"));
    }
    let mut targets = vec![target];

    let mut baker = Baker::new(PlacementPlanner::new(placement));
    let report = baker.bake(&frames, &mut targets)?;

    let tracks: Vec<&MemoryTrack> = targets[0].tracks.iter().flatten().collect();
    if args.json {
        let listing: Vec<TrackListing<'_>> = tracks
            .iter()
            .map(|t| TrackListing {
                track: &t.name,
                strips: &t.strips,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        for track in &tracks {
            println!("\nTrack {}:", track.name);
            for strip in &track.strips {
                println!(
                    "  {:<12} {:>8.3} .. {:>8.3}  in {:>6.3}  out {:>6.3}  x{:.2}{}",
                    strip.name,
                    strip.start,
                    strip.end,
                    strip.blend_in,
                    strip.blend_out,
                    strip.scale,
                    if strip.auto_blend { "  auto" } else { "" }
                );
            }
        }
    }

    println!("\n{report}");
    if !report.is_complete() {
        println!("Some cues did not produce a strip. See the problems above.");
    }

    Ok(())
}

fn parse_blend_mode(name: &str) -> anyhow::Result<BlendMode> {
    match name {
        "none" => Ok(BlendMode::None),
        "by-ratio" | "by_ratio" => Ok(BlendMode::ByRatio),
        "always-auto" | "always_auto" => Ok(BlendMode::AlwaysAuto),
        other => anyhow::bail!("unknown blend mode '{other}' (expected none|by-ratio|always-auto)"),
    }
}
