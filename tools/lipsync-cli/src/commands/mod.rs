pub mod bake;
pub mod capture;
pub mod check;
pub mod optimize;

use std::path::PathBuf;

use lipsync_capture_engine::resolve_executable;
use lipsync_common::clock::FrameConfig;
use lipsync_common::config::AppConfig;
use lipsync_cue_model::frame::CueFrame;
use lipsync_processing_core::{CueOptimizer, OptimizeReport};

/// Executable from the command line, or the configured one.
pub fn executable_path(config: &AppConfig, flag: Option<PathBuf>) -> PathBuf {
    let path = flag.unwrap_or_else(|| config.executable.path.clone());
    resolve_executable(&path)
}

/// Configured frame axis with an optional fps override.
pub fn frame_config(config: &AppConfig, fps: Option<u32>) -> anyhow::Result<FrameConfig> {
    let mut frame = config.frame;
    if let Some(fps) = fps {
        if fps == 0 {
            anyhow::bail!("--fps must be positive");
        }
        frame.fps = fps;
    }
    Ok(frame)
}

/// Optimize `frames`, filling trimmed time with silence when configured to.
pub fn optimize_frames(
    config: &AppConfig,
    frames: &mut Vec<CueFrame<'_>>,
    max_duration: f64,
    blend_in: f64,
) -> OptimizeReport {
    CueOptimizer::new(frames).optimize_with(max_duration, blend_in, config.optimize.append_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipsync_cue_model::cue::{MouthCue, MouthShape};

    fn long_cue_frames(cfg: &FrameConfig) -> Vec<CueFrame<'_>> {
        CueFrame::wrap_all(&[MouthCue::new(MouthShape::B, 0.0, 1.0)], cfg)
    }

    #[test]
    fn test_optimize_frames_honours_append_x() {
        let cfg = FrameConfig::with_fps(24);
        let mut config = AppConfig::default();

        let mut frames = long_cue_frames(&cfg);
        optimize_frames(&config, &mut frames, 0.2, 0.05);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].shape(), MouthShape::X);

        config.optimize.append_x = false;
        let mut frames = long_cue_frames(&cfg);
        let report = optimize_frames(&config, &mut frames, 0.2, 0.05);
        assert_eq!(report.trimmed, 1);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_frame_config_rejects_zero_fps() {
        assert!(frame_config(&AppConfig::default(), Some(0)).is_err());
        assert_eq!(frame_config(&AppConfig::default(), Some(60)).unwrap().fps, 60);
    }
}
