//! Frame-space views of cues.
//!
//! A [`CueFrame`] pairs a cue with the timeline's [`FrameConfig`] and exposes
//! the cue's bounds on the frame axis. The config is borrowed: every frame in
//! a sequence shares the same one.

use std::fmt;

use lipsync_common::clock::FrameConfig;

use crate::cue::{MouthCue, MouthShape};

/// Tolerance for treating a float frame position as a whole frame tick.
pub const TICK_EPSILON: f64 = 1e-9;

/// A cue seen through a frame configuration.
#[derive(Debug, Clone, Copy)]
pub struct CueFrame<'c> {
    pub cue: MouthCue,
    config: &'c FrameConfig,
    synthetic: bool,
}

impl<'c> CueFrame<'c> {
    pub fn new(cue: MouthCue, config: &'c FrameConfig) -> Self {
        Self {
            cue,
            config,
            synthetic: false,
        }
    }

    /// Silence padding used before the first and after the last real cue.
    pub fn synthetic_silence(start: f64, end: f64, config: &'c FrameConfig) -> Self {
        Self {
            cue: MouthCue::silence(start, end),
            config,
            synthetic: true,
        }
    }

    /// Padding that ends where `first` starts.
    pub fn sentinel_before(first: &CueFrame<'c>) -> Self {
        let start = first.cue.start;
        Self::synthetic_silence(start, start, first.config)
    }

    /// Padding that starts where `last` ends.
    pub fn sentinel_after(last: &CueFrame<'c>) -> Self {
        let end = last.cue.end;
        Self::synthetic_silence(end, end, last.config)
    }

    /// Wrap a whole cue list.
    pub fn wrap_all(cues: &[MouthCue], config: &'c FrameConfig) -> Vec<CueFrame<'c>> {
        cues.iter().map(|cue| CueFrame::new(*cue, config)).collect()
    }

    pub fn config(&self) -> &'c FrameConfig {
        self.config
    }

    pub fn shape(&self) -> MouthShape {
        self.cue.shape
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn start_frame_float(&self) -> f64 {
        self.config.to_frame(self.cue.start)
    }

    pub fn end_frame_float(&self) -> f64 {
        self.config.to_frame(self.cue.end)
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame_float().round() as i64
    }

    pub fn end_frame(&self) -> i64 {
        self.end_frame_float().round() as i64
    }

    /// Exact length on the frame axis.
    pub fn duration_frames_float(&self) -> f64 {
        self.end_frame_float() - self.start_frame_float()
    }

    /// Length in whole frames, rounded up.
    pub fn duration_frames(&self) -> i64 {
        let d = self.duration_frames_float();
        // 0.6 * 30 lands a hair above 18.0; don't let that cost a whole frame.
        if (d - d.round()).abs() < TICK_EPSILON {
            d.round() as i64
        } else {
            d.ceil() as i64
        }
    }

    /// Whether at least one whole frame tick lies within the cue.
    pub fn intersects_frame(&self) -> bool {
        let start = self.start_frame_float();
        let end = self.end_frame_float();
        is_on_tick(start) || is_on_tick(end) || start.floor() != end.floor()
    }

    /// Split point where the blend from the predecessor completes.
    pub fn middle_start(&self, blend_ratio: f64) -> f64 {
        self.start_frame_float() + blend_ratio * self.duration_frames_float()
    }

    /// Split point where the blend into the successor begins.
    pub fn middle_end(&self, blend_ratio: f64) -> f64 {
        self.end_frame_float() - (1.0 - blend_ratio) * self.duration_frames_float()
    }

    /// Frame the cue is reported at: exact with subframes, rounded otherwise.
    pub fn key_frame(&self) -> f64 {
        if self.config.subframe {
            self.start_frame_float()
        } else {
            self.start_frame() as f64
        }
    }

    /// Move the start to a frame position (offset included).
    pub fn set_start_frame_float(&mut self, frame: f64) {
        self.cue.start = self.config.to_time(frame);
    }

    /// Move the end to a frame position (offset included).
    pub fn set_end_frame_float(&mut self, frame: f64) {
        self.cue.end = self.config.to_time(frame);
    }
}

impl fmt::Display for CueFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:.2}-{:.2}]{}",
            self.cue.shape,
            self.start_frame_float(),
            self.end_frame_float(),
            if self.synthetic { " (padding)" } else { "" }
        )
    }
}

fn is_on_tick(frame: f64) -> bool {
    (frame - frame.round()).abs() < TICK_EPSILON
}
