//! Frame clock: conversion between seconds and animation frames.
//!
//! Recognizer output is time-coded in seconds while every placement decision
//! happens on the frame axis. Frame rates are expressed the way animation hosts
//! do it, as an integer `fps` over a float `fps_base` (e.g. 30000/1001 is
//! `fps = 30, fps_base = 1.001`).

use serde::{Deserialize, Serialize};

/// Pure time/frame conversion functions.
pub struct FrameClock;

impl FrameClock {
    /// Convert seconds to a fractional frame position.
    ///
    /// # Panics
    /// When `fps` or `fps_base` is not positive.
    pub fn time_to_frame_float(t: f64, fps: u32, fps_base: f64) -> f64 {
        check_rate(fps, fps_base);
        t * fps as f64 / fps_base
    }

    /// Convert seconds to the nearest whole frame.
    pub fn time_to_frame(t: f64, fps: u32, fps_base: f64) -> i64 {
        Self::time_to_frame_float(t, fps, fps_base).round() as i64
    }

    /// Convert a (possibly fractional) frame position to seconds.
    ///
    /// # Panics
    /// When `fps` or `fps_base` is not positive.
    pub fn frame_to_time(f: f64, fps: u32, fps_base: f64) -> f64 {
        check_rate(fps, fps_base);
        f * fps_base / fps as f64
    }

    /// Playback-speed factor that stretches `current_len` to `desired_len`,
    /// clamped to `[min, max]`.
    ///
    /// # Panics
    /// When `current_len` is zero.
    pub fn scale_rate(current_len: f64, desired_len: f64, min: f64, max: f64) -> f64 {
        assert!(current_len != 0.0, "scale_rate: current length must be non-zero");
        (desired_len / current_len).clamp(min, max)
    }
}

fn check_rate(fps: u32, fps_base: f64) {
    assert!(fps > 0, "frame clock: fps must be positive");
    assert!(
        fps_base > 0.0 && fps_base.is_finite(),
        "frame clock: fps_base must be positive, got {fps_base}"
    );
}

/// Frame-axis parameters of one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Integer frame rate numerator.
    pub fps: u32,

    /// Frame rate divisor.
    #[serde(default = "default_fps_base")]
    pub fps_base: f64,

    /// Whole-frame shift applied to every converted position.
    #[serde(default)]
    pub offset: i64,

    /// Report cues at fractional frames instead of rounding to whole frames.
    #[serde(default)]
    pub subframe: bool,
}

fn default_fps_base() -> f64 {
    1.0
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            fps_base: default_fps_base(),
            offset: 0,
            subframe: false,
        }
    }
}

impl FrameConfig {
    /// Config with the given rate and no offset.
    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Default::default()
        }
    }

    /// Effective frames per second.
    pub fn rate(&self) -> f64 {
        self.fps as f64 / self.fps_base
    }

    /// Seconds to a fractional frame, including the offset.
    pub fn to_frame(&self, t: f64) -> f64 {
        FrameClock::time_to_frame_float(t, self.fps, self.fps_base) + self.offset as f64
    }

    /// Fractional frame (offset included) back to seconds.
    pub fn to_time(&self, frame: f64) -> f64 {
        FrameClock::frame_to_time(frame - self.offset as f64, self.fps, self.fps_base)
    }

    /// Length of `secs` expressed in frames, offset not applied.
    pub fn duration_to_frames(&self, secs: f64) -> f64 {
        FrameClock::time_to_frame_float(secs, self.fps, self.fps_base)
    }
}
