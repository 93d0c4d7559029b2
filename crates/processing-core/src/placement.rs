//! Strip placement.
//!
//! Each cue becomes one strip on a destination track. With blending enabled
//! a strip starts inside its predecessor's tail and ends inside its
//! successor's head, so neighbouring shapes cross-fade:
//!
//! ```text
//!   P  |-------[====]                  ]
//!   C          [====|--------|=========]
//!   N                        [=========|-------
//!              ^ start      ^ middle   ^ end
//! ```
//!
//! The split inside every cue is `blend_ratio` of the way through it.
//! Sequence edges are padded with synthetic silence, which never blends.

use lipsync_common::clock::FrameClock;
use lipsync_common::config::{BlendMode, PlacementDefaults};
use lipsync_common::error::{LipsyncError, LipsyncResult};
use lipsync_cue_model::cue::MouthShape;
use lipsync_cue_model::frame::CueFrame;

/// Gap (in frames) left between a trimmed strip and the next one on the
/// same track. Exactly touching strips would suppress auto-blend.
pub const OVERLAP_EPSILON: f64 = 0.001;

/// Parameters for placing strips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Split point inside each cue, in `[0, 1]`.
    pub blend_ratio: f64,
    pub blend_mode: BlendMode,
    /// Playback-speed clamp.
    pub scale_min: f64,
    pub scale_max: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self::from(&PlacementDefaults::default())
    }
}

impl From<&PlacementDefaults> for PlacementConfig {
    fn from(defaults: &PlacementDefaults) -> Self {
        Self {
            blend_ratio: defaults.blend_ratio,
            blend_mode: defaults.blend_mode,
            scale_min: defaults.scale_min,
            scale_max: defaults.scale_max,
        }
    }
}

impl PlacementConfig {
    pub fn validate(&self) -> LipsyncResult<()> {
        if !(0.0..=1.0).contains(&self.blend_ratio) {
            return Err(LipsyncError::validation(format!(
                "blend ratio must be within [0, 1], got {}",
                self.blend_ratio
            )));
        }
        if !(self.scale_min > 0.0 && self.scale_min <= self.scale_max) {
            return Err(LipsyncError::validation(format!(
                "invalid scale range [{}, {}]",
                self.scale_min, self.scale_max
            )));
        }
        Ok(())
    }

    fn blends(&self) -> bool {
        self.blend_mode != BlendMode::None
    }
}

/// Where one strip goes, in float frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start: f64,
    pub end: f64,
    pub blend_in: f64,
    pub blend_out: f64,
    /// Playback speed of the source clip.
    pub scale: f64,
}

impl Placement {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// A placement bound to a track slot, ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStrip {
    /// Index into the planned cue sequence.
    pub cue_index: usize,
    pub shape: MouthShape,
    /// Track slot, `0` or `1`.
    pub track: usize,
    pub placement: Placement,
    pub auto_blend: bool,
    /// New end for the previous strip on the same track, when it reaches
    /// into this one.
    pub trim_previous: Option<f64>,
}

/// Computes strip placements for cue sequences.
#[derive(Debug, Clone, Default)]
pub struct PlacementPlanner {
    config: PlacementConfig,
}

impl PlacementPlanner {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Place `cue` between its neighbours.
    ///
    /// `source_clip_duration` is the nominal length of the mapped clip in
    /// frames; the strip's speed is derived from it.
    pub fn plan_placement(
        &self,
        prev: &CueFrame<'_>,
        cue: &CueFrame<'_>,
        next: &CueFrame<'_>,
        source_clip_duration: f64,
    ) -> LipsyncResult<Placement> {
        let cfg = &self.config;
        let r = cfg.blend_ratio;

        if source_clip_duration <= 0.0 {
            return Err(LipsyncError::validation(format!(
                "source clip for {} has non-positive duration {source_clip_duration}",
                cue.shape()
            )));
        }

        let start = if prev.is_synthetic() || !cfg.blends() {
            cue.start_frame_float()
        } else {
            prev.middle_end(r)
        };
        let end = if next.is_synthetic() || !cfg.blends() {
            cue.end_frame_float()
        } else {
            next.middle_start(r)
        };
        let blend_in = cue.middle_start(r) - start;
        let blend_out = end - cue.middle_end(r);

        if end - start <= 0.0 {
            return Err(LipsyncError::invariant(format!(
                "{cue}: placement {start:.3}..{end:.3} has no length"
            )));
        }
        if blend_in < 0.0 || blend_out < 0.0 {
            return Err(LipsyncError::invariant(format!(
                "{cue}: negative blend (in {blend_in:.3}, out {blend_out:.3})"
            )));
        }

        let scale =
            FrameClock::scale_rate(source_clip_duration, end - start, cfg.scale_min, cfg.scale_max);

        Ok(Placement {
            start,
            end,
            blend_in,
            blend_out,
            scale,
        })
    }

    /// Whether the strip for `shape` fades in and out on its own.
    pub fn auto_blend(&self, shape: MouthShape) -> bool {
        match self.config.blend_mode {
            BlendMode::None => false,
            BlendMode::AlwaysAuto => true,
            BlendMode::ByRatio => shape.is_silence(),
        }
    }

    /// Plan every cue of an optimized sequence.
    ///
    /// Cues go round-robin over the configured track slots. When the
    /// previous strip on a slot reaches the new start, the new strip carries
    /// a trim for it. `clip_duration` returns the source clip length (in
    /// frames) mapped to a shape.
    pub fn plan_sequence<F>(
        &self,
        frames: &[CueFrame<'_>],
        tracks: [bool; 2],
        clip_duration: F,
    ) -> LipsyncResult<Vec<PlannedStrip>>
    where
        F: Fn(MouthShape) -> Option<f64>,
    {
        self.config.validate()?;

        let slots: Vec<usize> = (0..tracks.len()).filter(|&slot| tracks[slot]).collect();
        if slots.is_empty() {
            return Err(LipsyncError::validation("no destination track configured"));
        }

        let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
            return Ok(Vec::new());
        };
        let before = CueFrame::sentinel_before(first);
        let after = CueFrame::sentinel_after(last);

        // (start, end) of the last strip placed on each slot.
        let mut occupied: [Option<(f64, f64)>; 2] = [None, None];
        let mut planned = Vec::with_capacity(frames.len());

        for (index, cue) in frames.iter().enumerate() {
            let prev = if index == 0 { &before } else { &frames[index - 1] };
            let next = frames.get(index + 1).unwrap_or(&after);

            let source = clip_duration(cue.shape()).ok_or_else(|| {
                LipsyncError::validation(format!("no clip mapped for shape {}", cue.shape()))
            })?;
            let placement = self
                .plan_placement(prev, cue, next, source)
                .map_err(|e| with_cue_index(e, index))?;

            let track = slots[index % slots.len()];
            let trim_previous = match occupied[track] {
                Some((prev_start, prev_end)) if prev_end >= placement.start => {
                    let new_end = placement.start - OVERLAP_EPSILON;
                    if new_end <= prev_start {
                        return Err(LipsyncError::invariant(format!(
                            "cue {index}: trimming previous strip on track {track} to \
                             {new_end:.3} would leave it empty (starts at {prev_start:.3})"
                        )));
                    }
                    if prev_end > placement.start {
                        tracing::warn!(
                            cue = index,
                            track,
                            previous_end = prev_end,
                            start = placement.start,
                            "Strip overlaps previous strip on track; trimming"
                        );
                    } else {
                        tracing::debug!(cue = index, track, "Strip touches previous strip; trimming");
                    }
                    Some(new_end)
                }
                _ => None,
            };
            occupied[track] = Some((placement.start, placement.end));

            planned.push(PlannedStrip {
                cue_index: index,
                shape: cue.shape(),
                track,
                placement,
                auto_blend: self.auto_blend(cue.shape()),
                trim_previous,
            });
        }

        tracing::debug!(
            cues = frames.len(),
            tracks = slots.len(),
            "Planned strip placements"
        );
        Ok(planned)
    }
}

fn with_cue_index(err: LipsyncError, index: usize) -> LipsyncError {
    match err {
        LipsyncError::InvariantViolation { context } => {
            LipsyncError::invariant(format!("cue #{index} {context}"))
        }
        other => other,
    }
}
