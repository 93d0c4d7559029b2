//! Cue sequence optimization.
//!
//! Recognizer cues are not animation friendly as is: a held shape can run
//! for seconds, and very short cues can fall entirely between two frame
//! ticks so they never show up. The optimizer fixes both in place.
//!
//! The sequence must be sorted by start time and free of overlaps.

use std::fmt;

use lipsync_cue_model::cue::MouthCue;
use lipsync_cue_model::frame::CueFrame;

/// Slack (seconds) allowed over the maximum before a cue is trimmed.
pub const DEFAULT_TRIM_TOLERANCE: f64 = 0.05;

/// How many cues each optimization step changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub trimmed: usize,
    pub expanded: usize,
}

impl OptimizeReport {
    pub fn is_noop(&self) -> bool {
        self.trimmed == 0 && self.expanded == 0
    }
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trimmed {} long cue(s), expanded {} sub-frame cue(s)",
            self.trimmed, self.expanded
        )
    }
}

/// Mutates a cue-frame sequence it holds exclusively.
pub struct CueOptimizer<'a, 'c> {
    frames: &'a mut Vec<CueFrame<'c>>,
}

impl<'a, 'c> CueOptimizer<'a, 'c> {
    pub fn new(frames: &'a mut Vec<CueFrame<'c>>) -> Self {
        Self { frames }
    }

    /// Cap non-silence cues at `max_dur` seconds, with the default tolerance.
    pub fn trim_long_cues(&mut self, max_dur: f64, append_x: bool) -> usize {
        self.trim_long_cues_with_tolerance(max_dur, append_x, DEFAULT_TRIM_TOLERANCE)
    }

    /// Cap non-silence cues longer than `max_dur + tolerance` at `max_dur`.
    ///
    /// With `append_x`, the cut-off time becomes a silence cue right after
    /// the trimmed one so the timeline still covers the same span.
    pub fn trim_long_cues_with_tolerance(
        &mut self,
        max_dur: f64,
        append_x: bool,
        tolerance: f64,
    ) -> usize {
        let original_len = self.frames.len();
        let mut trimmed = 0;
        let mut inserted = 0;

        for original_index in 0..original_len {
            let index = original_index + inserted;
            let frame = &mut self.frames[index];
            if frame.shape().is_silence() || frame.cue.duration() <= max_dur + tolerance {
                continue;
            }

            let original_end = frame.cue.end;
            frame.cue.end = frame.cue.start + max_dur;
            let trimmed_end = frame.cue.end;
            let config = frame.config();
            trimmed += 1;

            tracing::debug!(
                index = original_index,
                shape = %frame.shape(),
                from = original_end,
                to = trimmed_end,
                "Trimmed long cue"
            );

            if append_x {
                let filler = CueFrame::new(MouthCue::silence(trimmed_end, original_end), config);
                self.frames.insert(index + 1, filler);
                inserted += 1;
            }
        }

        trimmed
    }

    /// Stretch cues that contain no whole frame tick to the nearer tick.
    ///
    /// Ties go to the start.
    pub fn ensure_frame_intersection(&mut self) -> usize {
        let mut expanded = 0;

        for (index, frame) in self.frames.iter_mut().enumerate() {
            if frame.intersects_frame() {
                continue;
            }

            let start = frame.start_frame_float();
            let end = frame.end_frame_float();
            let d_start = start - start.floor();
            let d_end = end.ceil() - end;

            if d_start <= d_end {
                frame.set_start_frame_float(start.floor());
            } else {
                frame.set_end_frame_float(end.ceil());
            }
            expanded += 1;

            tracing::debug!(
                index,
                shape = %frame.shape(),
                start_frame = frame.start_frame_float(),
                end_frame = frame.end_frame_float(),
                "Expanded sub-frame cue"
            );
        }

        expanded
    }

    /// Trim, then fix sub-frame cues (trimming can create new ones).
    ///
    /// `blend_in_time` is the trimming tolerance: a cue is only cut when it
    /// overruns `max_cue_duration` by more than its blend-in window.
    pub fn optimize(&mut self, max_cue_duration: f64, blend_in_time: f64) -> OptimizeReport {
        self.optimize_with(max_cue_duration, blend_in_time, true)
    }

    /// [`CueOptimizer::optimize`] with a choice of whether trimmed time is
    /// filled with silence.
    pub fn optimize_with(
        &mut self,
        max_cue_duration: f64,
        blend_in_time: f64,
        append_x: bool,
    ) -> OptimizeReport {
        let trimmed = self.trim_long_cues_with_tolerance(max_cue_duration, append_x, blend_in_time);
        let expanded = self.ensure_frame_intersection();
        let report = OptimizeReport { trimmed, expanded };
        tracing::info!(
            trimmed,
            expanded,
            cues = self.frames.len(),
            "Cue optimization finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipsync_common::clock::FrameConfig;
    use lipsync_cue_model::cue::MouthShape;

    fn cue(shape: MouthShape, start: f64, end: f64) -> MouthCue {
        MouthCue::new(shape, start, end)
    }

    #[test]
    fn test_trim_preserves_coverage() {
        let cfg = FrameConfig::with_fps(60);
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::A, 2.0, 8.0)], &cfg);

        let trimmed = CueOptimizer::new(&mut frames).trim_long_cues(2.0, true);

        assert_eq!(trimmed, 1);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].cue, cue(MouthShape::A, 2.0, 4.0));
        assert_eq!(frames[1].cue, cue(MouthShape::X, 4.0, 8.0));
        assert_eq!(frames[0].cue.start, 2.0);
        assert_eq!(frames.last().unwrap().cue.end, 8.0);
        assert_eq!(frames[0].end_frame(), 240);
    }

    #[test]
    fn test_trim_without_filler() {
        let cfg = FrameConfig::with_fps(24);
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::B, 0.0, 1.0)], &cfg);

        let trimmed = CueOptimizer::new(&mut frames).trim_long_cues(0.3, false);

        assert_eq!(trimmed, 1);
        assert_eq!(frames.len(), 1);
        assert!((frames[0].cue.end - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_trim_skips_silence_and_tolerated_overrun() {
        let cfg = FrameConfig::with_fps(24);
        let mut frames = CueFrame::wrap_all(
            &[cue(MouthShape::X, 0.0, 5.0), cue(MouthShape::C, 5.0, 5.54)],
            &cfg,
        );

        let trimmed = CueOptimizer::new(&mut frames).trim_long_cues(0.5, true);

        assert_eq!(trimmed, 0);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_trim_inserts_after_shifted_indices() {
        let cfg = FrameConfig::with_fps(30);
        let mut frames = CueFrame::wrap_all(
            &[
                cue(MouthShape::A, 0.0, 1.0),
                cue(MouthShape::X, 1.0, 1.5),
                cue(MouthShape::B, 1.5, 3.0),
                cue(MouthShape::C, 3.0, 3.1),
            ],
            &cfg,
        );

        let trimmed = CueOptimizer::new(&mut frames).trim_long_cues(0.5, true);

        assert_eq!(trimmed, 2);
        let shapes: Vec<_> = frames.iter().map(|f| f.shape()).collect();
        assert_eq!(
            shapes,
            vec![
                MouthShape::A,
                MouthShape::X,
                MouthShape::X,
                MouthShape::B,
                MouthShape::X,
                MouthShape::C,
            ]
        );
        assert_eq!(frames[2].cue, cue(MouthShape::X, 1.0, 1.5));
        assert_eq!(frames[4].cue, cue(MouthShape::X, 2.0, 3.0));
        for pair in frames.windows(2) {
            assert!((pair[0].cue.end - pair[1].cue.start).abs() < 1e-12);
        }
    }

    #[test]
    fn test_intersection_extends_start_when_closer() {
        let cfg = FrameConfig::with_fps(10);
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::D, 0.11, 0.13)], &cfg);

        let expanded = CueOptimizer::new(&mut frames).ensure_frame_intersection();

        assert_eq!(expanded, 1);
        assert!((frames[0].start_frame_float() - 1.0).abs() < 1e-9);
        assert!((frames[0].end_frame_float() - 1.3).abs() < 1e-9);
        assert!(frames[0].intersects_frame());
    }

    #[test]
    fn test_intersection_extends_end_when_closer() {
        let cfg = FrameConfig::with_fps(10);
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::E, 0.17, 0.19)], &cfg);

        CueOptimizer::new(&mut frames).ensure_frame_intersection();

        assert!((frames[0].start_frame_float() - 1.7).abs() < 1e-9);
        assert!((frames[0].end_frame_float() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersection_tie_prefers_start() {
        let cfg = FrameConfig::with_fps(4);
        // Frames 1.25 .. 1.75: equally far from both ticks.
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::F, 0.3125, 0.4375)], &cfg);

        CueOptimizer::new(&mut frames).ensure_frame_intersection();

        assert_eq!(frames[0].start_frame_float(), 1.0);
        assert_eq!(frames[0].end_frame_float(), 1.75);
    }

    #[test]
    fn test_intersection_with_offset() {
        let cfg = FrameConfig {
            offset: 3,
            ..FrameConfig::with_fps(10)
        };
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::D, 0.11, 0.13)], &cfg);

        CueOptimizer::new(&mut frames).ensure_frame_intersection();

        assert!((frames[0].start_frame_float() - 4.0).abs() < 1e-9);
        assert!((frames[0].cue.start - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_runs_trim_before_intersection() {
        let cfg = FrameConfig::with_fps(10);
        // Trimming B to 0.5s leaves a silence tail at frames 5.2 .. 5.9.
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::B, 0.02, 0.59)], &cfg);

        let report = CueOptimizer::new(&mut frames).optimize(0.5, 0.05);

        assert_eq!(report, OptimizeReport { trimmed: 1, expanded: 1 });
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.intersects_frame()));
        assert!((frames[1].end_frame_float() - 6.0).abs() < 1e-9);
        assert_eq!(
            report.to_string(),
            "Trimmed 1 long cue(s), expanded 1 sub-frame cue(s)"
        );
    }

    #[test]
    fn test_optimize_without_filler_leaves_gap() {
        let cfg = FrameConfig::with_fps(10);
        let mut frames = CueFrame::wrap_all(&[cue(MouthShape::B, 0.02, 0.59)], &cfg);

        let report = CueOptimizer::new(&mut frames).optimize_with(0.5, 0.05, false);

        assert_eq!(report, OptimizeReport { trimmed: 1, expanded: 0 });
        assert_eq!(frames.len(), 1);
        assert!((frames[0].cue.end - 0.52).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_end_to_end_cues_are_untouched() {
        let cfg = FrameConfig::with_fps(30);
        let cues = [
            cue(MouthShape::X, 0.0, 0.5),
            cue(MouthShape::A, 0.5, 0.6),
            cue(MouthShape::X, 0.6, 2.0),
        ];
        let mut frames = CueFrame::wrap_all(&cues, &cfg);

        let report = CueOptimizer::new(&mut frames).optimize(1.0, 0.1);

        assert!(report.is_noop());
        let after: Vec<_> = frames.iter().map(|f| f.cue).collect();
        assert_eq!(after, cues.to_vec());
    }
}
