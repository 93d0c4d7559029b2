//! Bake pass: place an optimized cue sequence onto the tracks of many
//! targets.
//!
//! Misconfigured targets are skipped and reported through the
//! [`ValidationLog`]; a placement that breaks an invariant stops the whole
//! pass with the target, track and cue that caused it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use lipsync_common::error::{LipsyncError, LipsyncResult};
use lipsync_cue_model::cue::MouthShape;
use lipsync_cue_model::frame::CueFrame;

use crate::placement::{PlacementPlanner, PlannedStrip};
use crate::track::{StripHandle, StripSpec, TrackSink};
use crate::validation::ValidationLog;

/// Source clip played for one mouth shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    pub clip_name: String,
    /// Nominal clip length in frames.
    pub duration_frames: f64,
}

impl ClipRef {
    pub fn new(clip_name: impl Into<String>, duration_frames: f64) -> Self {
        Self {
            clip_name: clip_name.into(),
            duration_frames,
        }
    }
}

/// Mouth shape to clip lookup, stored as `{"A": {...}, "B": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeMapping {
    clips: BTreeMap<MouthShape, ClipRef>,
}

impl ShapeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, shape: MouthShape, clip: ClipRef) -> Self {
        self.insert(shape, clip);
        self
    }

    pub fn insert(&mut self, shape: MouthShape, clip: ClipRef) {
        self.clips.insert(shape, clip);
    }

    pub fn get(&self, shape: MouthShape) -> Option<&ClipRef> {
        self.clips.get(&shape)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Shapes used by `frames` without a usable clip.
    pub fn unmapped(&self, frames: &[CueFrame<'_>]) -> Vec<MouthShape> {
        let mut missing: Vec<MouthShape> = frames
            .iter()
            .map(|f| f.shape())
            .filter(|shape| match self.get(*shape) {
                Some(clip) => clip.duration_frames <= 0.0,
                None => true,
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn load(path: &Path) -> LipsyncResult<Self> {
        if !path.exists() {
            return Err(LipsyncError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mapping = serde_json::from_str(&content)?;
        Ok(mapping)
    }
}

/// One of the two alternating destination tracks of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSlot {
    First,
    Second,
}

impl TrackSlot {
    pub fn index(self) -> usize {
        match self {
            TrackSlot::First => 0,
            TrackSlot::Second => 1,
        }
    }
}

/// One object to bake: a mapping and up to two destination tracks.
#[derive(Debug, Clone)]
pub struct BakeTarget<T> {
    pub name: String,
    pub mapping: Option<ShapeMapping>,
    pub tracks: [Option<T>; 2],
}

impl<T: TrackSink> BakeTarget<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mapping: None,
            tracks: [None, None],
        }
    }

    pub fn with_mapping(mut self, mapping: ShapeMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_track(mut self, slot: TrackSlot, track: T) -> Self {
        self.tracks[slot.index()] = Some(track);
        self
    }

    fn configured_slots(&self) -> [bool; 2] {
        [self.tracks[0].is_some(), self.tracks[1].is_some()]
    }
}

/// Outcome of a bake pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BakeReport {
    /// Cues handed to baked targets, summed over targets.
    pub cues_processed: usize,
    pub strips_created: usize,
    /// Previous strips shortened to make room.
    pub trims: usize,
    pub targets_baked: usize,
    pub targets_skipped: usize,
    pub validation: Vec<String>,
    /// Validation messages past the log capacity.
    pub validation_dropped: usize,
}

impl BakeReport {
    /// Every processed cue produced a strip.
    pub fn is_complete(&self) -> bool {
        self.cues_processed == self.strips_created
    }
}

impl fmt::Display for BakeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cue(s) processed, {} strip(s) created on {} target(s)",
            self.cues_processed, self.strips_created, self.targets_baked
        )?;
        if self.trims > 0 {
            write!(f, ", {} trim(s)", self.trims)?;
        }
        if self.targets_skipped > 0 {
            write!(f, ", {} target(s) skipped", self.targets_skipped)?;
        }
        for entry in &self.validation {
            write!(f, "\n  - {entry}")?;
        }
        if self.validation_dropped > 0 {
            write!(f, "\n  ... and {} more", self.validation_dropped)?;
        }
        Ok(())
    }
}

/// Runs bake passes with one planner.
#[derive(Debug, Clone, Default)]
pub struct Baker {
    planner: PlacementPlanner,
    log: ValidationLog,
}

impl Baker {
    pub fn new(planner: PlacementPlanner) -> Self {
        Self {
            planner,
            log: ValidationLog::new(),
        }
    }

    pub fn planner(&self) -> &PlacementPlanner {
        &self.planner
    }

    /// Place `frames` on every target.
    pub fn bake<T: TrackSink>(
        &mut self,
        frames: &[CueFrame<'_>],
        targets: &mut [BakeTarget<T>],
    ) -> LipsyncResult<BakeReport> {
        let Baker { planner, log } = self;
        log.clear();
        let mut report = BakeReport::default();

        {
            let mut log = log.dedup_scope();
            for target in targets.iter_mut() {
                let Some(strips) = plan_target(planner, frames, target, &mut log)? else {
                    report.targets_skipped += 1;
                    continue;
                };

                let applied = apply_strips(target, &strips, &mut log)?;
                report.cues_processed += frames.len();
                report.strips_created += applied.created;
                report.trims += applied.trims;
                report.targets_baked += 1;

                tracing::info!(
                    name = %target.name,
                    cues = frames.len(),
                    strips = applied.created,
                    trims = applied.trims,
                    "Baked target"
                );
            }
        }

        report.validation_dropped = log.dropped();
        report.validation = log.take();

        if !report.is_complete() {
            tracing::warn!(
                cues = report.cues_processed,
                strips = report.strips_created,
                "Bake created fewer strips than cues"
            );
        }
        Ok(report)
    }
}

/// Validate a target and plan its strips. `None` means skipped.
fn plan_target<T: TrackSink>(
    planner: &PlacementPlanner,
    frames: &[CueFrame<'_>],
    target: &BakeTarget<T>,
    log: &mut ValidationLog,
) -> LipsyncResult<Option<Vec<PlannedStrip>>> {
    let name = &target.name;

    let Some(mapping) = &target.mapping else {
        log.push(format!("{name}: no shape mapping"));
        return Ok(None);
    };
    let slots = target.configured_slots();
    if !slots.contains(&true) {
        log.push(format!("{name}: no destination track"));
        return Ok(None);
    }
    if frames.is_empty() {
        log.push(format!("{name}: no cues to bake"));
        return Ok(None);
    }
    let unmapped = mapping.unmapped(frames);
    if !unmapped.is_empty() {
        let shapes: Vec<String> = unmapped.iter().map(|s| s.to_string()).collect();
        log.push(format!("{name}: no clip for shape(s) {}", shapes.join(", ")));
        return Ok(None);
    }

    match planner.plan_sequence(frames, slots, |shape| {
        mapping.get(shape).map(|clip| clip.duration_frames)
    }) {
        Ok(strips) => Ok(Some(strips)),
        Err(LipsyncError::Validation { message }) => {
            log.push(format!("{name}: {message}"));
            Ok(None)
        }
        Err(LipsyncError::InvariantViolation { context }) => Err(LipsyncError::invariant(
            format!("target {name}: {context}"),
        )),
        Err(other) => Err(other),
    }
}

struct Applied {
    created: usize,
    trims: usize,
}

fn apply_strips<T: TrackSink>(
    target: &mut BakeTarget<T>,
    strips: &[PlannedStrip],
    log: &mut ValidationLog,
) -> LipsyncResult<Applied> {
    let mapping = target.mapping.as_ref().ok_or_else(|| {
        LipsyncError::invalid_state(format!("target {} lost its mapping", target.name))
    })?;

    let mut applied = Applied {
        created: 0,
        trims: 0,
    };
    let mut ours: [Vec<StripHandle>; 2] = [Vec::new(), Vec::new()];

    for strip in strips {
        let track = target.tracks[strip.track].as_mut().ok_or_else(|| {
            LipsyncError::invalid_state(format!(
                "target {}: strip planned on empty track slot {}",
                target.name, strip.track
            ))
        })?;
        let track_name = track.name().to_string();
        let context = |msg: &str| {
            format!(
                "target {}, track {track_name}, cue #{} ({}): {msg}",
                target.name,
                strip.cue_index,
                strip.shape
            )
        };

        if let (Some(new_end), Some(&previous)) = (strip.trim_previous, ours[strip.track].last()) {
            track
                .trim_end(previous, new_end)
                .map_err(|e| with_context(e, &context))?;
            applied.trims += 1;
        }

        let p = &strip.placement;
        let foreign = track
            .query_overlap(p.start, p.end)
            .into_iter()
            .filter(|handle| !ours[strip.track].contains(handle))
            .count();
        if foreign > 0 {
            log.push(context(&format!("overlaps {foreign} existing strip(s)")));
        }

        let clip = mapping.get(strip.shape).ok_or_else(|| {
            LipsyncError::invalid_state(context("shape has no clip after validation"))
        })?;
        let handle = track
            .insert(&StripSpec {
                name: clip.clip_name.clone(),
                placement: strip.placement,
                auto_blend: strip.auto_blend,
            })
            .map_err(|e| with_context(e, &context))?;
        ours[strip.track].push(handle);
        applied.created += 1;
    }

    Ok(applied)
}

fn with_context(err: LipsyncError, context: &dyn Fn(&str) -> String) -> LipsyncError {
    match err {
        LipsyncError::InvariantViolation { context: inner } => {
            LipsyncError::invariant(context(&inner))
        }
        other => other,
    }
}
