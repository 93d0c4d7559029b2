//! Lipsync Processing Core
//!
//! Turns recognizer cues into animation strips:
//! - **Optimizer:** Trim overlong cues and stretch cues that fall between frames
//! - **Placement:** Compute start/end/blend/scale for each cue's strip
//! - **Bake:** Apply placements to destination tracks for many targets
//!
//! This crate is pure computation over borrowed sequences; track storage is
//! behind the [`track::TrackSink`] trait.

pub mod bake;
pub mod optimizer;
pub mod placement;
pub mod track;
pub mod validation;

pub use bake::{BakeReport, BakeTarget, Baker, ClipRef, ShapeMapping, TrackSlot};
pub use optimizer::{CueOptimizer, OptimizeReport};
pub use placement::{Placement, PlacementConfig, PlacementPlanner, PlannedStrip};
pub use track::{MemoryTrack, StripHandle, TrackSink};
pub use validation::ValidationLog;
