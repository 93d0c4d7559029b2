//! Destination tracks.
//!
//! The animation host owns the real tracks; the core only talks to them
//! through [`TrackSink`]. [`MemoryTrack`] is an in-process implementation
//! used by the CLI and tests.

use serde::{Deserialize, Serialize};

use lipsync_common::error::{LipsyncError, LipsyncResult};

use crate::placement::Placement;

/// Opaque reference to a strip on one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StripHandle(pub usize);

/// Everything needed to create a strip.
#[derive(Debug, Clone, PartialEq)]
pub struct StripSpec {
    /// Source clip name.
    pub name: String,
    pub placement: Placement,
    pub auto_blend: bool,
}

/// A track that receives placed strips.
pub trait TrackSink {
    /// Track name, for diagnostics.
    fn name(&self) -> &str;

    /// Add a strip.
    fn insert(&mut self, spec: &StripSpec) -> LipsyncResult<StripHandle>;

    /// Strips whose span intersects `[start, end)`.
    fn query_overlap(&self, start: f64, end: f64) -> Vec<StripHandle>;

    /// Move a strip's end. Fails when the strip would become empty.
    fn trim_end(&mut self, handle: StripHandle, new_end: f64) -> LipsyncResult<()>;
}

/// A strip stored by [`MemoryTrack`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strip {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub blend_in: f64,
    pub blend_out: f64,
    pub scale: f64,
    pub auto_blend: bool,
}

/// Track kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTrack {
    pub name: String,
    pub strips: Vec<Strip>,
}

impl MemoryTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strips: Vec::new(),
        }
    }

    pub fn get(&self, handle: StripHandle) -> Option<&Strip> {
        self.strips.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.strips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}

impl TrackSink for MemoryTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, spec: &StripSpec) -> LipsyncResult<StripHandle> {
        let p = &spec.placement;
        if p.end <= p.start {
            return Err(LipsyncError::invariant(format!(
                "strip {} on track {} has no length ({:.3}..{:.3})",
                spec.name, self.name, p.start, p.end
            )));
        }

        self.strips.push(Strip {
            name: spec.name.clone(),
            start: p.start,
            end: p.end,
            blend_in: p.blend_in,
            blend_out: p.blend_out,
            scale: p.scale,
            auto_blend: spec.auto_blend,
        });
        Ok(StripHandle(self.strips.len() - 1))
    }

    fn query_overlap(&self, start: f64, end: f64) -> Vec<StripHandle> {
        self.strips
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start < end && s.end > start)
            .map(|(i, _)| StripHandle(i))
            .collect()
    }

    fn trim_end(&mut self, handle: StripHandle, new_end: f64) -> LipsyncResult<()> {
        let name = &self.name;
        let strip = self.strips.get_mut(handle.0).ok_or_else(|| {
            LipsyncError::invalid_state(format!("no strip {} on track {name}", handle.0))
        })?;
        if new_end <= strip.start {
            return Err(LipsyncError::invariant(format!(
                "trimming {} on track {name} to {new_end:.3} would leave it empty",
                strip.name
            )));
        }
        strip.end = new_end;
        Ok(())
    }
}
