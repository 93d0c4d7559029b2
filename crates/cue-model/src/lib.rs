//! Lipsync Cue Model
//!
//! Defines the core data contracts for lipsync timelines:
//! - **Cues:** Time-coded mouth shapes as returned by the recognizer
//! - **Frames:** Frame-space views of cues for a given frame rate
//! - **Protocol:** The recognizer's JSON status lines and final cue document
//!
//! Cue times are seconds from the start of the audio; frame positions are
//! derived on demand and never stored.

pub mod cue;
pub mod frame;
pub mod protocol;

pub use cue::*;
pub use frame::*;
pub use protocol::*;
