//! Mouth shapes and time-coded cues.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the recognizer's mouth shapes.
///
/// `A`..`F` are the basic shapes, `G`, `H` and `X` the extended ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MouthShape {
    /// Closed mouth for "P", "B", "M".
    A,
    /// Slightly open mouth with clenched teeth.
    B,
    /// Open mouth, "EH" / "AE".
    C,
    /// Wide open mouth, "AA".
    D,
    /// Slightly rounded mouth, "AO" / "ER".
    E,
    /// Puckered lips, "UW" / "OW" / "W".
    F,
    /// Upper teeth touching the lower lip, "F" / "V".
    G,
    /// Long "L" sound.
    H,
    /// Idle position, used for silence.
    X,
}

impl MouthShape {
    pub const ALL: [MouthShape; 9] = [
        MouthShape::A,
        MouthShape::B,
        MouthShape::C,
        MouthShape::D,
        MouthShape::E,
        MouthShape::F,
        MouthShape::G,
        MouthShape::H,
        MouthShape::X,
    ];

    /// Silence / idle shape.
    pub fn is_silence(&self) -> bool {
        matches!(self, MouthShape::X)
    }

    /// Whether the shape must be enabled explicitly via extended shapes.
    pub fn is_extended(&self) -> bool {
        matches!(self, MouthShape::G | MouthShape::H | MouthShape::X)
    }

    pub fn as_char(&self) -> char {
        match self {
            MouthShape::A => 'A',
            MouthShape::B => 'B',
            MouthShape::C => 'C',
            MouthShape::D => 'D',
            MouthShape::E => 'E',
            MouthShape::F => 'F',
            MouthShape::G => 'G',
            MouthShape::H => 'H',
            MouthShape::X => 'X',
        }
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Error for letters that are not a mouth shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mouth shape {0:?}")]
pub struct UnknownShape(pub String);

impl FromStr for MouthShape {
    type Err = UnknownShape;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => MouthShape::ALL
                .into_iter()
                .find(|shape| shape.as_char() == c.to_ascii_uppercase())
                .ok_or_else(|| UnknownShape(s.to_string())),
            _ => Err(UnknownShape(s.to_string())),
        }
    }
}

/// A mouth shape held over a time interval (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    pub shape: MouthShape,
    pub start: f64,
    pub end: f64,
}

impl MouthCue {
    pub fn new(shape: MouthShape, start: f64, end: f64) -> Self {
        debug_assert!(end >= start, "cue end {end} before start {start}");
        Self { shape, start, end }
    }

    /// Silence cue over the given interval.
    pub fn silence(start: f64, end: f64) -> Self {
        Self::new(MouthShape::X, start, end)
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for MouthCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.3}-{:.3}", self.shape, self.start, self.end)
    }
}
