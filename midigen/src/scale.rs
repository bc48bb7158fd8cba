// Scale instances: a registry scale rooted on a concrete tonic.
//
// The melody walk moves through the in-range pitches of a scale, chord
// progressions are snapped onto it (`snap_offset`), and phrase endings look
// for its stable degrees (`pitch_fitness`). Built by the theory validator
// once the intent's scale has been resolved against the registry.

use serde::{Deserialize, Serialize};

/// A scale (interval pattern) on a specific tonic pitch class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleInstance {
    pub name: String,
    /// Pitch class of the tonic (0 = C).
    pub tonic_pc: u8,
    intervals: Vec<u8>,
}

impl ScaleInstance {
    /// `intervals` must be non-empty, start at 0 and stay below 12; the
    /// registry validates this for every built-in scale.
    pub fn new(name: &str, tonic_pc: u8, intervals: &[u8]) -> Self {
        ScaleInstance {
            name: name.to_string(),
            tonic_pc: tonic_pc % 12,
            intervals: intervals.to_vec(),
        }
    }

    pub fn intervals(&self) -> &[u8] {
        &self.intervals
    }

    /// Semitones of `pitch` above the tonic, reduced to one octave.
    fn offset_in_octave(&self, pitch: u8) -> u8 {
        (pitch % 12 + 12 - self.tonic_pc) % 12
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.intervals.contains(&self.offset_in_octave(pitch))
    }

    /// All scale pitches in `[low, high]`.
    pub fn pitches_in_range(&self, low: u8, high: u8) -> Vec<u8> {
        (low..=high).filter(|&p| self.contains(p)).collect()
    }

    /// Nearest in-scale pitch, preferring the lower neighbour on ties.
    pub fn snap(&self, pitch: u8) -> u8 {
        if self.contains(pitch) {
            return pitch;
        }
        for offset in 1u8..=6 {
            if pitch >= offset && self.contains(pitch - offset) {
                return pitch - offset;
            }
            if pitch <= 127 - offset && self.contains(pitch + offset) {
                return pitch + offset;
            }
        }
        pitch
    }

    /// Snap a semitone offset above the tonic (may exceed an octave) onto
    /// the scale, keeping its octave.
    pub fn snap_offset(&self, offset: u8) -> u8 {
        // Tonic 0 sits in octave 2 so the search never underflows.
        let as_pitch = 24 + self.tonic_pc + offset;
        self.snap(as_pitch) - 24 - self.tonic_pc
    }

    /// Degree within the octave (0-based), or `None` if out of scale.
    pub fn scale_degree(&self, pitch: u8) -> Option<usize> {
        let offset = self.offset_in_octave(pitch);
        self.intervals.iter().position(|&iv| iv == offset)
    }

    /// The tonic in the octave starting six semitones below `near`.
    pub fn tonic_near(&self, near: u8) -> u8 {
        let low = near.saturating_sub(6);
        let up = (self.tonic_pc + 12 - low % 12) % 12;
        (low + up).min(127)
    }

    /// Weight of a pitch as a phrase goal: tonic highest, then the fifth and
    /// third, 1.0 for other scale tones, 0.0 outside the scale.
    pub fn pitch_fitness(&self, pitch: u8) -> f64 {
        match self.offset_in_octave(pitch) {
            _ if !self.contains(pitch) => 0.0,
            0 => 1.5,
            7 => 1.3,
            3 | 4 => 1.1,
            _ => 1.0,
        }
    }
}
