// Core data model shared by every pipeline stage.
//
// Timing is in MIDI ticks at a fixed 480 ticks per quarter note. A
// composition is `duration_bars` bars long; a bar's tick length comes from
// the time signature (`TimeSignature::ticks_per_bar`). Notes are absolute
// (start tick + duration), never deltas. Delta encoding is the serializer's
// business.
//
// `MusicIntent` is built once by the intent extractor and never mutated.
// `TrackConfig` is built by the planner, corrected by the theory validator,
// and replaced whole by the refinement controller. `Note`s are only ever
// produced by the role algorithms in `generate.rs`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// MIDI ticks per quarter note for all generated material.
pub const TICKS_PER_QUARTER: u32 = 480;

/// Ticks per sixteenth note, the finest rhythmic grid the generators use.
pub const TICKS_PER_SIXTEENTH: u32 = TICKS_PER_QUARTER / 4;

/// Tempo bounds accepted anywhere in the pipeline.
pub const MIN_TEMPO: u16 = 40;
pub const MAX_TEMPO: u16 = 220;

/// Upper bound on composition length.
pub const MAX_BARS: u32 = 512;

/// Upper bound on tracks in one composition.
pub const MAX_TRACKS: usize = 8;

/// General MIDI percussion channel (zero-based).
pub const DRUM_CHANNEL: u8 = 9;

// ── Energy ──────────────────────────────────────────────────────────

/// Overall intensity of the piece. Drives track count, density and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Energy {
    pub const ALL: [Energy; 4] = [Energy::Low, Energy::Medium, Energy::High, Energy::VeryHigh];

    pub fn name(self) -> &'static str {
        match self {
            Energy::Low => "low",
            Energy::Medium => "medium",
            Energy::High => "high",
            Energy::VeryHigh => "very_high",
        }
    }

    /// Parse a loose energy label ("low", "very high", "very-high", "max").
    pub fn from_name(name: &str) -> Option<Energy> {
        let normalized: String = name
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "low" | "calm" | "soft" => Some(Energy::Low),
            "medium" | "mid" | "moderate" | "normal" => Some(Energy::Medium),
            "high" | "energetic" => Some(Energy::High),
            "very_high" | "veryhigh" | "extreme" | "max" => Some(Energy::VeryHigh),
            _ => None,
        }
    }

    /// Number of tracks planned when the prompt does not ask for a count.
    pub fn default_track_count(self) -> usize {
        match self {
            Energy::Low => 3,
            Energy::Medium => 5,
            Energy::High => 6,
            Energy::VeryHigh => 8,
        }
    }

    /// Centre velocity for melodic material at this energy.
    pub fn base_velocity(self) -> u8 {
        match self {
            Energy::Low => 64,
            Energy::Medium => 80,
            Energy::High => 96,
            Energy::VeryHigh => 106,
        }
    }

    /// Multiplier applied to each role's base note density.
    pub fn density_scale(self) -> f64 {
        match self {
            Energy::Low => 0.75,
            Energy::Medium => 1.0,
            Energy::High => 1.15,
            Energy::VeryHigh => 1.3,
        }
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Role ────────────────────────────────────────────────────────────

/// The musical function of a track. Each role has one generation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Melody,
    CounterMelody,
    Bass,
    Drums,
    Chords,
    Arpeggio,
    Pad,
    Fx,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Melody,
        Role::CounterMelody,
        Role::Bass,
        Role::Drums,
        Role::Chords,
        Role::Arpeggio,
        Role::Pad,
        Role::Fx,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Melody => "melody",
            Role::CounterMelody => "counter_melody",
            Role::Bass => "bass",
            Role::Drums => "drums",
            Role::Chords => "chords",
            Role::Arpeggio => "arpeggio",
            Role::Pad => "pad",
            Role::Fx => "fx",
        }
    }

    /// Pitched roles that carry a line or harmony (everything but drums).
    pub fn is_melodic(self) -> bool {
        self != Role::Drums
    }

    /// Roles that carry a tune on their own.
    pub fn is_lead_voice(self) -> bool {
        matches!(self, Role::Melody | Role::CounterMelody | Role::Arpeggio)
    }

    /// Planning priority; 1 is the most important track.
    pub fn priority(self) -> u8 {
        match self {
            Role::Melody => 1,
            Role::Drums => 2,
            Role::Bass => 3,
            Role::Chords => 4,
            Role::Pad => 5,
            Role::Arpeggio => 6,
            Role::CounterMelody => 7,
            Role::Fx => 8,
        }
    }

    /// General MIDI program used when the genre has no preference.
    pub fn default_instrument(self) -> Instrument {
        match self {
            Role::Melody => Instrument::Program(0),
            Role::CounterMelody => Instrument::Program(73),
            Role::Bass => Instrument::Program(33),
            Role::Drums => Instrument::DrumKit,
            Role::Chords => Instrument::Program(4),
            Role::Arpeggio => Instrument::Program(80),
            Role::Pad => Instrument::Program(88),
            Role::Fx => Instrument::Program(99),
        }
    }

    /// Target pitch range (inclusive MIDI note numbers).
    pub fn default_pitch_range(self) -> (u8, u8) {
        match self {
            Role::Melody => (60, 84),
            Role::CounterMelody => (52, 76),
            Role::Bass => (36, 48),
            Role::Drums => (35, 81),
            Role::Chords => (48, 72),
            Role::Arpeggio => (60, 84),
            Role::Pad => (48, 72),
            Role::Fx => (60, 96),
        }
    }

    /// Note density at medium energy, in [0, 1].
    pub fn base_density(self) -> f64 {
        match self {
            Role::Melody => 0.6,
            Role::CounterMelody => 0.4,
            Role::Bass => 0.5,
            Role::Drums => 0.7,
            Role::Chords => 0.5,
            Role::Arpeggio => 0.8,
            Role::Pad => 0.3,
            Role::Fx => 0.1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Instruments and tracks ──────────────────────────────────────────

/// What plays a track: a General MIDI program, or the channel-9 drum kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Program(u8),
    DrumKit,
}

impl Instrument {
    /// Program number for the program-change event. The drum kit uses the
    /// GM "Standard Kit", program 0 on channel 9.
    pub fn program_number(self) -> u8 {
        match self {
            Instrument::Program(p) => p,
            Instrument::DrumKit => 0,
        }
    }
}

/// Everything the generator needs to know about one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub role: Role,
    pub channel: u8,
    pub instrument: Instrument,
    /// Target note density in [0, 1].
    pub density: f64,
    /// Inclusive (low, high) MIDI pitch bounds.
    pub pitch_range: (u8, u8),
    /// 1 = most important.
    pub priority: u8,
    pub name: String,
}

/// A single sounding note, in absolute ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub start_tick: u32,
    pub duration_ticks: u32,
    pub velocity: u8,
    pub channel: u8,
}

impl Note {
    pub fn end_tick(&self) -> u32 {
        self.start_tick.saturating_add(self.duration_ticks)
    }
}

/// A generated track: its configuration plus notes in start-tick order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub config: TrackConfig,
    pub notes: Vec<Note>,
}

impl Track {
    /// Build a track, ordering notes by start tick. The sort is stable, so
    /// notes struck together keep the order the generator produced.
    pub fn new(config: TrackConfig, mut notes: Vec<Note>) -> Self {
        notes.sort_by_key(|n| n.start_tick);
        Track { config, notes }
    }

    /// A silence-only track for the given configuration.
    pub fn silent(config: TrackConfig) -> Self {
        Track {
            config,
            notes: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn is_silent(&self) -> bool {
        self.notes.is_empty()
    }

    /// Tick at which the last note ends (0 for a silent track).
    pub fn end_tick(&self) -> u32 {
        self.notes.iter().map(Note::end_tick).max().unwrap_or(0)
    }

    /// Lowest and highest pitch played, if any.
    pub fn pitch_span(&self) -> Option<(u8, u8)> {
        let low = self.notes.iter().map(|n| n.pitch).min()?;
        let high = self.notes.iter().map(|n| n.pitch).max()?;
        Some((low, high))
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            name: self.config.name.clone(),
            role: self.config.role,
            channel: self.config.channel,
            program: self.config.instrument.program_number(),
            note_count: self.notes.len(),
            pitch_span: self.pitch_span(),
        }
    }
}

/// Short description of a finished track, for reports and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub name: String,
    pub role: Role,
    pub channel: u8,
    pub program: u8,
    pub note_count: usize,
    pub pitch_span: Option<(u8, u8)>,
}

// ── Intent ──────────────────────────────────────────────────────────

/// Meter of the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    /// Power-of-two note value of one beat (4 = quarter, 8 = eighth).
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Accepts numerators 2..=12 over 2, 4, 8 or 16.
    pub fn new(numerator: u8, denominator: u8) -> Option<TimeSignature> {
        let valid_denominator = matches!(denominator, 2 | 4 | 8 | 16);
        if (2..=12).contains(&numerator) && valid_denominator {
            Some(TimeSignature {
                numerator,
                denominator,
            })
        } else {
            None
        }
    }

    pub fn ticks_per_beat(self) -> u32 {
        TICKS_PER_QUARTER * 4 / self.denominator as u32
    }

    pub fn ticks_per_bar(self) -> u32 {
        self.numerator as u32 * self.ticks_per_beat()
    }

    /// Bar length in quarter notes (4.0 for 4/4, 3.0 for 6/8).
    pub fn quarters_per_bar(self) -> f64 {
        self.ticks_per_bar() as f64 / TICKS_PER_QUARTER as f64
    }

    /// Denominator as the power of two used by the MIDI meta event.
    pub fn denominator_power(self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::COMMON
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Which extraction path produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Llm,
    Keywords,
}

/// The structured reading of a prompt. Fully populated, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicIntent {
    pub prompt: String,
    /// Registry genre id.
    pub genre: String,
    pub tempo_bpm: u16,
    /// Pitch class of the tonic, 0 = C.
    pub key: u8,
    /// Registry scale name (aliases already resolved).
    pub scale: String,
    pub energy: Energy,
    pub mood: String,
    pub duration_bars: u32,
    /// Explicitly requested track count; 0 when the prompt gave none.
    pub requested_tracks: usize,
    pub time_signature: TimeSignature,
    pub source: IntentSource,
}

impl MusicIntent {
    pub fn ticks_per_bar(&self) -> u32 {
        self.time_signature.ticks_per_bar()
    }

    pub fn total_ticks(&self) -> u32 {
        self.duration_bars.saturating_mul(self.ticks_per_bar())
    }

    /// Playing time at the intent's tempo.
    pub fn duration_seconds(&self) -> f64 {
        let quarters = self.duration_bars as f64 * self.time_signature.quarters_per_bar();
        quarters * 60.0 / self.tempo_bpm.max(1) as f64
    }

    /// Track count the planner aims for.
    pub fn target_track_count(&self) -> usize {
        if self.requested_tracks > 0 {
            self.requested_tracks.min(MAX_TRACKS)
        } else {
            self.energy.default_track_count()
        }
    }
}

/// Convert a playing time to a bar count at `tempo_bpm`, rounded to the
/// nearest bar and kept within 1..=MAX_BARS.
pub fn bars_from_seconds(seconds: f64, tempo_bpm: u16, time_signature: TimeSignature) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 1;
    }
    let quarters = seconds * tempo_bpm as f64 / 60.0;
    let bars = (quarters / time_signature.quarters_per_bar()).round();
    (bars as u32).clamp(1, MAX_BARS)
}

const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Name of a pitch class, preferring the common spelling ("Eb", "F#").
pub fn pitch_class_name(pc: u8) -> &'static str {
    PITCH_CLASS_NAMES[(pc % 12) as usize]
}

/// Scientific pitch name of a MIDI note (60 = "C4").
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", pitch_class_name(pitch % 12), octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_minutes_at_90_bpm_is_90_bars() {
        assert_eq!(bars_from_seconds(240.0, 90, TimeSignature::COMMON), 90);
    }

    #[test]
    fn bars_from_seconds_respects_meter_and_bounds() {
        let waltz = TimeSignature::new(3, 4).unwrap();
        // 60 s at 120 BPM = 120 quarters = 40 bars of 3/4.
        assert_eq!(bars_from_seconds(60.0, 120, waltz), 40);
        assert_eq!(bars_from_seconds(0.0, 120, waltz), 1);
        assert_eq!(bars_from_seconds(f64::NAN, 120, waltz), 1);
        assert_eq!(bars_from_seconds(100_000.0, 220, waltz), MAX_BARS);
    }

    #[test]
    fn time_signature_ticks() {
        assert_eq!(TimeSignature::COMMON.ticks_per_bar(), 1920);
        let six_eight = TimeSignature::new(6, 8).unwrap();
        assert_eq!(six_eight.ticks_per_beat(), 240);
        assert_eq!(six_eight.ticks_per_bar(), 1440);
        assert_eq!(six_eight.denominator_power(), 3);
        assert!(TimeSignature::new(4, 3).is_none());
        assert!(TimeSignature::new(1, 4).is_none());
    }

    #[test]
    fn role_indices_are_dense() {
        for (i, role) in Role::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
    }

    #[test]
    fn energy_parsing_is_loose() {
        assert_eq!(Energy::from_name("Very High"), Some(Energy::VeryHigh));
        assert_eq!(Energy::from_name("very-high"), Some(Energy::VeryHigh));
        assert_eq!(Energy::from_name(" LOW "), Some(Energy::Low));
        assert_eq!(Energy::from_name("loud"), None);
    }

    #[test]
    fn velocity_bases_leave_room_for_jitter() {
        for energy in Energy::ALL {
            let base = energy.base_velocity() as i32;
            assert!(base - 15 >= 1 && base + 15 <= 127, "{energy}");
        }
    }

    #[test]
    fn track_new_orders_notes() {
        let config = TrackConfig {
            role: Role::Melody,
            channel: 0,
            instrument: Instrument::Program(0),
            density: 0.5,
            pitch_range: (60, 72),
            priority: 1,
            name: "Melody".into(),
        };
        let note = |start| Note {
            pitch: 60,
            start_tick: start,
            duration_ticks: 10,
            velocity: 80,
            channel: 0,
        };
        let track = Track::new(config, vec![note(480), note(0), note(240)]);
        let starts: Vec<u32> = track.notes.iter().map(|n| n.start_tick).collect();
        assert_eq!(starts, vec![0, 240, 480]);
        assert_eq!(track.end_tick(), 490);
        assert_eq!(track.pitch_span(), Some((60, 60)));
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(70), "Bb4");
        assert_eq!(note_name(36), "C2");
    }
}
