// Bass: chord-tone pulses locked to the chord timeline.
//
// One note every one or two beats (denser tracks pulse every beat). The
// first note under each new chord is its root; later notes pick root, fifth
// or third. Pitches fold into the bass register (MIDI 36-48 by default).

use crate::generate::{ChordSpan, GenerationRequest, velocity};
use crate::types::Note;
use midigen_prng::MusicRng;

/// Root, fifth, third.
const TONE_WEIGHTS: [f64; 3] = [0.6, 0.25, 0.15];

pub fn generate(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    let total = req.total_ticks();
    if total == 0 {
        return Vec::new();
    }
    let beat = req.ticks_per_beat;
    let (usual, unusual) = if req.density >= 0.55 { (1, 2) } else { (2, 1) };
    let tonic = req.scale.tonic_pc;

    let mut notes = Vec::new();
    let mut tick = 0;
    let mut current_chord: Option<u32> = None;
    while tick < total {
        let span = req.chords.at_tick(tick);
        let chord_start = span.map(|s| s.start_bar);
        let new_chord = chord_start != current_chord;
        current_chord = chord_start;

        let interval = match span {
            Some(span) if !new_chord => chord_tone(span, rng),
            _ => 0,
        };
        let root_pc = span.map(|s| s.root_pc(tonic)).unwrap_or(tonic);
        let pitch = place_in_range((root_pc + interval) % 12, req.pitch_range);

        let beats = if rng.random_bool(0.8) { usual } else { unusual };
        let length = beats * beat;
        let sounding = (length * 9 / 10).max(1);
        let downbeat = if tick % req.ticks_per_bar == 0 { 6 } else { 0 };
        let vel = velocity(req.energy, downbeat - 4, rng, 8);
        if let Some(note) = req.note(pitch, tick, sounding, vel) {
            notes.push(note);
        }
        tick += length;
    }
    notes
}

/// Interval above the root for a non-initial note: root, fifth or third,
/// taken from the chord when it has one.
fn chord_tone(span: &ChordSpan, rng: &mut MusicRng) -> u8 {
    let intervals = span.intervals_above_root();
    let find = |wanted: &[u8]| {
        intervals
            .iter()
            .copied()
            .find(|iv| wanted.contains(&(iv % 12)))
    };
    match rng.weighted_index(&TONE_WEIGHTS) {
        Some(1) => find(&[7, 6, 8]).unwrap_or(7),
        Some(2) => find(&[3, 4]).unwrap_or(0),
        _ => 0,
    }
}

/// Lowest instance of a pitch class inside `range`, or the range edge if
/// the range is too narrow to contain it.
pub(crate) fn place_in_range(pc: u8, range: (u8, u8)) -> u8 {
    let (low, high) = range;
    let candidate = low as u32 + ((pc as u32 + 12 - low as u32 % 12) % 12);
    if candidate <= high as u32 {
        candidate as u8
    } else {
        high
    }
}
