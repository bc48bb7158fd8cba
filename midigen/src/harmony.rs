// Harmonic roles: block chords, arpeggios and pads.
//
// All three read the same `ChordTimeline`, so whichever of them is
// regenerated the harmony stays aligned with the bass.
//
//   chords:   each chord struck at a rate set by energy (held for the whole
//             span when calm, every bar at medium, every two beats above),
//             with an occasional first inversion
//   arpeggio: the active chord broken at a fixed subdivision (quarter,
//             eighth or sixteenth by energy) in an up, down or up-down order
//             chosen once per track
//   pad:      the active chord sustained over spans of at least two bars,
//             quietly

use crate::generate::{ChordSpan, GenerationRequest, velocity};
use crate::types::{Energy, Note};
use midigen_prng::MusicRng;

/// Gap left between consecutive chord strikes.
const RELEASE_TICKS: u32 = 30;

/// Minimum pad span, in bars.
const PAD_MIN_BARS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArpOrder {
    Up,
    Down,
    UpDown,
}

pub fn generate_chords(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    let total = req.total_ticks();
    if total == 0 {
        return Vec::new();
    }
    let (low, high) = req.pitch_range;
    let tonic = req.scale.tonic_pc;

    let mut notes = Vec::new();
    for span in req.chords.spans() {
        let (span_start, span_end) = req.chords.span_ticks(span);
        let strike_every = match req.energy {
            Energy::Low => span_end - span_start,
            Energy::Medium => req.ticks_per_bar,
            Energy::High | Energy::VeryHigh => 2 * req.ticks_per_beat,
        }
        .max(1);
        let mut voicing = span.voicing(tonic, low, high);
        if voicing.len() >= 3 && rng.random_bool(0.3) {
            invert(&mut voicing, high);
        }

        let mut tick = span_start;
        while tick < span_end.min(total) {
            let length = strike_every.min(span_end - tick);
            let sounding = if length > 2 * RELEASE_TICKS {
                length - RELEASE_TICKS
            } else {
                length
            };
            let accent = if tick == span_start { 4 } else { 0 };
            for &pitch in &voicing {
                let vel = velocity(req.energy, accent - 10, rng, 6);
                if let Some(note) = req.note(pitch, tick, sounding, vel) {
                    notes.push(note);
                }
            }
            tick += length;
        }
    }
    notes
}

/// First inversion: the lowest tone moves up an octave if it still fits.
fn invert(voicing: &mut Vec<u8>, high: u8) {
    if let Some(&lowest) = voicing.first() {
        if lowest as u32 + 12 <= high as u32 {
            voicing.remove(0);
            voicing.push(lowest + 12);
        }
    }
}

pub fn generate_arpeggio(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    let total = req.total_ticks();
    if total == 0 {
        return Vec::new();
    }
    let subdivision = match req.energy {
        Energy::Low => req.ticks_per_beat,
        Energy::Medium => req.ticks_per_beat / 2,
        Energy::High | Energy::VeryHigh => req.ticks_per_beat / 4,
    }
    .max(1);
    let order = *rng
        .choose(&[ArpOrder::Up, ArpOrder::Down, ArpOrder::UpDown])
        .unwrap_or(&ArpOrder::Up);
    let (low, high) = req.pitch_range;
    let tonic = req.scale.tonic_pc;

    let mut notes = Vec::new();
    let mut current: Option<(u32, Vec<u8>)> = None;
    let mut position = 0usize;
    let mut tick = 0;
    while tick < total {
        let span = req.chords.at_tick(tick);
        let span_start = span.map(|s| s.start_bar).unwrap_or(0);
        if current.as_ref().map(|(start, _)| *start) != Some(span_start) {
            current = Some((span_start, arp_tones(span, tonic, low, high)));
            position = 0;
        }
        let tones = current.as_ref().map(|(_, t)| t.as_slice()).unwrap_or(&[]);
        if let Some(pitch) = arp_pitch(tones, order, position) {
            let on_beat = if tick % req.ticks_per_beat == 0 { 6 } else { 0 };
            let vel = velocity(req.energy, on_beat - 8, rng, 6);
            let sounding = (subdivision * 85 / 100).max(1);
            if let Some(note) = req.note(pitch, tick, sounding, vel) {
                notes.push(note);
            }
        }
        position += 1;
        tick += subdivision;
    }
    notes
}

/// The chord voiced in range plus the root an octave up, when it fits.
fn arp_tones(span: Option<&ChordSpan>, tonic: u8, low: u8, high: u8) -> Vec<u8> {
    let Some(span) = span else {
        return vec![crate::bass::place_in_range(tonic, (low, high))];
    };
    let mut tones = span.voicing(tonic, low, high);
    if let Some(&root) = tones.first() {
        let octave = root as u32 + 12;
        if octave <= high as u32 && !tones.contains(&(octave as u8)) {
            tones.push(octave as u8);
        }
    }
    tones
}

fn arp_pitch(tones: &[u8], order: ArpOrder, position: usize) -> Option<u8> {
    let n = tones.len();
    if n == 0 {
        return None;
    }
    let index = match order {
        ArpOrder::Up => position % n,
        ArpOrder::Down => n - 1 - position % n,
        ArpOrder::UpDown if n < 3 => position % n,
        ArpOrder::UpDown => {
            let cycle = 2 * n - 2;
            let p = position % cycle;
            if p < n { p } else { cycle - p }
        }
    };
    tones.get(index).copied()
}

pub fn generate_pad(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    let total = req.total_ticks();
    if total == 0 {
        return Vec::new();
    }
    let (low, high) = req.pitch_range;
    let tonic = req.scale.tonic_pc;
    let span_bars = req.chords.chord_length_bars().max(PAD_MIN_BARS);

    let mut notes = Vec::new();
    let mut bar = 0;
    while bar < req.bars {
        let bars = span_bars.min(req.bars - bar);
        let start = bar * req.ticks_per_bar;
        let length = bars * req.ticks_per_bar;
        let voicing = match req.chords.at_bar(bar) {
            Some(span) => span.voicing(tonic, low, high),
            None => vec![crate::bass::place_in_range(tonic, (low, high))],
        };
        for &pitch in &voicing {
            let vel = 48 + rng.jitter(5) + if req.energy >= Energy::High { 8 } else { 0 };
            if let Some(note) = req.note(pitch, start, length - RELEASE_TICKS / 3, vel) {
                notes.push(note);
            }
        }
        bar += bars;
    }
    notes
}
