// Melody and counter-melody: a weighted random walk over scale tones.
//
// The walk moves through the in-range scale pitches ("the pool"), so one
// step is one scale degree. Steps of up to two degrees (a third) dominate;
// larger leaps are rare and get reflected back toward the middle of the
// range when the line is already high or low. Every two bars (four when the
// line is sparse) the phrase cadences: the last note lands on a stable tone
// (tonic, third or fifth) and is held to the phrase boundary.
//
// Durations are drawn on a sixteenth grid from a distribution conditioned
// on density: dense lines favour sixteenths and eighths, sparse lines
// quarters and halves. Rests never exceed one beat, which keeps the line
// free of bar-long gaps.

use crate::generate::{GenerationRequest, velocity};
use crate::types::{Note, TICKS_PER_SIXTEENTH};
use midigen_prng::MusicRng;

/// Note lengths, in sixteenths.
const DURATIONS: [u32; 6] = [1, 2, 3, 4, 6, 8];

/// Degree steps and their base weights.
const STEPS: [i32; 9] = [-4, -3, -2, -1, 0, 1, 2, 3, 4];
const STEP_WEIGHTS: [f64; 9] = [0.3, 0.6, 2.5, 4.0, 1.2, 4.0, 2.5, 0.6, 0.3];

/// Per-voice shaping of the walk.
struct LineStyle {
    density_scale: f64,
    velocity_offset: i32,
    velocity_spread: u32,
    rest_chance: f64,
    /// Delay before the first note, in beats.
    entry_beats: u32,
}

const LEAD: LineStyle = LineStyle {
    density_scale: 1.0,
    velocity_offset: 0,
    velocity_spread: 12,
    rest_chance: 0.18,
    entry_beats: 0,
};

/// Lower, longer and softer than the lead; enters a beat late.
const COUNTER: LineStyle = LineStyle {
    density_scale: 0.6,
    velocity_offset: -12,
    velocity_spread: 8,
    rest_chance: 0.25,
    entry_beats: 1,
};

pub fn generate_melody(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    walk(req, rng, &LEAD)
}

pub fn generate_counter_melody(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    walk(req, rng, &COUNTER)
}

fn duration_weights(density: f64) -> [f64; 6] {
    let d = density.clamp(0.0, 1.0);
    [
        4.0 * d * d,
        4.0 * d,
        d,
        2.0,
        1.5 * (1.0 - d),
        3.0 * (1.0 - d),
    ]
}

fn walk(req: &GenerationRequest<'_>, rng: &mut MusicRng, style: &LineStyle) -> Vec<Note> {
    let total = req.total_ticks();
    let pool = req.pitch_pool();
    if total == 0 || pool.is_empty() {
        return Vec::new();
    }

    let density = (req.density * style.density_scale).clamp(0.05, 1.0);
    let phrase_ticks = req.ticks_per_bar * if density < 0.35 { 4 } else { 2 };
    let dur_weights = duration_weights(density);
    let last = pool.len() as i32 - 1;
    let soft_low = pool.len() as i32 / 4;
    let soft_high = last - pool.len() as i32 / 4;

    // Start on the tonic nearest the middle of the range.
    let middle = last / 2;
    let mut idx = (0..=last)
        .filter(|&i| req.scale.scale_degree(pool[i as usize]) == Some(0))
        .min_by_key(|&i| (i - middle).abs())
        .unwrap_or(middle);

    let mut notes = Vec::new();
    let mut tick = style.entry_beats * req.ticks_per_beat;
    while tick < total {
        if !notes.is_empty() && rng.random_bool(style.rest_chance * (1.0 - density * 0.5)) {
            let rest = *rng.choose(&[1u32, 2, 4]).unwrap_or(&2) * TICKS_PER_SIXTEENTH;
            tick += rest.min(req.ticks_per_beat);
            continue;
        }

        let mut duration = DURATIONS[rng.weighted_index(&dur_weights).unwrap_or(3)] * TICKS_PER_SIXTEENTH;
        let boundary = (tick / phrase_ticks + 1) * phrase_ticks;
        let cadence = tick + duration >= boundary;

        let mut step = STEPS[rng.weighted_index(&STEP_WEIGHTS).unwrap_or(4)];
        let drifting = (idx + step > soft_high && step > 0) || (idx + step < soft_low && step < 0);
        if drifting && rng.random_bool(0.6) {
            step = -step;
        }
        idx = reflect(idx + step, last);

        if cadence {
            idx = nearest_stable(req, &pool, idx);
            duration = boundary - tick;
        }

        let accent = if tick % req.ticks_per_beat == 0 { 3 } else { 0 };
        let vel = velocity(req.energy, style.velocity_offset + accent, rng, style.velocity_spread);
        if let Some(note) = req.note(pool[idx as usize], tick, duration, vel) {
            notes.push(note);
        }
        tick += duration;
    }
    notes
}

/// Fold an out-of-range pool index back inside `0..=last`.
fn reflect(idx: i32, last: i32) -> i32 {
    if last <= 0 {
        return 0;
    }
    let mut i = idx;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i.clamp(0, last)
}

/// Closest pool index whose pitch is a stable degree (tonic, third, fifth).
fn nearest_stable(req: &GenerationRequest<'_>, pool: &[u8], idx: i32) -> i32 {
    (0..pool.len() as i32)
        .filter(|&i| req.scale.pitch_fitness(pool[i as usize]) >= 1.1)
        .min_by_key(|&i| (i - idx).abs())
        .unwrap_or(idx)
}
