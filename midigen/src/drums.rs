// Drums: per-genre groove templates on a sixteenth-note grid.
//
// A template lists, per drum sound, the sixteenth steps (0-15 of a 4/4 bar)
// it plays on. The template loops every bar; bars of other lengths use the
// first `ticks_per_bar / 120` steps. Hits flagged optional are dropped at low
// energy or low density. On top of the loop:
//
//   - a crash on the first beat of every 8-bar section (medium energy up)
//   - a tom fill in the last beat of each section (high energy up)
//   - genre swing delays off-beat eighths and sixteenths
//   - per-hit velocity jitter
//
// Note numbers follow the General MIDI percussion map.

use crate::generate::GenerationRequest;
use crate::registry::DrumStyle;
use crate::types::{Energy, Note, TICKS_PER_SIXTEENTH};
use midigen_prng::MusicRng;

pub const KICK: u8 = 36;
pub const SIDE_STICK: u8 = 37;
pub const SNARE: u8 = 38;
pub const CLAP: u8 = 39;
pub const LOW_FLOOR_TOM: u8 = 41;
pub const CLOSED_HAT: u8 = 42;
pub const PEDAL_HAT: u8 = 44;
pub const LOW_TOM: u8 = 45;
pub const OPEN_HAT: u8 = 46;
pub const MID_TOM: u8 = 47;
pub const HIGH_TOM: u8 = 50;
pub const CRASH: u8 = 49;
pub const RIDE: u8 = 51;
pub const CLAVES: u8 = 75;

/// Bars per section; crashes and fills mark section edges.
pub const SECTION_BARS: u32 = 8;

/// Length of every drum hit.
const HIT_TICKS: u32 = TICKS_PER_SIXTEENTH / 2;

struct Hit {
    note: u8,
    steps: &'static [u8],
    velocity: u8,
    optional: bool,
}

const fn hit(note: u8, steps: &'static [u8], velocity: u8) -> Hit {
    Hit {
        note,
        steps,
        velocity,
        optional: false,
    }
}

const fn ghost(note: u8, steps: &'static [u8], velocity: u8) -> Hit {
    Hit {
        note,
        steps,
        velocity,
        optional: true,
    }
}

const STANDARD: &[Hit] = &[
    hit(KICK, &[0, 8], 100),
    hit(SNARE, &[4, 12], 95),
    hit(CLOSED_HAT, &[0, 4, 8, 12], 72),
    ghost(CLOSED_HAT, &[2, 6, 10, 14], 62),
];

const ROCK: &[Hit] = &[
    hit(KICK, &[0, 6, 8], 105),
    hit(SNARE, &[4, 12], 100),
    hit(CLOSED_HAT, &[0, 2, 4, 6, 8, 10, 12, 14], 75),
    ghost(KICK, &[14], 85),
];

const METAL: &[Hit] = &[
    hit(KICK, &[0, 2, 4, 6, 8, 10, 12, 14], 105),
    hit(SNARE, &[4, 12], 108),
    hit(RIDE, &[0, 4, 8, 12], 85),
    ghost(KICK, &[1, 3, 5, 7, 9, 11, 13, 15], 95),
];

const FOUR_ON_FLOOR: &[Hit] = &[
    hit(KICK, &[0, 4, 8, 12], 108),
    hit(CLAP, &[4, 12], 92),
    hit(OPEN_HAT, &[2, 6, 10, 14], 76),
    ghost(CLOSED_HAT, &[1, 3, 5, 7, 9, 11, 13, 15], 55),
];

const HIP_HOP: &[Hit] = &[
    hit(KICK, &[0, 7, 10], 100),
    hit(SNARE, &[4, 12], 96),
    hit(CLOSED_HAT, &[0, 4, 8, 12], 66),
    ghost(CLOSED_HAT, &[2, 6, 10, 14], 56),
];

const JAZZ: &[Hit] = &[
    hit(RIDE, &[0, 4, 6, 8, 12, 14], 76),
    hit(PEDAL_HAT, &[4, 12], 58),
    ghost(KICK, &[0], 55),
    ghost(SNARE, &[10], 42),
];

const FUNK: &[Hit] = &[
    hit(KICK, &[0, 3, 8, 10], 102),
    hit(SNARE, &[4, 12], 100),
    hit(CLOSED_HAT, &[0, 2, 4, 6, 8, 10, 12, 14], 70),
    ghost(SNARE, &[7, 9, 15], 48),
    ghost(CLOSED_HAT, &[1, 3, 5, 9, 11, 13], 52),
];

const LATIN: &[Hit] = &[
    hit(KICK, &[0, 6, 8, 14], 95),
    hit(CLAVES, &[0, 3, 6, 10, 12], 80),
    hit(SIDE_STICK, &[4, 12], 78),
    ghost(CLOSED_HAT, &[2, 6, 10, 14], 60),
];

const MINIMAL: &[Hit] = &[hit(KICK, &[0], 72), ghost(RIDE, &[8], 52)];

const CINEMATIC: &[Hit] = &[
    hit(KICK, &[0, 8], 105),
    hit(SNARE, &[12], 98),
    hit(LOW_TOM, &[6, 14], 90),
    ghost(MID_TOM, &[10], 84),
];

const FILL: [(u8, u8); 4] = [(HIGH_TOM, 12), (MID_TOM, 13), (LOW_TOM, 14), (LOW_FLOOR_TOM, 15)];

fn template(style: DrumStyle) -> &'static [Hit] {
    match style {
        DrumStyle::Standard => STANDARD,
        DrumStyle::Rock => ROCK,
        DrumStyle::Metal => METAL,
        DrumStyle::FourOnFloor => FOUR_ON_FLOOR,
        DrumStyle::HipHop => HIP_HOP,
        DrumStyle::Jazz => JAZZ,
        DrumStyle::Funk => FUNK,
        DrumStyle::Latin => LATIN,
        DrumStyle::Minimal => MINIMAL,
        DrumStyle::Cinematic => CINEMATIC,
    }
}

fn energy_offset(energy: Energy) -> i32 {
    match energy {
        Energy::Low => -15,
        Energy::Medium => 0,
        Energy::High => 6,
        Energy::VeryHigh => 10,
    }
}

/// Swing delay for a step: off-beat eighths shift by `swing` sixteenths,
/// off-beat sixteenths by half that.
fn swing_delay(step: u32, swing: f64) -> u32 {
    if step % 4 == 2 {
        (swing * TICKS_PER_SIXTEENTH as f64).round() as u32
    } else if step % 2 == 1 {
        (swing * TICKS_PER_SIXTEENTH as f64 / 2.0).round() as u32
    } else {
        0
    }
}

pub fn generate(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    let total = req.total_ticks();
    if total == 0 {
        return Vec::new();
    }
    let style = req.genre.drum_style;
    let hits = template(style);
    let steps_per_bar = (req.ticks_per_bar / TICKS_PER_SIXTEENTH).max(1);
    let keep_optional = req.energy > Energy::Low && req.density >= 0.4;
    let jitter = if req.genre.swing > 0.0 { 8 } else { 5 };
    let crash = req.energy >= Energy::Medium && style != DrumStyle::Minimal;
    let fills = req.energy >= Energy::High && !matches!(style, DrumStyle::Minimal | DrumStyle::Jazz);

    let mut notes = Vec::new();
    let mut bar_hits: Vec<(u32, u8, i32)> = Vec::new();
    for bar in 0..req.bars {
        bar_hits.clear();
        let bar_start = bar * req.ticks_per_bar;
        let fill_bar = fills && bar % SECTION_BARS == SECTION_BARS - 1 && steps_per_bar >= 16;

        for h in hits.iter().filter(|h| keep_optional || !h.optional) {
            for &step in h.steps {
                let step = step as u32;
                if step >= steps_per_bar || (fill_bar && step >= 12) {
                    continue;
                }
                bar_hits.push((step, h.note, h.velocity as i32));
            }
        }
        if fill_bar {
            for (i, &(note, step)) in FILL.iter().enumerate() {
                bar_hits.push((step as u32, note, 88 + 4 * i as i32));
            }
        }
        if crash && bar % SECTION_BARS == 0 {
            bar_hits.push((0, CRASH, 100));
        }

        let mut placed: Vec<Note> = bar_hits
            .iter()
            .filter_map(|&(step, note, vel)| {
                let start = bar_start + step * TICKS_PER_SIXTEENTH + swing_delay(step, req.genre.swing);
                let vel = vel + energy_offset(req.energy) + rng.jitter(jitter);
                req.note(note, start, HIT_TICKS, vel)
            })
            .collect();
        placed.sort_by_key(|n| (n.start_tick, n.pitch));
        notes.extend(placed);
    }
    notes
}
