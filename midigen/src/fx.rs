// FX: a few sustained accents at section boundaries.
//
// One to three hits per composition, each on the downbeat of a different
// 8-bar section, lasting up to two bars. Sparse on purpose: this is the one
// role allowed long silences.

use crate::drums::SECTION_BARS;
use crate::generate::{GenerationRequest, velocity};
use crate::types::Note;
use midigen_prng::MusicRng;

/// Intervals above the tonic an accent may sound on.
const ACCENT_INTERVALS: [i32; 5] = [0, 7, 12, 19, -5];

pub fn generate(req: &GenerationRequest<'_>, rng: &mut MusicRng) -> Vec<Note> {
    if req.total_ticks() == 0 {
        return Vec::new();
    }
    let mut boundaries: Vec<u32> = (0..req.bars).step_by(SECTION_BARS as usize).collect();
    let wanted = (rng.range_u32_inclusive(1, 3) as usize).min(boundaries.len());

    let mut chosen = Vec::with_capacity(wanted);
    for _ in 0..wanted {
        let i = rng.range_usize(0, boundaries.len());
        chosen.push(boundaries.remove(i));
    }
    chosen.sort_unstable();

    let (low, high) = req.pitch_range;
    let anchor = req.scale.tonic_near(((low as u32 + high as u32) / 2) as u8) as i32;
    let candidates: Vec<u8> = ACCENT_INTERVALS
        .iter()
        .map(|iv| anchor + iv)
        .filter(|p| (low as i32..=high as i32).contains(p))
        .map(|p| p as u8)
        .collect();

    chosen
        .into_iter()
        .filter_map(|bar| {
            let pitch = rng
                .choose(&candidates)
                .copied()
                .unwrap_or(((low as u32 + high as u32) / 2) as u8);
            let vel = velocity(req.energy, -25, rng, 10);
            req.note(pitch, bar * req.ticks_per_bar, 2 * req.ticks_per_bar, vel)
        })
        .collect()
}
