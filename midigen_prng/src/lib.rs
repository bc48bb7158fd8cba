// Deterministic, portable pseudo-random number generator for MidiGen.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) seeded through SplitMix64.
// Hand-rolled with no RNG crate so that a given seed produces the same note
// stream on every platform and compiler version; the pipeline's
// reproducibility guarantee (same prompt + seed => byte-identical MIDI)
// rests on this crate.
//
// Every generated track owns its own `MusicRng`, derived from the run seed
// with `derive_seed(base, &[salt...])`. Regenerating one track with a new
// attempt number therefore never perturbs the random stream of any other
// track.
//
// **Critical constraint: determinism.** The core generator uses integer
// arithmetic only. Float helpers (`next_f64`, `weighted_index`) are derived
// from integer output with a fixed, exact conversion.

/// Xoshiro256++ PRNG, the sole source of randomness in note generation.
#[derive(Clone, Debug)]
pub struct MusicRng {
    s: [u64; 4],
}

impl MusicRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Create a PRNG whose seed is `derive_seed(base, salts)`.
    pub fn derived(base: u64, salts: &[u64]) -> Self {
        Self::new(derive_seed(base, salts))
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo bias.
    ///
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform `u32` in `[low, high]`, inclusive on both ends.
    ///
    /// Panics if `low > high`.
    pub fn range_u32_inclusive(&mut self, low: u32, high: u32) -> u32 {
        assert!(low <= high, "range_u32_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as u32
    }

    /// Uniform `i32` in `[-spread, spread]`. Used for velocity and timing jitter.
    pub fn jitter(&mut self, spread: u32) -> i32 {
        if spread == 0 {
            return 0;
        }
        self.range_u64(0, 2 * spread as u64 + 1) as i32 - spread as i32
    }

    /// Return `true` with probability `p`. `p <= 0` is always false,
    /// `p >= 1` always true.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick a uniformly random element, or `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            Some(&items[self.range_usize(0, items.len())])
        }
    }

    /// Sample an index proportionally to `weights`.
    ///
    /// Non-positive weights are never chosen. Returns `None` when no weight
    /// is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (i, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            cumulative += w;
            last_positive = Some(i);
            if target < cumulative {
                return Some(i);
            }
        }
        // Rounding can leave `target` a hair above the final cumulative sum.
        last_positive
    }
}

/// Mix a base seed with a list of salts into a new seed.
///
/// Order-sensitive: `derive_seed(s, &[1, 2]) != derive_seed(s, &[2, 1])`.
pub fn derive_seed(base: u64, salts: &[u64]) -> u64 {
    let mut state = base;
    let mut out = splitmix64(&mut state);
    for &salt in salts {
        state ^= salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        out = out.rotate_left(17) ^ splitmix64(&mut state);
    }
    out
}

/// Stable 64-bit FNV-1a hash of a string, for turning prompts into seeds.
pub fn hash_str(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// SplitMix64, used only for seeding and seed derivation.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = MusicRng::new(42);
        let mut b = MusicRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = MusicRng::new(42);
        let mut b = MusicRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn derived_streams_are_independent_per_salt() {
        let mut melody = MusicRng::derived(7, &[0, 0]);
        let mut melody_again = MusicRng::derived(7, &[0, 0]);
        let mut bass = MusicRng::derived(7, &[2, 0]);
        let mut melody_retry = MusicRng::derived(7, &[0, 1]);

        let first = melody.next_u64();
        assert_eq!(first, melody_again.next_u64());
        assert_ne!(first, bass.next_u64());
        assert_ne!(first, melody_retry.next_u64());
    }

    #[test]
    fn derive_seed_is_order_sensitive() {
        assert_ne!(derive_seed(1, &[1, 2]), derive_seed(1, &[2, 1]));
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = MusicRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_u32_inclusive_reaches_both_ends() {
        let mut rng = MusicRng::new(666);
        let mut saw_low = false;
        let mut saw_high = false;
        for _ in 0..10_000 {
            let v = rng.range_u32_inclusive(3, 5);
            assert!((3..=5).contains(&v));
            saw_low |= v == 3;
            saw_high |= v == 5;
        }
        assert!(saw_low && saw_high);
    }

    #[test]
    fn jitter_stays_within_spread() {
        let mut rng = MusicRng::new(9);
        for _ in 0..10_000 {
            let v = rng.jitter(15);
            assert!((-15..=15).contains(&v), "jitter out of range: {v}");
        }
        assert_eq!(rng.jitter(0), 0);
    }

    #[test]
    fn weighted_index_skips_zero_weights() {
        let mut rng = MusicRng::new(3);
        for _ in 0..5_000 {
            let i = rng.weighted_index(&[0.0, 2.0, 0.0, 1.0]).unwrap();
            assert!(i == 1 || i == 3, "zero-weight index chosen: {i}");
        }
        assert_eq!(rng.weighted_index(&[0.0, -1.0]), None);
        assert_eq!(rng.weighted_index(&[]), None);
    }

    #[test]
    fn weighted_index_follows_weights() {
        let mut rng = MusicRng::new(11);
        let mut heavy = 0;
        let n = 10_000;
        for _ in 0..n {
            if rng.weighted_index(&[9.0, 1.0]) == Some(0) {
                heavy += 1;
            }
        }
        let pct = heavy as f64 / n as f64;
        assert!((0.85..0.95).contains(&pct), "expected ~90%, got {pct:.3}");
    }

    #[test]
    fn choose_handles_empty_slice() {
        let mut rng = MusicRng::new(1);
        let empty: [u8; 0] = [];
        assert_eq!(rng.choose(&empty), None);
        assert_eq!(rng.choose(&[5u8]), Some(&5));
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = MusicRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn hash_str_is_stable() {
        assert_eq!(hash_str(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(hash_str("lofi beat"), hash_str("lofi beat"));
        assert_ne!(hash_str("lofi beat"), hash_str("lofi beats"));
    }
}
