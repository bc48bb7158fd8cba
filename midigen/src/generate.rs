// Track generation: the shared contract for all role algorithms.
//
// Every role algorithm has the same shape, `fn(&GenerationRequest, &mut
// MusicRng) -> Vec<Note>`, and the same obligations:
//
//   - notes are ordered by start tick and lie within `bars * ticks_per_bar`
//   - pitches stay inside the request's pitch range
//   - velocities are in 1..=127 and durations are non-zero
//   - no silence longer than one bar (FX is sparse by design and exempt)
//   - `bars == 0` yields an empty list
//
// Algorithms do not see each other's output. Harmonic context (which chord
// is active when) comes from a read-only `ChordTimeline`, planned once per
// run from the genre's progression, so bass, arpeggio, pad and chords agree
// no matter which of them is regenerated during refinement.
//
// Each track draws from its own `MusicRng`, seeded from the run seed, the
// role, and the regeneration attempt.

use crate::error::GenerationError;
use crate::registry::{GenreProfile, Registry};
use crate::scale::ScaleInstance;
use crate::types::{Energy, MusicIntent, Note, Role, Track, TrackConfig};
use crate::{bass, drums, fx, harmony, melody};
use midigen_prng::MusicRng;

/// Signature shared by all role algorithms.
pub type RoleAlgorithm = fn(&GenerationRequest<'_>, &mut MusicRng) -> Vec<Note>;

/// The algorithm that generates a role.
pub fn algorithm_for(role: Role) -> RoleAlgorithm {
    match role {
        Role::Melody => melody::generate_melody,
        Role::CounterMelody => melody::generate_counter_melody,
        Role::Bass => bass::generate,
        Role::Drums => drums::generate,
        Role::Chords => harmony::generate_chords,
        Role::Arpeggio => harmony::generate_arpeggio,
        Role::Pad => harmony::generate_pad,
        Role::Fx => fx::generate,
    }
}

/// Everything a role algorithm may look at.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub scale: &'a ScaleInstance,
    pub bars: u32,
    pub ticks_per_bar: u32,
    pub ticks_per_beat: u32,
    /// Target density in [0, 1].
    pub density: f64,
    pub energy: Energy,
    pub pitch_range: (u8, u8),
    pub channel: u8,
    pub genre: &'a GenreProfile,
    pub chords: &'a ChordTimeline,
}

impl GenerationRequest<'_> {
    pub fn total_ticks(&self) -> u32 {
        self.bars.saturating_mul(self.ticks_per_bar)
    }

    /// Scale pitches inside the pitch range, or every pitch in the range if
    /// the range is too narrow to hold a scale tone.
    pub fn pitch_pool(&self) -> Vec<u8> {
        let (low, high) = self.pitch_range;
        let pool = self.scale.pitches_in_range(low, high);
        if pool.is_empty() {
            (low..=high).collect()
        } else {
            pool
        }
    }

    /// Build a note, clipping it to the composition end. Returns `None` if
    /// nothing of it would sound.
    pub fn note(&self, pitch: u8, start: u32, duration: u32, velocity: i32) -> Option<Note> {
        let end = start.saturating_add(duration).min(self.total_ticks());
        if end <= start {
            return None;
        }
        let (low, high) = self.pitch_range;
        Some(Note {
            pitch: pitch.clamp(low, high),
            start_tick: start,
            duration_ticks: end - start,
            velocity: velocity.clamp(1, 127) as u8,
            channel: self.channel,
        })
    }
}

// ── Chord timeline ──────────────────────────────────────────────────

/// One chord held over a run of whole bars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordSpan {
    pub start_bar: u32,
    pub bars: u32,
    /// Semitone offsets above the tonic, ascending, deduplicated. The first
    /// entry is the chord root.
    pub tones: Vec<u8>,
}

impl ChordSpan {
    pub fn root_offset(&self) -> u8 {
        self.tones.first().copied().unwrap_or(0)
    }

    pub fn root_pc(&self, tonic_pc: u8) -> u8 {
        (tonic_pc + self.root_offset()) % 12
    }

    /// Intervals above the root, ascending.
    pub fn intervals_above_root(&self) -> Vec<u8> {
        let root = self.root_offset();
        self.tones.iter().map(|t| t - root).collect()
    }

    /// Close voicing inside `[low, high]`: the root is the lowest instance of
    /// its pitch class at or above `low`, other tones stack above it, and
    /// tones that overshoot `high` are dropped (the root is always kept).
    pub fn voicing(&self, tonic_pc: u8, low: u8, high: u8) -> Vec<u8> {
        let root_pc = self.root_pc(tonic_pc);
        let mut base = low as u32 + ((root_pc as u32 + 12 - low as u32 % 12) % 12);
        if base > high as u32 && base >= low as u32 + 12 {
            base -= 12;
        }
        let base = base.min(high as u32);
        let mut pitches: Vec<u8> = self
            .intervals_above_root()
            .into_iter()
            .map(|iv| base + iv as u32)
            .filter(|&p| p <= high as u32)
            .map(|p| p as u8)
            .collect();
        if pitches.is_empty() {
            pitches.push(base as u8);
        }
        pitches
    }
}

/// Which chord sounds in every bar of the piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordTimeline {
    spans: Vec<ChordSpan>,
    bars_per_chord: u32,
    ticks_per_bar: u32,
}

impl ChordTimeline {
    /// Bars each chord lasts at a given chord-track density.
    pub fn bars_per_chord(density: f64) -> u32 {
        if density >= 0.65 {
            1
        } else if density >= 0.4 {
            2
        } else {
            4
        }
    }

    /// Cycle `progression` through `bars` bars, snapping every chord tone
    /// onto `scale`.
    pub fn plan(
        progression: &[&[u8]],
        scale: &ScaleInstance,
        bars: u32,
        bars_per_chord: u32,
        ticks_per_bar: u32,
    ) -> ChordTimeline {
        let bars_per_chord = bars_per_chord.max(1);
        let mut spans = Vec::new();
        let mut start = 0;
        let mut index = 0;
        while start < bars && !progression.is_empty() {
            let mut tones: Vec<u8> = progression[index % progression.len()]
                .iter()
                .map(|&offset| scale.snap_offset(offset))
                .collect();
            tones.sort_unstable();
            tones.dedup();
            let len = bars_per_chord.min(bars - start);
            spans.push(ChordSpan {
                start_bar: start,
                bars: len,
                tones,
            });
            start += len;
            index += 1;
        }
        ChordTimeline {
            spans,
            bars_per_chord,
            ticks_per_bar,
        }
    }

    /// The timeline for a run: the genre's progression at the pace set by
    /// the chords track (or a two-bar pace when there is none).
    pub fn for_plan(
        intent: &MusicIntent,
        scale: &ScaleInstance,
        configs: &[TrackConfig],
        registry: &Registry,
    ) -> ChordTimeline {
        let genre = registry.genre_or_default(&intent.genre);
        let density = configs
            .iter()
            .find(|c| c.role == Role::Chords)
            .map(|c| c.density)
            .unwrap_or(0.5);
        ChordTimeline::plan(
            genre.progression,
            scale,
            intent.duration_bars,
            ChordTimeline::bars_per_chord(density),
            intent.ticks_per_bar(),
        )
    }

    pub fn spans(&self) -> &[ChordSpan] {
        &self.spans
    }

    pub fn chord_length_bars(&self) -> u32 {
        self.bars_per_chord
    }

    pub fn at_bar(&self, bar: u32) -> Option<&ChordSpan> {
        self.spans
            .iter()
            .find(|s| bar >= s.start_bar && bar < s.start_bar + s.bars)
    }

    pub fn at_tick(&self, tick: u32) -> Option<&ChordSpan> {
        self.at_bar(tick / self.ticks_per_bar.max(1))
    }

    /// (start, end) ticks of a span.
    pub fn span_ticks(&self, span: &ChordSpan) -> (u32, u32) {
        (
            span.start_bar * self.ticks_per_bar,
            (span.start_bar + span.bars) * self.ticks_per_bar,
        )
    }
}

// ── Generator ───────────────────────────────────────────────────────

/// Generates tracks for one run. Cheap to build; holds only borrows.
pub struct TrackGenerator<'a> {
    registry: &'a Registry,
    intent: &'a MusicIntent,
    scale: &'a ScaleInstance,
    chords: &'a ChordTimeline,
    seed: u64,
}

impl<'a> TrackGenerator<'a> {
    pub fn new(
        registry: &'a Registry,
        intent: &'a MusicIntent,
        scale: &'a ScaleInstance,
        chords: &'a ChordTimeline,
        seed: u64,
    ) -> Self {
        TrackGenerator {
            registry,
            intent,
            scale,
            chords,
            seed,
        }
    }

    /// Generate a track, substituting silence if the algorithm fails.
    pub fn generate(&self, config: &TrackConfig, attempt: u32) -> Track {
        match self.try_generate(config, attempt) {
            Ok(track) => track,
            Err(err) => {
                tracing::warn!(role = ?config.role, error = %err, "substituting a silent track");
                Track::silent(config.clone())
            }
        }
    }

    pub fn try_generate(&self, config: &TrackConfig, attempt: u32) -> Result<Track, GenerationError> {
        let bars = self.intent.duration_bars;
        if bars == 0 {
            return Ok(Track::silent(config.clone()));
        }

        let request = GenerationRequest {
            scale: self.scale,
            bars,
            ticks_per_bar: self.intent.ticks_per_bar(),
            ticks_per_beat: self.intent.time_signature.ticks_per_beat(),
            density: config.density,
            energy: self.intent.energy,
            pitch_range: config.pitch_range,
            channel: config.channel,
            genre: self.registry.genre_or_default(&self.intent.genre),
            chords: self.chords,
        };
        let mut rng = MusicRng::derived(
            self.seed,
            &[config.role.index() as u64, attempt as u64],
        );
        let notes = algorithm_for(config.role)(&request, &mut rng);
        if notes.is_empty() {
            return Err(GenerationError::NoNotes {
                role: config.role,
                bars,
            });
        }
        tracing::debug!(role = ?config.role, attempt, notes = notes.len(), "generated track");
        Ok(Track::new(config.clone(), notes))
    }
}

/// Attack velocity for material centred on the energy's base velocity.
pub(crate) fn velocity(energy: Energy, offset: i32, rng: &mut MusicRng, spread: u32) -> i32 {
    energy.base_velocity() as i32 + offset + rng.jitter(spread)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::{IntentSource, TimeSignature};

    pub fn intent(genre: &str, energy: Energy, bars: u32) -> MusicIntent {
        MusicIntent {
            prompt: String::new(),
            genre: genre.into(),
            tempo_bpm: 120,
            key: 0,
            scale: "major".into(),
            energy,
            mood: String::new(),
            duration_bars: bars,
            requested_tracks: 0,
            time_signature: TimeSignature::COMMON,
            source: IntentSource::Keywords,
        }
    }

    /// Run one role algorithm directly, in 4/4.
    pub fn run_role(role: Role, genre: &str, energy: Energy, bars: u32, seed: u64) -> Vec<Note> {
        run_role_in(TimeSignature::COMMON, role, genre, energy, bars, seed)
    }

    pub fn run_role_in(
        meter: TimeSignature,
        role: Role,
        genre: &str,
        energy: Energy,
        bars: u32,
        seed: u64,
    ) -> Vec<Note> {
        let registry = Registry::builtin();
        let scale = ScaleInstance::new("major", 0, &[0, 2, 4, 5, 7, 9, 11]);
        let genre_profile = registry.genre_or_default(genre);
        let ticks_per_bar = meter.ticks_per_bar();
        let chords = ChordTimeline::plan(genre_profile.progression, &scale, bars, 2, ticks_per_bar);
        let request = GenerationRequest {
            scale: &scale,
            bars,
            ticks_per_bar,
            ticks_per_beat: meter.ticks_per_beat(),
            density: (role.base_density() * energy.density_scale()).min(1.0),
            energy,
            pitch_range: role.default_pitch_range(),
            channel: 3,
            genre: genre_profile,
            chords: &chords,
        };
        let mut rng = MusicRng::new(seed);
        algorithm_for(role)(&request, &mut rng)
    }

    /// Longest stretch (in ticks) with nothing sounding, including the
    /// stretches before the first note and after the last.
    pub fn longest_silence(notes: &[Note], total: u32) -> u32 {
        let mut longest = 0;
        let mut covered_until = 0u32;
        for note in notes {
            if note.start_tick > covered_until {
                longest = longest.max(note.start_tick - covered_until);
            }
            covered_until = covered_until.max(note.end_tick());
        }
        longest.max(total.saturating_sub(covered_until))
    }

    /// Assert the shared algorithm contract for a 4/4 run.
    pub fn assert_contract(role: Role, notes: &[Note], bars: u32) {
        assert_contract_in(TimeSignature::COMMON, role, notes, bars);
    }

    pub fn assert_contract_in(meter: TimeSignature, role: Role, notes: &[Note], bars: u32) {
        let bar = meter.ticks_per_bar();
        let total = bars * bar;
        let (low, high) = role.default_pitch_range();
        assert!(!notes.is_empty(), "{role}: no notes");
        for pair in notes.windows(2) {
            assert!(pair[0].start_tick <= pair[1].start_tick, "{role}: out of order");
        }
        for note in notes {
            assert!(note.duration_ticks > 0, "{role}: zero duration");
            assert!(note.end_tick() <= total, "{role}: note past the end");
            assert!((1..=127).contains(&note.velocity), "{role}: velocity {}", note.velocity);
            assert!((low..=high).contains(&note.pitch), "{role}: pitch {}", note.pitch);
            assert_eq!(note.channel, 3);
        }
        if role != Role::Fx {
            assert!(longest_silence(notes, total) <= bar, "{role} in {meter}: gap longer than a bar");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::TimeSignature;

    #[test]
    fn every_role_honours_the_contract() {
        for role in Role::ALL {
            for energy in Energy::ALL {
                for genre in ["pop", "jazz", "ambient", "metal", "lofi"] {
                    let notes = run_role(role, genre, energy, 12, 7);
                    assert_contract(role, &notes, 12);
                }
            }
        }
    }

    #[test]
    fn contract_holds_in_odd_meters() {
        for (numerator, denominator) in [(3, 4), (6, 8), (7, 8)] {
            let meter = TimeSignature::new(numerator, denominator).unwrap();
            for role in Role::ALL {
                for energy in Energy::ALL {
                    for genre in ["pop", "ambient", "lofi"] {
                        let notes = run_role_in(meter, role, genre, energy, 12, 7);
                        assert_contract_in(meter, role, &notes, 12);
                    }
                }
            }
        }
    }

    #[test]
    fn zero_bars_yields_no_notes() {
        for role in Role::ALL {
            assert!(run_role(role, "pop", Energy::High, 0, 1).is_empty(), "{role}");
        }
    }

    #[test]
    fn algorithms_are_deterministic() {
        for role in Role::ALL {
            let a = run_role(role, "rock", Energy::High, 8, 99);
            let b = run_role(role, "rock", Energy::High, 8, 99);
            assert_eq!(a, b, "{role}");
        }
    }

    #[test]
    fn timeline_cycles_progression_and_snaps_to_scale() {
        let a_minor = ScaleInstance::new("minor", 9, &[0, 2, 3, 5, 7, 8, 10]);
        let pop = Registry::builtin().genre("pop").unwrap().progression;
        let timeline = ChordTimeline::plan(pop, &a_minor, 9, 2, 1920);
        let spans = timeline.spans();
        assert_eq!(spans.len(), 5);
        assert_eq!(spans[0].tones, vec![0, 3, 7]);
        assert_eq!(spans[4].start_bar, 8);
        assert_eq!(spans[4].bars, 1);
        // The fifth chord wraps back to the first.
        assert_eq!(spans[4].tones, spans[0].tones);
        assert_eq!(timeline.at_tick(1920 * 3).map(|s| s.start_bar), Some(2));
        assert!(timeline.at_bar(9).is_none());
    }

    #[test]
    fn chord_pace_follows_density() {
        assert_eq!(ChordTimeline::bars_per_chord(0.9), 1);
        assert_eq!(ChordTimeline::bars_per_chord(0.5), 2);
        assert_eq!(ChordTimeline::bars_per_chord(0.1), 4);
    }

    #[test]
    fn voicing_stays_in_range() {
        let span = ChordSpan {
            start_bar: 0,
            bars: 1,
            tones: vec![7, 11, 14],
        };
        // G major triad over a C tonic, voiced from C3.
        assert_eq!(span.voicing(0, 48, 72), vec![55, 59, 62]);
        // A cramped range keeps the root.
        assert_eq!(span.voicing(0, 55, 57), vec![55]);
    }

    #[test]
    fn generator_seeds_per_role_and_attempt() {
        let registry = Registry::builtin();
        let intent = intent("pop", Energy::Medium, 8);
        let scale = ScaleInstance::new("major", 0, &[0, 2, 4, 5, 7, 9, 11]);
        let configs = crate::planner::plan_tracks(&intent, &registry);
        let chords = ChordTimeline::for_plan(&intent, &scale, &configs, &registry);
        let generator = TrackGenerator::new(&registry, &intent, &scale, &chords, 5);

        let melody = &configs[0];
        let first = generator.generate(melody, 0);
        assert_eq!(first, generator.generate(melody, 0));
        assert_ne!(first.notes, generator.generate(melody, 1).notes);
    }

    #[test]
    fn zero_bar_intent_gives_silent_tracks() {
        let registry = Registry::builtin();
        let intent = intent("pop", Energy::Medium, 0);
        let scale = ScaleInstance::new("major", 0, &[0, 2, 4, 5, 7, 9, 11]);
        let configs = crate::planner::plan_tracks(&intent, &registry);
        let chords = ChordTimeline::for_plan(&intent, &scale, &configs, &registry);
        let generator = TrackGenerator::new(&registry, &intent, &scale, &chords, 5);
        for config in &configs {
            assert!(generator.try_generate(config, 0).unwrap().is_silent());
        }
    }
}
