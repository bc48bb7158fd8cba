// MidiGen: prompt-to-MIDI multi-track generation.
//
// Turns a natural-language description ("4 minute ambient piece at 90 BPM")
// into a multi-track Standard MIDI File. A bounded state machine parses the
// intent, plans instrumentation, repairs the plan against music theory,
// generates every track procedurally, scores the result, optionally
// regenerates the weakest tracks, and serializes the best candidate.
//
// Architecture:
// - types.rs: Core data model (intent, roles, track configs, notes, tracks)
// - registry.rs: Static knowledge base (scales, genre profiles, chord
//   progressions, GM program names), validated at startup
// - scale.rs: A scale rooted on a tonic: membership, snapping, degree weights
// - intent.rs: Prompt to `MusicIntent` (LLM reply merged over a keyword scan)
// - planner.rs: Which roles, channels and instruments a composition gets
// - theory.rs: Deterministic repairs to a plan, plus scale resolution
// - generate.rs: The shared role-algorithm contract, chord timeline and
//   per-track seeding
// - melody.rs, bass.rs, drums.rs, harmony.rs, fx.rs: Role algorithms
// - quality.rs: Four-dimension quality scoring with per-track scores
// - refine.rs: Selects and reconfigures the weakest tracks
// - midi.rs: SMF encoding via `midly`
// - pipeline.rs: Stage machine, best-candidate tracking, parallel runs
// - config.rs: `PipelineConfig` (JSON, serde defaults) and gateway setup
// - error.rs: Error types
//
// The generator is deterministic given a seed: the same prompt, seed and
// configuration always produce byte-identical MIDI.

pub mod bass;
pub mod config;
pub mod drums;
pub mod error;
pub mod fx;
pub mod generate;
pub mod harmony;
pub mod intent;
pub mod melody;
pub mod midi;
pub mod pipeline;
pub mod planner;
pub mod quality;
pub mod refine;
pub mod registry;
pub mod scale;
pub mod theory;
pub mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOutput, run_pipeline};
