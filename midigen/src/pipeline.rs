// Pipeline orchestrator: the stage machine that turns a prompt into MIDI.
//
// A run threads one `PipelineState` through a fixed sequence of stages:
//
//   IntentParsing -> TrackPlanning -> TheoryValidation -> TrackGeneration
//     -> QualityControl -> Refinement -> TrackGeneration -> ...
//                       -> MidiCreation -> Done
//
// with `Failed` reachable from any stage. Each stage handler has the shape
// `fn(&self, &mut PipelineState) -> Result<(), PipelineError>`; routing is a
// separate pure function of the finished stage and the state. A handler
// error is stored in the state's error slot and routes to `Failed`.
//
// QualityControl routes to Refinement while the latest overall score is
// below the acceptance threshold and iterations remain, and to MidiCreation
// otherwise. The score is advisory: a run never fails for scoring low. The
// best-scoring candidate seen so far is what gets serialized, so a
// refinement that makes things worse is discarded.
//
// State fields are `Option`s written by exactly one stage. Reading one
// before it is written is a routing bug and surfaces as
// `PipelineError::Internal`, as does exceeding the transition budget.
//
// `Pipeline` holds only immutable data (config, registry, gateway), so one
// pipeline can serve many runs at once; `run_many` fans prompts out over
// rayon's thread pool.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::generate::{ChordTimeline, TrackGenerator};
use crate::intent::extract_intent;
use crate::quality::{GenerationQualityReport, QualityEvaluator};
use crate::registry::Registry;
use crate::scale::ScaleInstance;
use crate::types::{MusicIntent, Role, Track, TrackConfig, TrackSummary};
use crate::{midi, planner, refine, theory};
use midigen_llm::{LlmGateway, OfflineGateway};
use midigen_prng::hash_str;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

/// Stage transitions allowed per run. A full run with the largest allowed
/// `max_iterations` needs well under this.
const TRANSITION_BUDGET: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    IntentParsing,
    TrackPlanning,
    TheoryValidation,
    TrackGeneration,
    QualityControl,
    Refinement,
    MidiCreation,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A scored set of tracks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tracks: Vec<Track>,
    pub report: GenerationQualityReport,
}

/// Everything one run knows. Created per prompt, dropped when it ends.
#[derive(Debug)]
pub struct PipelineState {
    pub prompt: String,
    pub seed: u64,
    pub(crate) intent: Option<MusicIntent>,
    pub(crate) scale: Option<ScaleInstance>,
    pub(crate) chords: Option<ChordTimeline>,
    pub(crate) configs: Option<Vec<TrackConfig>>,
    pub(crate) corrections: Vec<String>,
    pub(crate) tracks: Option<Vec<Track>>,
    pub(crate) report: Option<GenerationQualityReport>,
    /// Tracks before the last refinement, for the creativity score.
    pub(crate) previous_tracks: Option<Vec<Track>>,
    pub(crate) best: Option<Candidate>,
    /// Regeneration attempts per role; part of each track's RNG seed.
    pub(crate) attempts: BTreeMap<Role, u32>,
    /// Roles the next generation pass must redo; `None` means all.
    pub(crate) pending_regeneration: Option<Vec<Role>>,
    pub(crate) iteration_count: u32,
    pub(crate) generation_passes: u32,
    pub(crate) midi: Option<Vec<u8>>,
    pub(crate) error: Option<PipelineError>,
}

fn missing(field: &str) -> PipelineError {
    PipelineError::Internal(format!("{field} read before it was written"))
}

impl PipelineState {
    pub fn new(prompt: &str, seed: u64) -> Self {
        PipelineState {
            prompt: prompt.to_string(),
            seed,
            intent: None,
            scale: None,
            chords: None,
            configs: None,
            corrections: Vec::new(),
            tracks: None,
            report: None,
            previous_tracks: None,
            best: None,
            attempts: BTreeMap::new(),
            pending_regeneration: None,
            iteration_count: 0,
            generation_passes: 0,
            midi: None,
            error: None,
        }
    }

    pub fn intent(&self) -> Result<&MusicIntent, PipelineError> {
        self.intent.as_ref().ok_or_else(|| missing("intent"))
    }

    pub fn scale(&self) -> Result<&ScaleInstance, PipelineError> {
        self.scale.as_ref().ok_or_else(|| missing("scale"))
    }

    pub fn configs(&self) -> Result<&[TrackConfig], PipelineError> {
        self.configs.as_deref().ok_or_else(|| missing("track configs"))
    }

    pub fn tracks(&self) -> Result<&[Track], PipelineError> {
        self.tracks.as_deref().ok_or_else(|| missing("tracks"))
    }

    pub fn report(&self) -> Result<&GenerationQualityReport, PipelineError> {
        self.report.as_ref().ok_or_else(|| missing("quality report"))
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn generation_passes(&self) -> u32 {
        self.generation_passes
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub midi_bytes: Vec<u8>,
    /// Report of the candidate that was serialized.
    pub report: GenerationQualityReport,
    pub track_summaries: Vec<TrackSummary>,
    /// The serialized tracks.
    pub tracks: Vec<Track>,
    pub intent: MusicIntent,
    pub seed: u64,
    pub generation_passes: u32,
    pub iterations: u32,
    pub corrections: Vec<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: Registry,
    gateway: Box<dyn LlmGateway>,
}

impl Pipeline {
    /// A pipeline over the built-in registry. Fails on invalid configuration.
    pub fn new(config: PipelineConfig, gateway: Box<dyn LlmGateway>) -> Result<Self, PipelineError> {
        Self::with_registry(config, Registry::builtin(), gateway)
    }

    pub fn with_registry(
        config: PipelineConfig,
        registry: Registry,
        gateway: Box<dyn LlmGateway>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        registry.validate()?;
        Ok(Pipeline {
            config,
            registry,
            gateway,
        })
    }

    /// Default configuration, keyword-only intent extraction.
    pub fn offline() -> Result<Self, PipelineError> {
        Self::new(PipelineConfig::default(), Box::new(OfflineGateway))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Base seed for a prompt.
    pub fn seed_for(&self, prompt: &str) -> u64 {
        self.config.seed.unwrap_or_else(|| hash_str(prompt))
    }

    /// Generate one composition.
    pub fn run(&self, prompt: &str) -> Result<PipelineOutput, PipelineError> {
        let mut state = PipelineState::new(prompt, self.seed_for(prompt));
        self.drive(&mut state)?;
        Self::into_output(state)
    }

    /// Generate several compositions in parallel. Results are in prompt order.
    pub fn run_many<S: AsRef<str> + Sync>(
        &self,
        prompts: &[S],
    ) -> Vec<Result<PipelineOutput, PipelineError>> {
        prompts.par_iter().map(|p| self.run(p.as_ref())).collect()
    }

    /// Run the stage machine to a terminal stage.
    pub fn drive(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let mut stage = Stage::IntentParsing;
        let mut transitions = 0;
        loop {
            match stage {
                Stage::Done => return Ok(()),
                Stage::Failed => {
                    return Err(state
                        .error
                        .take()
                        .unwrap_or_else(|| PipelineError::Internal("failed without an error".into())));
                }
                _ => {}
            }
            transitions += 1;
            if transitions > TRANSITION_BUDGET {
                state.error = Some(PipelineError::Internal(format!(
                    "transition budget of {TRANSITION_BUDGET} exhausted at {stage}"
                )));
                stage = Stage::Failed;
                continue;
            }

            let next = match self.execute(stage, state) {
                Ok(()) => self.route(stage, state),
                Err(err) => {
                    tracing::warn!(stage = %stage, error = %err, "stage failed");
                    state.error = Some(err);
                    Stage::Failed
                }
            };
            tracing::info!(from = %stage, to = %next, "stage transition");
            stage = next;
        }
    }

    fn execute(&self, stage: Stage, state: &mut PipelineState) -> Result<(), PipelineError> {
        match stage {
            Stage::IntentParsing => self.parse_intent(state),
            Stage::TrackPlanning => self.plan(state),
            Stage::TheoryValidation => self.validate_theory(state),
            Stage::TrackGeneration => self.generate(state),
            Stage::QualityControl => self.evaluate(state),
            Stage::Refinement => refine::refine(state).map(|_| ()),
            Stage::MidiCreation => self.create_midi(state),
            Stage::Done | Stage::Failed => Err(PipelineError::Internal(format!(
                "terminal stage {stage} executed"
            ))),
        }
    }

    /// Where to go after `stage` completed successfully.
    fn route(&self, stage: Stage, state: &PipelineState) -> Stage {
        match stage {
            Stage::IntentParsing => Stage::TrackPlanning,
            Stage::TrackPlanning => Stage::TheoryValidation,
            Stage::TheoryValidation => Stage::TrackGeneration,
            Stage::TrackGeneration => Stage::QualityControl,
            Stage::QualityControl => {
                let below = state
                    .report
                    .as_ref()
                    .is_some_and(|r| !r.is_acceptable(self.config.accept_threshold));
                if below && state.iteration_count < self.config.max_iterations {
                    Stage::Refinement
                } else {
                    Stage::MidiCreation
                }
            }
            Stage::Refinement => Stage::TrackGeneration,
            Stage::MidiCreation => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Failed => Stage::Failed,
        }
    }

    // ── Stage handlers ──────────────────────────────────────────────

    fn parse_intent(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let intent = extract_intent(
            &state.prompt,
            self.gateway.as_ref(),
            &self.registry,
            self.config.llm_timeout(),
        );
        tracing::info!(
            genre = %intent.genre,
            tempo = intent.tempo_bpm,
            bars = intent.duration_bars,
            energy = %intent.energy,
            source = ?intent.source,
            "parsed intent"
        );
        state.intent = Some(intent);
        Ok(())
    }

    fn plan(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let configs = planner::plan_tracks(state.intent()?, &self.registry);
        state.configs = Some(configs);
        Ok(())
    }

    fn validate_theory(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let intent = state.intent.as_ref().ok_or_else(|| missing("intent"))?;
        let configs = state.configs.as_mut().ok_or_else(|| missing("track configs"))?;
        let outcome = theory::validate(configs, intent, &self.registry);
        let chords = ChordTimeline::for_plan(intent, &outcome.scale, configs, &self.registry);
        state.scale = Some(outcome.scale);
        state.chords = Some(chords);
        state.corrections = outcome.corrections;
        Ok(())
    }

    fn generate(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let intent = state.intent.as_ref().ok_or_else(|| missing("intent"))?;
        let scale = state.scale.as_ref().ok_or_else(|| missing("scale"))?;
        let chords = state.chords.as_ref().ok_or_else(|| missing("chord timeline"))?;
        let configs = state.configs.as_ref().ok_or_else(|| missing("track configs"))?;
        let generator = TrackGenerator::new(&self.registry, intent, scale, chords, state.seed);
        let attempt = |role: Role| state.attempts.get(&role).copied().unwrap_or(0);

        match state.pending_regeneration.take() {
            None => {
                let tracks = configs
                    .iter()
                    .map(|c| generator.generate(c, attempt(c.role)))
                    .collect();
                state.tracks = Some(tracks);
            }
            Some(roles) => {
                let tracks = state.tracks.as_mut().ok_or_else(|| missing("tracks"))?;
                for role in roles {
                    let config = configs
                        .iter()
                        .find(|c| c.role == role)
                        .ok_or_else(|| PipelineError::Internal(format!("no config for {role}")))?;
                    let fresh = generator.generate(config, attempt(role));
                    match tracks.iter_mut().find(|t| t.role() == role) {
                        Some(slot) => *slot = fresh,
                        None => tracks.push(fresh),
                    }
                }
            }
        }
        state.generation_passes += 1;
        Ok(())
    }

    fn evaluate(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let intent = state.intent()?;
        let tracks = state.tracks()?;
        let evaluator = QualityEvaluator::new(&self.registry, self.config.weights);
        let report = evaluator.evaluate(intent, tracks, state.previous_tracks.as_deref());
        tracing::info!(
            pass = state.generation_passes,
            score = report.overall,
            issues = report.issues.len(),
            "scored composition"
        );

        let improves = state
            .best
            .as_ref()
            .is_none_or(|best| report.outranks(&best.report, &self.config.weights));
        if improves {
            state.best = Some(Candidate {
                tracks: tracks.to_vec(),
                report: report.clone(),
            });
        } else {
            tracing::info!(score = report.overall, "pass did not improve, keeping best");
        }
        state.report = Some(report);
        Ok(())
    }

    fn create_midi(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let intent = state.intent()?;
        let best = state.best.as_ref().ok_or_else(|| missing("best candidate"))?;
        let bytes = midi::serialize(&best.tracks, intent.tempo_bpm, intent.time_signature)?;
        tracing::info!(bytes = bytes.len(), score = best.report.overall, "wrote MIDI");
        state.midi = Some(bytes);
        Ok(())
    }

    fn into_output(state: PipelineState) -> Result<PipelineOutput, PipelineError> {
        let intent = state.intent.ok_or_else(|| missing("intent"))?;
        let best = state.best.ok_or_else(|| missing("best candidate"))?;
        let midi_bytes = state.midi.ok_or_else(|| missing("MIDI bytes"))?;
        Ok(PipelineOutput {
            midi_bytes,
            track_summaries: best.tracks.iter().map(Track::summary).collect(),
            report: best.report,
            tracks: best.tracks,
            intent,
            seed: state.seed,
            generation_passes: state.generation_passes,
            iterations: state.iteration_count,
            corrections: state.corrections,
        })
    }
}

/// Run one prompt with the default configuration and no language model.
pub fn run_pipeline(prompt: &str) -> Result<PipelineOutput, PipelineError> {
    Pipeline::offline()?.run(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_unwritten_state_is_internal() {
        let state = PipelineState::new("anything", 1);
        assert!(matches!(state.intent(), Err(PipelineError::Internal(_))));
        assert!(matches!(state.tracks(), Err(PipelineError::Internal(_))));
        let pipeline = Pipeline::offline().unwrap();
        let mut state = PipelineState::new("anything", 1);
        let err = pipeline.execute(Stage::TrackPlanning, &mut state).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[test]
    fn terminal_stages_do_not_execute() {
        let pipeline = Pipeline::offline().unwrap();
        let mut state = PipelineState::new("x", 1);
        assert!(pipeline.execute(Stage::Done, &mut state).is_err());
    }

    #[test]
    fn routing_follows_the_threshold() {
        let config = PipelineConfig {
            accept_threshold: 1.0,
            max_iterations: 1,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config, Box::new(OfflineGateway)).unwrap();
        let mut state = PipelineState::new("lofi beat", 3);
        for stage in [
            Stage::IntentParsing,
            Stage::TrackPlanning,
            Stage::TheoryValidation,
            Stage::TrackGeneration,
            Stage::QualityControl,
        ] {
            pipeline.execute(stage, &mut state).unwrap();
        }
        state.report.as_mut().unwrap().overall = 0.5;
        assert_eq!(pipeline.route(Stage::QualityControl, &state), Stage::Refinement);
        state.iteration_count = 1;
        assert_eq!(pipeline.route(Stage::QualityControl, &state), Stage::MidiCreation);
    }

    #[test]
    fn refinement_regenerates_only_selected_roles() {
        let config = PipelineConfig {
            accept_threshold: 1.0,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config, Box::new(OfflineGateway)).unwrap();
        let mut state = PipelineState::new("energetic rock song with 4 tracks", 11);
        for stage in [
            Stage::IntentParsing,
            Stage::TrackPlanning,
            Stage::TheoryValidation,
            Stage::TrackGeneration,
            Stage::QualityControl,
        ] {
            pipeline.execute(stage, &mut state).unwrap();
        }
        let before = state.tracks().unwrap().to_vec();
        let roles = refine::refine(&mut state).unwrap();
        pipeline.execute(Stage::TrackGeneration, &mut state).unwrap();
        let after = state.tracks().unwrap();

        assert_eq!(state.iteration_count(), 1);
        assert_eq!(state.generation_passes(), 2);
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after) {
            if roles.contains(&b.role()) {
                assert_ne!(b.notes, a.notes, "{} should change", b.role());
            } else {
                assert_eq!(b, a, "{} should be untouched", b.role());
            }
        }
        assert_eq!(state.previous_tracks.as_deref(), Some(before.as_slice()));
    }

    #[test]
    fn best_candidate_is_kept() {
        let pipeline = Pipeline::offline().unwrap();
        let mut state = PipelineState::new("calm jazz", 5);
        for stage in [
            Stage::IntentParsing,
            Stage::TrackPlanning,
            Stage::TheoryValidation,
            Stage::TrackGeneration,
            Stage::QualityControl,
        ] {
            pipeline.execute(stage, &mut state).unwrap();
        }
        let first = state.best.clone().unwrap();
        // A worse pass must not replace the best candidate.
        state.tracks.as_mut().unwrap()[0].notes.clear();
        state.previous_tracks = Some(first.tracks.clone());
        pipeline.execute(Stage::QualityControl, &mut state).unwrap();
        assert!(state.report().unwrap().overall < first.report.overall);
        assert_eq!(state.best.as_ref().unwrap().tracks, first.tracks);
    }

    #[test]
    fn refined_pass_can_replace_a_perfectly_creative_first_pass() {
        let pipeline = Pipeline::offline().unwrap();
        let mut state = PipelineState::new("calm jazz", 5);
        for stage in [
            Stage::IntentParsing,
            Stage::TrackPlanning,
            Stage::TheoryValidation,
            Stage::TrackGeneration,
            Stage::QualityControl,
        ] {
            pipeline.execute(stage, &mut state).unwrap();
        }
        // A weaker incumbent that still has the first pass's creativity and a
        // high overall score.
        let best = state.best.as_mut().unwrap();
        best.report.intent_match = 0.0;
        best.report.overall = 0.99;
        best.tracks[0].notes.clear();

        // Nothing changed since the snapshot, so creativity is zero.
        state.previous_tracks = state.tracks.clone();
        pipeline.execute(Stage::QualityControl, &mut state).unwrap();
        let report = state.report().unwrap();
        assert_eq!(report.creativity, 0.0);
        assert_eq!(state.best.as_ref().unwrap().tracks, state.tracks().unwrap());
    }
}
