// Refinement controller: regenerates the weakest tracks of a composition.
//
// Called by the orchestrator when a pass scores below the acceptance
// threshold and iterations remain. One call performs one refinement:
//
//   1. pick the roles whose per-track score ties for the minimum (if every
//      track ties, only the highest-priority melodic role)
//   2. nudge the density of those configurations toward plausibility; the
//      instrument, channel and range stay as the theory validator left them
//   3. bump each picked role's attempt counter, which reseeds its RNG
//   4. snapshot the current tracks for the creativity comparison, mark the
//      picked roles for regeneration and count the iteration
//
// Tracks that are not picked are left exactly as they are.

use crate::error::PipelineError;
use crate::pipeline::PipelineState;
use crate::quality::{GenerationQualityReport, density_profile, is_density_plausible};
use crate::theory::{MAX_DENSITY, MIN_DENSITY};
use crate::types::{MusicIntent, Role, Track, TrackConfig};

/// Scores closer than this count as tied.
const TIE_EPSILON: f64 = 1e-9;

/// Density change applied to a track judged too sparse or too busy.
const DENSITY_NUDGE: f64 = 0.1;

/// Roles to regenerate, in plan order.
pub fn select_roles(report: &GenerationQualityReport, configs: &[TrackConfig]) -> Vec<Role> {
    let scored: Vec<(Role, f64)> = configs
        .iter()
        .map(|c| (c.role, report.track_score(c.role).unwrap_or(0.0)))
        .collect();
    let Some(min) = scored.iter().map(|(_, s)| *s).reduce(f64::min) else {
        return Vec::new();
    };
    let lowest: Vec<Role> = scored
        .iter()
        .filter(|(_, s)| (s - min).abs() <= TIE_EPSILON)
        .map(|(r, _)| *r)
        .collect();
    if lowest.len() < configs.len() || configs.len() == 1 {
        return lowest;
    }

    // Everything tied: touch the most important melodic voice only.
    let pick = configs
        .iter()
        .filter(|c| c.role.is_melodic())
        .min_by_key(|c| c.priority)
        .or_else(|| configs.iter().min_by_key(|c| c.priority));
    pick.map(|c| vec![c.role]).unwrap_or_default()
}

/// The configuration `old`'s role is regenerated with. Only the density
/// changes, so validated instruments and ranges carry over.
fn rebuild(old: &TrackConfig, track: Option<&Track>, intent: &MusicIntent) -> TrackConfig {
    let mut config = old.clone();
    let nudge = match track {
        None => 0.0,
        Some(t) if t.is_silent() => DENSITY_NUDGE,
        Some(t) => {
            let profile = density_profile(t, intent.duration_bars, intent.ticks_per_bar());
            if is_density_plausible(t.role(), &profile) {
                0.0
            } else if profile.bar_coverage < 0.2 {
                DENSITY_NUDGE
            } else {
                -DENSITY_NUDGE
            }
        }
    };
    config.density = (old.density + nudge).clamp(MIN_DENSITY, MAX_DENSITY);
    config
}

/// Perform one refinement on `state`. Returns the roles marked for
/// regeneration.
pub fn refine(state: &mut PipelineState) -> Result<Vec<Role>, PipelineError> {
    let (roles, rebuilt) = {
        let intent = state.intent()?;
        let report = state.report()?;
        let configs = state.configs()?;
        let tracks = state.tracks()?;

        let roles = select_roles(report, configs);
        if roles.is_empty() {
            return Err(PipelineError::Internal("refinement found no tracks".into()));
        }
        let rebuilt: Vec<TrackConfig> = configs
            .iter()
            .filter(|c| roles.contains(&c.role))
            .map(|c| {
                let track = tracks.iter().find(|t| t.role() == c.role);
                rebuild(c, track, intent)
            })
            .collect();
        (roles, rebuilt)
    };

    for config in rebuilt {
        *state.attempts.entry(config.role).or_insert(0) += 1;
        tracing::info!(
            role = ?config.role,
            attempt = state.attempts[&config.role],
            density = config.density,
            "regenerating track"
        );
        if let Some(slot) = state
            .configs
            .as_mut()
            .and_then(|cs| cs.iter_mut().find(|c| c.role == config.role))
        {
            *slot = config;
        }
    }
    state.previous_tracks = state.tracks.clone();
    state.pending_regeneration = Some(roles.clone());
    state.iteration_count += 1;
    Ok(roles)
}
