// Theory validator: deterministic repairs to a planned set of tracks.
//
// Runs once, between planning and generation. It never fails: every
// problem it finds has a fixed correction, and each correction is logged at
// info level and returned to the caller. Checks, in order:
//
//   1. drum tracks use the drum kit on channel 9 (a duplicate drum track is
//      dropped); other tracks never use the kit
//   2. programs are valid GM numbers
//   3. channels are unique, in range, and melodic tracks avoid channel 9
//   4. pitch ranges are ordered and within 0..=127; density within bounds
//   5. the intent's scale resolves in the registry, else the genre's
//      default scale, else the fallback scale

use crate::registry::{FALLBACK_SCALE, Registry};
use crate::scale::ScaleInstance;
use crate::types::{DRUM_CHANNEL, Instrument, MusicIntent, Role, TrackConfig};
use std::collections::BTreeSet;

pub const MIN_DENSITY: f64 = 0.05;
pub const MAX_DENSITY: f64 = 1.0;

/// Result of validation: the scale generation should use and the list of
/// corrections that were applied.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub scale: ScaleInstance,
    pub corrections: Vec<String>,
}

/// Repair `configs` in place and resolve the scale.
pub fn validate(
    configs: &mut Vec<TrackConfig>,
    intent: &MusicIntent,
    registry: &Registry,
) -> ValidationOutcome {
    let mut corrections = Vec::new();

    fix_instruments(configs, &mut corrections);
    fix_channels(configs, &mut corrections);
    fix_ranges(configs, &mut corrections);
    let scale = resolve_scale(intent, registry, &mut corrections);

    for correction in &corrections {
        tracing::info!(correction = %correction, "ValidationCorrected");
    }
    ValidationOutcome { scale, corrections }
}

fn fix_instruments(configs: &mut Vec<TrackConfig>, corrections: &mut Vec<String>) {
    let mut seen_drums = false;
    configs.retain(|config| {
        if config.role != Role::Drums {
            return true;
        }
        if seen_drums {
            corrections.push(format!("dropped duplicate drum track '{}'", config.name));
            return false;
        }
        seen_drums = true;
        true
    });

    for config in configs.iter_mut() {
        match (config.role, config.instrument) {
            (Role::Drums, Instrument::DrumKit) => {}
            (Role::Drums, Instrument::Program(p)) => {
                corrections.push(format!(
                    "track '{}': drums use the drum kit, not program {p}",
                    config.name
                ));
                config.instrument = Instrument::DrumKit;
            }
            (role, Instrument::DrumKit) => {
                let replacement = role.default_instrument();
                corrections.push(format!(
                    "track '{}': {role} cannot use the drum kit, using program {}",
                    config.name,
                    replacement.program_number()
                ));
                config.instrument = replacement;
            }
            (_, Instrument::Program(p)) if p > 127 => {
                corrections.push(format!(
                    "track '{}': program {p} clamped to 127",
                    config.name
                ));
                config.instrument = Instrument::Program(127);
            }
            _ => {}
        }
    }
}

fn fix_channels(configs: &mut [TrackConfig], corrections: &mut Vec<String>) {
    let mut used = BTreeSet::new();
    for config in configs.iter_mut().filter(|c| c.role == Role::Drums) {
        if config.channel != DRUM_CHANNEL {
            corrections.push(format!(
                "track '{}': drums moved from channel {} to {DRUM_CHANNEL}",
                config.name, config.channel
            ));
            config.channel = DRUM_CHANNEL;
        }
        used.insert(DRUM_CHANNEL);
    }

    for config in configs.iter_mut().filter(|c| c.role != Role::Drums) {
        let ok = config.channel <= 15
            && config.channel != DRUM_CHANNEL
            && !used.contains(&config.channel);
        if !ok {
            let free = (0u8..=15).find(|ch| *ch != DRUM_CHANNEL && !used.contains(ch));
            if let Some(free) = free {
                corrections.push(format!(
                    "track '{}': channel {} reassigned to {free}",
                    config.name, config.channel
                ));
                config.channel = free;
            }
        }
        used.insert(config.channel);
    }
}

fn fix_ranges(configs: &mut [TrackConfig], corrections: &mut Vec<String>) {
    for config in configs.iter_mut() {
        let (low, high) = config.pitch_range;
        let (low, high) = (low.min(127), high.min(127));
        let ordered = if low <= high { (low, high) } else { (high, low) };
        if ordered != config.pitch_range {
            corrections.push(format!(
                "track '{}': pitch range {:?} corrected to {:?}",
                config.name, config.pitch_range, ordered
            ));
            config.pitch_range = ordered;
        }

        if !config.density.is_finite() {
            let fallback = config.role.base_density();
            corrections.push(format!(
                "track '{}': density reset to {fallback}",
                config.name
            ));
            config.density = fallback;
        } else if !(MIN_DENSITY..=MAX_DENSITY).contains(&config.density) {
            let clamped = config.density.clamp(MIN_DENSITY, MAX_DENSITY);
            corrections.push(format!(
                "track '{}': density {} clamped to {clamped}",
                config.name, config.density
            ));
            config.density = clamped;
        }
    }
}

fn resolve_scale(
    intent: &MusicIntent,
    registry: &Registry,
    corrections: &mut Vec<String>,
) -> ScaleInstance {
    let resolved = registry
        .resolve_scale(&intent.scale)
        .and_then(|name| registry.scale(name).map(|iv| (name, iv)))
        .filter(|(_, iv)| !iv.is_empty());
    if let Some((name, intervals)) = resolved {
        return ScaleInstance::new(name, intent.key, intervals);
    }

    let genre = registry.genre_or_default(&intent.genre);
    let (name, intervals) = match registry.scale(genre.default_scale) {
        Some(intervals) if !intervals.is_empty() => (genre.default_scale, intervals),
        _ => (
            FALLBACK_SCALE,
            registry.scale(FALLBACK_SCALE).unwrap_or(&[0, 2, 4, 5, 7, 9, 11]),
        ),
    };
    corrections.push(format!(
        "scale '{}' is not in the registry, using '{name}'",
        intent.scale
    ));
    ScaleInstance::new(name, intent.key, intervals)
}
