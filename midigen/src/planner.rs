// Track planner: decides which tracks a composition gets.
//
// The count comes from the prompt when it names one, otherwise from the
// energy level. Roles are taken in a fixed priority order (melody, drums,
// bass, the genre's preferred roles, then a generic fill list) with
// duplicates removed, so truncating the list always drops the least
// important roles first. Drums sit on channel 9; everything else is numbered
// upward from channel 0, skipping 9.

use crate::registry::{GenreProfile, Registry, instrument_name};
use crate::theory::{MAX_DENSITY, MIN_DENSITY};
use crate::types::{DRUM_CHANNEL, Energy, MAX_TRACKS, MusicIntent, Role, TrackConfig};

/// Roles used to pad a plan once the core and genre roles are exhausted.
const FILL_ORDER: [Role; 5] = [
    Role::Chords,
    Role::Pad,
    Role::Arpeggio,
    Role::CounterMelody,
    Role::Fx,
];

/// Plan 1..=8 track configurations for an intent.
pub fn plan_tracks(intent: &MusicIntent, registry: &Registry) -> Vec<TrackConfig> {
    let genre = registry.genre_or_default(&intent.genre);
    let count = intent.target_track_count().clamp(1, MAX_TRACKS);
    let roles = role_order(genre, count);

    let mut next_channel = 0u8;
    let configs: Vec<TrackConfig> = roles
        .iter()
        .enumerate()
        .map(|(i, &role)| {
            let channel = if role == Role::Drums {
                DRUM_CHANNEL
            } else {
                let ch = next_channel;
                next_channel += 1;
                if next_channel == DRUM_CHANNEL {
                    next_channel += 1;
                }
                ch
            };
            build_config(role, channel, i as u8 + 1, intent, registry)
        })
        .collect();

    tracing::debug!(
        genre = genre.id,
        count,
        roles = ?roles,
        "planned tracks"
    );
    configs
}

/// The first `count` roles in planning order for a genre.
pub fn role_order(genre: &GenreProfile, count: usize) -> Vec<Role> {
    let mut order: Vec<Role> = Vec::with_capacity(Role::ALL.len());
    let mut push = |role: Role| {
        if !order.contains(&role) {
            order.push(role);
        }
    };
    push(Role::Melody);
    if count >= 2 {
        push(Role::Drums);
    }
    push(Role::Bass);
    for &role in genre.preferred_roles {
        push(role);
    }
    for role in FILL_ORDER {
        push(role);
    }
    push(Role::Drums);
    order.truncate(count);
    order
}

/// A complete configuration for one role.
pub fn build_config(
    role: Role,
    channel: u8,
    priority: u8,
    intent: &MusicIntent,
    registry: &Registry,
) -> TrackConfig {
    let genre = registry.genre_or_default(&intent.genre);
    let instrument = registry.instrument_for(genre, role);
    let density = (role.base_density() * intent.energy.density_scale()).clamp(MIN_DENSITY, MAX_DENSITY);
    TrackConfig {
        role,
        channel,
        instrument,
        density,
        pitch_range: pitch_range_for(role, intent.energy),
        priority,
        name: format!("{} ({})", role_title(role), instrument_name(instrument)),
    }
}

/// Lead voices get a narrower range when calm and reach higher when intense.
fn pitch_range_for(role: Role, energy: Energy) -> (u8, u8) {
    let (low, high) = role.default_pitch_range();
    if !role.is_lead_voice() {
        return (low, high);
    }
    match energy {
        Energy::Low => (low, high - 5),
        Energy::Medium | Energy::High => (low, high),
        Energy::VeryHigh => (low + 2, (high + 3).min(127)),
    }
}

fn role_title(role: Role) -> &'static str {
    match role {
        Role::Melody => "Melody",
        Role::CounterMelody => "Counter Melody",
        Role::Bass => "Bass",
        Role::Drums => "Drums",
        Role::Chords => "Chords",
        Role::Arpeggio => "Arpeggio",
        Role::Pad => "Pad",
        Role::Fx => "FX",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instrument, IntentSource, TimeSignature};

    fn intent(genre: &str, energy: Energy, requested: usize) -> MusicIntent {
        MusicIntent {
            prompt: String::new(),
            genre: genre.into(),
            tempo_bpm: 110,
            key: 0,
            scale: "major".into(),
            energy,
            mood: String::new(),
            duration_bars: 16,
            requested_tracks: requested,
            time_signature: TimeSignature::COMMON,
            source: IntentSource::Keywords,
        }
    }

    fn roles(configs: &[TrackConfig]) -> Vec<Role> {
        configs.iter().map(|c| c.role).collect()
    }

    #[test]
    fn three_track_pop_is_melody_drums_bass() {
        let registry = Registry::builtin();
        let configs = plan_tracks(&intent("pop", Energy::Medium, 3), &registry);
        assert_eq!(roles(&configs), vec![Role::Melody, Role::Drums, Role::Bass]);
        assert_eq!(configs[1].channel, DRUM_CHANNEL);
        assert_eq!(configs[1].instrument, Instrument::DrumKit);
        assert_eq!(configs[0].channel, 0);
        assert_eq!(configs[2].channel, 1);
    }

    #[test]
    fn count_follows_energy_when_unspecified() {
        let registry = Registry::builtin();
        for (energy, expected) in [
            (Energy::Low, 3),
            (Energy::Medium, 5),
            (Energy::High, 6),
            (Energy::VeryHigh, 8),
        ] {
            let configs = plan_tracks(&intent("pop", energy, 0), &registry);
            assert_eq!(configs.len(), expected, "{energy}");
        }
    }

    #[test]
    fn explicit_count_is_clamped_and_exact() {
        let registry = Registry::builtin();
        assert_eq!(plan_tracks(&intent("rock", Energy::High, 1), &registry).len(), 1);
        assert_eq!(plan_tracks(&intent("rock", Energy::High, 20), &registry).len(), 8);
        let solo = plan_tracks(&intent("rock", Energy::High, 1), &registry);
        assert_eq!(solo[0].role, Role::Melody);
    }

    #[test]
    fn roles_and_channels_are_unique() {
        let registry = Registry::builtin();
        for genre in registry.genres() {
            let configs = plan_tracks(&intent(genre.id, Energy::VeryHigh, 0), &registry);
            let mut r = roles(&configs);
            r.sort();
            r.dedup();
            assert_eq!(r.len(), configs.len(), "{}", genre.id);

            let mut channels: Vec<u8> = configs.iter().map(|c| c.channel).collect();
            channels.sort();
            channels.dedup();
            assert_eq!(channels.len(), configs.len(), "{}", genre.id);
            for c in &configs {
                assert_eq!(c.channel == DRUM_CHANNEL, c.role == Role::Drums);
            }
        }
    }

    #[test]
    fn genre_preferences_come_after_the_core() {
        let registry = Registry::builtin();
        let ambient = registry.genre("ambient").unwrap();
        assert_eq!(
            role_order(ambient, 5),
            vec![Role::Melody, Role::Drums, Role::Bass, Role::Pad, Role::Chords]
        );
    }

    #[test]
    fn priorities_follow_plan_order() {
        let registry = Registry::builtin();
        let configs = plan_tracks(&intent("jazz", Energy::Medium, 0), &registry);
        let priorities: Vec<u8> = configs.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, (1..=configs.len() as u8).collect::<Vec<_>>());
        assert!(configs[0].name.starts_with("Melody"));
    }

    #[test]
    fn densities_stay_in_bounds() {
        let registry = Registry::builtin();
        let configs = plan_tracks(&intent("metal", Energy::VeryHigh, 0), &registry);
        for c in &configs {
            assert!((MIN_DENSITY..=MAX_DENSITY).contains(&c.density));
        }
    }
}
