// Static music knowledge: scales, genre profiles, chord progressions and
// General MIDI program names.
//
// Everything here is read-only lookup data compiled into the binary. A
// `Registry` is built once per process (`Registry::builtin()`), checked with
// `validate()` at startup, and then shared immutably by every pipeline run,
// including parallel ones.
//
// Chord progressions are stacks of semitone offsets from the key's tonic,
// written for the genre's home tonality. The chord planner snaps them onto
// whatever scale the intent resolved to (see `ScaleInstance::snap_offset`),
// so a major-flavoured progression played in a minor key comes out minor.

use crate::error::PipelineError;
use crate::types::{Energy, Instrument, MAX_TEMPO, MIN_TEMPO, Role};
use std::collections::{BTreeMap, BTreeSet};

/// Genre used when nothing in the prompt matches the registry.
pub const DEFAULT_GENRE: &str = "pop";

/// Scale used when neither the prompt nor the genre yields a valid one.
pub const FALLBACK_SCALE: &str = "major";

/// Drum groove family, selecting a pattern table in `drums.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumStyle {
    Standard,
    Rock,
    Metal,
    FourOnFloor,
    HipHop,
    Jazz,
    Funk,
    Latin,
    Minimal,
    Cinematic,
}

/// Everything the pipeline knows about one genre.
#[derive(Debug, Clone)]
pub struct GenreProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub aliases: &'static [&'static str],
    /// Inclusive BPM range typical for the genre.
    pub tempo_range: (u16, u16),
    pub default_key: u8,
    pub default_scale: &'static str,
    pub default_energy: Energy,
    /// Roles planned right after melody, drums and bass.
    pub preferred_roles: &'static [Role],
    /// Genre-typical GM program per role.
    pub instruments: &'static [(Role, u8)],
    pub drum_style: DrumStyle,
    /// Off-beat delay as a fraction of a sixteenth note, in [0, 0.5].
    pub swing: f64,
    /// Chord stacks (semitones above the tonic), cycled through the piece.
    pub progression: &'static [&'static [u8]],
}

impl GenreProfile {
    /// Middle of the tempo range.
    pub fn default_tempo(&self) -> u16 {
        (self.tempo_range.0 + self.tempo_range.1) / 2
    }

    pub fn instrument_for(&self, role: Role) -> Option<u8> {
        self.instruments
            .iter()
            .find(|(r, _)| *r == role)
            .map(|&(_, program)| program)
    }
}

// ── Built-in tables ─────────────────────────────────────────────────

const SCALES: &[(&str, &[u8])] = &[
    ("major", &[0, 2, 4, 5, 7, 9, 11]),
    ("minor", &[0, 2, 3, 5, 7, 8, 10]),
    ("dorian", &[0, 2, 3, 5, 7, 9, 10]),
    ("phrygian", &[0, 1, 3, 5, 7, 8, 10]),
    ("lydian", &[0, 2, 4, 6, 7, 9, 11]),
    ("mixolydian", &[0, 2, 4, 5, 7, 9, 10]),
    ("locrian", &[0, 1, 3, 5, 6, 8, 10]),
    ("harmonic_minor", &[0, 2, 3, 5, 7, 8, 11]),
    ("melodic_minor", &[0, 2, 3, 5, 7, 9, 11]),
    ("pentatonic_major", &[0, 2, 4, 7, 9]),
    ("pentatonic_minor", &[0, 3, 5, 7, 10]),
    ("blues", &[0, 3, 5, 6, 7, 10]),
    ("whole_tone", &[0, 2, 4, 6, 8, 10]),
    ("chromatic", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]),
];

const SCALE_ALIASES: &[(&str, &str)] = &[
    ("ionian", "major"),
    ("aeolian", "minor"),
    ("natural_minor", "minor"),
    ("pentatonic", "pentatonic_major"),
    ("major_pentatonic", "pentatonic_major"),
    ("minor_pentatonic", "pentatonic_minor"),
];

const POP_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[5, 9, 12], &[7, 11, 14], &[5, 9, 12]];
const ROCK_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[7, 11, 14], &[5, 9, 12], &[0, 4, 7]];
const METAL_PROGRESSION: &[&[u8]] = &[&[0, 7], &[5, 12], &[3, 10], &[0, 7]];
const ELECTRONIC_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[0, 4, 7], &[5, 9, 12], &[7, 11, 14]];
const HIPHOP_PROGRESSION: &[&[u8]] = &[&[0, 3, 7], &[5, 8, 12], &[7, 10, 14], &[0, 3, 7]];
const LOFI_PROGRESSION: &[&[u8]] = &[&[0, 4, 7, 11], &[2, 5, 9], &[5, 9, 12], &[7, 11, 14]];
const JAZZ_PROGRESSION: &[&[u8]] = &[
    &[0, 4, 7, 11],
    &[5, 9, 12, 16],
    &[2, 5, 9, 12],
    &[7, 11, 14, 17],
];
const BLUES_PROGRESSION: &[&[u8]] = &[&[0, 4, 7, 10], &[5, 9, 12, 15], &[0, 4, 7, 10], &[7, 11, 14]];
const RNB_PROGRESSION: &[&[u8]] = &[
    &[0, 4, 7, 11],
    &[2, 5, 9, 12],
    &[5, 9, 12, 16],
    &[7, 11, 14, 17],
];
const FUNK_PROGRESSION: &[&[u8]] = &[&[0, 4, 7, 10], &[5, 9, 12], &[0, 4, 7, 10], &[7, 11, 14]];
const FOLK_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[5, 9, 12], &[0, 4, 7], &[7, 11, 14]];
const LATIN_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[5, 9, 12], &[7, 11, 14], &[0, 4, 7]];
const CLASSICAL_PROGRESSION: &[&[u8]] = &[&[0, 4, 7], &[5, 9, 12], &[4, 7, 11], &[0, 4, 7]];
const AMBIENT_PROGRESSION: &[&[u8]] = &[
    &[0, 4, 7, 11],
    &[0, 4, 7, 11],
    &[5, 9, 12, 16],
    &[5, 9, 12, 16],
];
const CINEMATIC_PROGRESSION: &[&[u8]] = &[&[0, 3, 7], &[5, 8, 12], &[7, 10, 14], &[3, 7, 10]];

const GENRES: &[GenreProfile] = &[
    GenreProfile {
        id: "pop",
        display_name: "Pop",
        aliases: &["pop music", "popular"],
        tempo_range: (100, 130),
        default_key: 0,
        default_scale: "major",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 27), (Role::Chords, 0), (Role::Bass, 33), (Role::Pad, 89)],
        drum_style: DrumStyle::Standard,
        swing: 0.0,
        progression: POP_PROGRESSION,
    },
    GenreProfile {
        id: "rock",
        display_name: "Rock",
        aliases: &["rock music", "rock and roll"],
        tempo_range: (110, 140),
        default_key: 4,
        default_scale: "minor",
        default_energy: Energy::High,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 29), (Role::Chords, 27), (Role::Bass, 33), (Role::Pad, 19)],
        drum_style: DrumStyle::Rock,
        swing: 0.0,
        progression: ROCK_PROGRESSION,
    },
    GenreProfile {
        id: "metal",
        display_name: "Metal",
        aliases: &["heavy metal", "metal music", "thrash"],
        tempo_range: (100, 180),
        default_key: 4,
        default_scale: "minor",
        default_energy: Energy::VeryHigh,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 30), (Role::Chords, 30), (Role::Bass, 33), (Role::Arpeggio, 81)],
        drum_style: DrumStyle::Metal,
        swing: 0.0,
        progression: METAL_PROGRESSION,
    },
    GenreProfile {
        id: "electronic",
        display_name: "Electronic",
        aliases: &["edm", "electronic music", "electronic dance music", "trance", "dubstep"],
        tempo_range: (120, 135),
        default_key: 9,
        default_scale: "minor",
        default_energy: Energy::High,
        preferred_roles: &[Role::Arpeggio, Role::Pad, Role::Fx],
        instruments: &[
            (Role::Melody, 80),
            (Role::Bass, 38),
            (Role::Arpeggio, 81),
            (Role::Pad, 88),
            (Role::Fx, 99),
        ],
        drum_style: DrumStyle::FourOnFloor,
        swing: 0.0,
        progression: ELECTRONIC_PROGRESSION,
    },
    GenreProfile {
        id: "house",
        display_name: "House",
        aliases: &["house music", "deep house"],
        tempo_range: (120, 130),
        default_key: 0,
        default_scale: "minor",
        default_energy: Energy::High,
        preferred_roles: &[Role::Chords, Role::Pad],
        instruments: &[(Role::Melody, 80), (Role::Chords, 0), (Role::Bass, 38), (Role::Pad, 88)],
        drum_style: DrumStyle::FourOnFloor,
        swing: 0.05,
        progression: ELECTRONIC_PROGRESSION,
    },
    GenreProfile {
        id: "techno",
        display_name: "Techno",
        aliases: &["berlin techno"],
        tempo_range: (125, 140),
        default_key: 9,
        default_scale: "minor",
        default_energy: Energy::High,
        preferred_roles: &[Role::Arpeggio, Role::Fx],
        instruments: &[(Role::Melody, 80), (Role::Bass, 38), (Role::Pad, 88), (Role::Fx, 99)],
        drum_style: DrumStyle::FourOnFloor,
        swing: 0.0,
        progression: ELECTRONIC_PROGRESSION,
    },
    GenreProfile {
        id: "synthwave",
        display_name: "Synthwave",
        aliases: &["synth wave", "retrowave", "outrun"],
        tempo_range: (100, 120),
        default_key: 9,
        default_scale: "minor",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Arpeggio, Role::Pad],
        instruments: &[(Role::Melody, 81), (Role::Bass, 38), (Role::Arpeggio, 81), (Role::Pad, 88)],
        drum_style: DrumStyle::Standard,
        swing: 0.0,
        progression: ELECTRONIC_PROGRESSION,
    },
    GenreProfile {
        id: "hiphop",
        display_name: "Hip-Hop",
        aliases: &["hip-hop", "hip hop", "rap", "boom bap", "trap"],
        tempo_range: (80, 115),
        default_key: 2,
        default_scale: "minor",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 0), (Role::Chords, 0), (Role::Bass, 38), (Role::Pad, 88)],
        drum_style: DrumStyle::HipHop,
        swing: 0.15,
        progression: HIPHOP_PROGRESSION,
    },
    GenreProfile {
        id: "lofi",
        display_name: "Lo-fi",
        aliases: &["lo-fi", "lo fi", "lofi hip hop", "lo-fi hip hop", "lofi beats", "chillhop"],
        tempo_range: (70, 90),
        default_key: 2,
        default_scale: "minor",
        default_energy: Energy::Low,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 4), (Role::Chords, 25), (Role::Bass, 38), (Role::Pad, 89)],
        drum_style: DrumStyle::HipHop,
        swing: 0.25,
        progression: LOFI_PROGRESSION,
    },
    GenreProfile {
        id: "jazz",
        display_name: "Jazz",
        aliases: &["jazz music", "bebop", "swing jazz", "bossa nova"],
        tempo_range: (80, 140),
        default_key: 5,
        default_scale: "dorian",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords, Role::CounterMelody],
        instruments: &[
            (Role::Melody, 65),
            (Role::CounterMelody, 56),
            (Role::Chords, 0),
            (Role::Bass, 32),
        ],
        drum_style: DrumStyle::Jazz,
        swing: 0.33,
        progression: JAZZ_PROGRESSION,
    },
    GenreProfile {
        id: "blues",
        display_name: "Blues",
        aliases: &["blues music", "delta blues", "chicago blues"],
        tempo_range: (60, 120),
        default_key: 4,
        default_scale: "blues",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 27), (Role::Chords, 0), (Role::Bass, 33), (Role::Pad, 16)],
        drum_style: DrumStyle::Standard,
        swing: 0.3,
        progression: BLUES_PROGRESSION,
    },
    GenreProfile {
        id: "rnb",
        display_name: "R&B",
        aliases: &["r&b", "rhythm and blues", "r and b", "soul", "neo-soul"],
        tempo_range: (70, 100),
        default_key: 8,
        default_scale: "minor",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords, Role::Pad],
        instruments: &[(Role::Melody, 53), (Role::Chords, 4), (Role::Bass, 33), (Role::Pad, 88)],
        drum_style: DrumStyle::HipHop,
        swing: 0.1,
        progression: RNB_PROGRESSION,
    },
    GenreProfile {
        id: "funk",
        display_name: "Funk",
        aliases: &["funky", "funk music", "disco"],
        tempo_range: (95, 115),
        default_key: 4,
        default_scale: "mixolydian",
        default_energy: Energy::High,
        preferred_roles: &[Role::Chords, Role::CounterMelody],
        instruments: &[
            (Role::Melody, 27),
            (Role::CounterMelody, 61),
            (Role::Chords, 17),
            (Role::Bass, 36),
        ],
        drum_style: DrumStyle::Funk,
        swing: 0.1,
        progression: FUNK_PROGRESSION,
    },
    GenreProfile {
        id: "folk",
        display_name: "Folk",
        aliases: &["folk music", "country", "bluegrass", "celtic", "acoustic"],
        tempo_range: (80, 130),
        default_key: 7,
        default_scale: "major",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords, Role::CounterMelody],
        instruments: &[
            (Role::Melody, 25),
            (Role::CounterMelody, 110),
            (Role::Chords, 25),
            (Role::Bass, 32),
        ],
        drum_style: DrumStyle::Standard,
        swing: 0.0,
        progression: FOLK_PROGRESSION,
    },
    GenreProfile {
        id: "latin",
        display_name: "Latin",
        aliases: &["latin music", "salsa", "samba", "reggaeton"],
        tempo_range: (90, 140),
        default_key: 0,
        default_scale: "major",
        default_energy: Energy::High,
        preferred_roles: &[Role::Chords],
        instruments: &[(Role::Melody, 56), (Role::Chords, 0), (Role::Bass, 33), (Role::Arpeggio, 24)],
        drum_style: DrumStyle::Latin,
        swing: 0.0,
        progression: LATIN_PROGRESSION,
    },
    GenreProfile {
        id: "classical",
        display_name: "Classical",
        aliases: &["classical music", "orchestral", "baroque", "symphony"],
        tempo_range: (60, 120),
        default_key: 7,
        default_scale: "major",
        default_energy: Energy::Medium,
        preferred_roles: &[Role::Chords, Role::CounterMelody],
        instruments: &[
            (Role::Melody, 40),
            (Role::CounterMelody, 73),
            (Role::Chords, 48),
            (Role::Bass, 42),
            (Role::Pad, 48),
            (Role::Arpeggio, 46),
        ],
        drum_style: DrumStyle::Minimal,
        swing: 0.0,
        progression: CLASSICAL_PROGRESSION,
    },
    GenreProfile {
        id: "ambient",
        display_name: "Ambient",
        aliases: &["ambient music", "drone", "meditation"],
        tempo_range: (60, 80),
        default_key: 0,
        default_scale: "major",
        default_energy: Energy::Low,
        preferred_roles: &[Role::Pad, Role::Chords, Role::Arpeggio, Role::Fx],
        instruments: &[
            (Role::Melody, 0),
            (Role::CounterMelody, 14),
            (Role::Chords, 48),
            (Role::Pad, 89),
            (Role::Arpeggio, 46),
            (Role::Fx, 99),
        ],
        drum_style: DrumStyle::Minimal,
        swing: 0.0,
        progression: AMBIENT_PROGRESSION,
    },
    GenreProfile {
        id: "cinematic",
        display_name: "Cinematic",
        aliases: &["film score", "soundtrack", "movie music", "trailer"],
        tempo_range: (70, 100),
        default_key: 2,
        default_scale: "minor",
        default_energy: Energy::High,
        preferred_roles: &[Role::Chords, Role::Pad, Role::CounterMelody],
        instruments: &[
            (Role::Melody, 61),
            (Role::CounterMelody, 0),
            (Role::Chords, 48),
            (Role::Bass, 42),
            (Role::Pad, 52),
            (Role::Arpeggio, 46),
            (Role::Fx, 47),
        ],
        drum_style: DrumStyle::Cinematic,
        swing: 0.0,
        progression: CINEMATIC_PROGRESSION,
    },
];

/// General MIDI level 1 program names, indexed by program number.
const GM_PROGRAM_NAMES: [&str; 128] = [
    "Acoustic Grand Piano", "Bright Acoustic Piano", "Electric Grand Piano", "Honky-tonk Piano",
    "Electric Piano 1", "Electric Piano 2", "Harpsichord", "Clavinet",
    "Celesta", "Glockenspiel", "Music Box", "Vibraphone",
    "Marimba", "Xylophone", "Tubular Bells", "Dulcimer",
    "Drawbar Organ", "Percussive Organ", "Rock Organ", "Church Organ",
    "Reed Organ", "Accordion", "Harmonica", "Tango Accordion",
    "Acoustic Guitar (nylon)", "Acoustic Guitar (steel)", "Electric Guitar (jazz)", "Electric Guitar (clean)",
    "Electric Guitar (muted)", "Overdriven Guitar", "Distortion Guitar", "Guitar Harmonics",
    "Acoustic Bass", "Electric Bass (finger)", "Electric Bass (pick)", "Fretless Bass",
    "Slap Bass 1", "Slap Bass 2", "Synth Bass 1", "Synth Bass 2",
    "Violin", "Viola", "Cello", "Contrabass",
    "Tremolo Strings", "Pizzicato Strings", "Orchestral Harp", "Timpani",
    "String Ensemble 1", "String Ensemble 2", "Synth Strings 1", "Synth Strings 2",
    "Choir Aahs", "Voice Oohs", "Synth Voice", "Orchestra Hit",
    "Trumpet", "Trombone", "Tuba", "Muted Trumpet",
    "French Horn", "Brass Section", "Synth Brass 1", "Synth Brass 2",
    "Soprano Sax", "Alto Sax", "Tenor Sax", "Baritone Sax",
    "Oboe", "English Horn", "Bassoon", "Clarinet",
    "Piccolo", "Flute", "Recorder", "Pan Flute",
    "Blown Bottle", "Shakuhachi", "Whistle", "Ocarina",
    "Lead 1 (square)", "Lead 2 (sawtooth)", "Lead 3 (calliope)", "Lead 4 (chiff)",
    "Lead 5 (charang)", "Lead 6 (voice)", "Lead 7 (fifths)", "Lead 8 (bass + lead)",
    "Pad 1 (new age)", "Pad 2 (warm)", "Pad 3 (polysynth)", "Pad 4 (choir)",
    "Pad 5 (bowed)", "Pad 6 (metallic)", "Pad 7 (halo)", "Pad 8 (sweep)",
    "FX 1 (rain)", "FX 2 (soundtrack)", "FX 3 (crystal)", "FX 4 (atmosphere)",
    "FX 5 (brightness)", "FX 6 (goblins)", "FX 7 (echoes)", "FX 8 (sci-fi)",
    "Sitar", "Banjo", "Shamisen", "Koto",
    "Kalimba", "Bagpipe", "Fiddle", "Shanai",
    "Tinkle Bell", "Agogo", "Steel Drums", "Woodblock",
    "Taiko Drum", "Melodic Tom", "Synth Drum", "Reverse Cymbal",
    "Guitar Fret Noise", "Breath Noise", "Seashore", "Bird Tweet",
    "Telephone Ring", "Helicopter", "Applause", "Gunshot",
];

/// Display name of a General MIDI program (out-of-range numbers wrap).
pub fn gm_program_name(program: u8) -> &'static str {
    GM_PROGRAM_NAMES[(program & 0x7f) as usize]
}

/// Display name of an instrument.
pub fn instrument_name(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Program(p) => gm_program_name(p),
        Instrument::DrumKit => "Standard Kit",
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Lookup tables shared by all pipeline runs.
#[derive(Debug, Clone)]
pub struct Registry {
    scales: BTreeMap<&'static str, &'static [u8]>,
    scale_aliases: BTreeMap<&'static str, &'static str>,
    genres: Vec<GenreProfile>,
}

impl Registry {
    /// The tables compiled into the binary.
    pub fn builtin() -> Registry {
        Registry::from_parts(SCALES, SCALE_ALIASES, GENRES.to_vec())
    }

    /// Assemble a registry from explicit tables. Call `validate()` before use.
    pub fn from_parts(
        scales: &[(&'static str, &'static [u8])],
        scale_aliases: &[(&'static str, &'static str)],
        genres: Vec<GenreProfile>,
    ) -> Registry {
        Registry {
            scales: scales.iter().copied().collect(),
            scale_aliases: scale_aliases.iter().copied().collect(),
            genres,
        }
    }

    /// Canonical name of a scale, resolving aliases. Input is normalized
    /// ("Natural Minor" -> "natural_minor" -> "minor").
    pub fn resolve_scale(&self, name: &str) -> Option<&'static str> {
        let key = normalize_name(name);
        let key = self
            .scale_aliases
            .get(key.as_str())
            .copied()
            .unwrap_or(key.as_str())
            .to_string();
        self.scales.get_key_value(key.as_str()).map(|(k, _)| *k)
    }

    /// Intervals of a scale (aliases allowed).
    pub fn scale(&self, name: &str) -> Option<&'static [u8]> {
        let canonical = self.resolve_scale(name)?;
        self.scales.get(canonical).copied()
    }

    /// Every scale name and alias, for the keyword scanner.
    pub fn scale_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.scales
            .keys()
            .copied()
            .chain(self.scale_aliases.keys().copied())
    }

    pub fn genres(&self) -> &[GenreProfile] {
        &self.genres
    }

    /// Genre by id, display name or alias (case-insensitive).
    pub fn genre(&self, name: &str) -> Option<&GenreProfile> {
        let wanted = name.trim().to_ascii_lowercase();
        let wanted_id = normalize_name(&wanted);
        self.genres.iter().find(|g| {
            g.id == wanted_id
                || g.display_name.eq_ignore_ascii_case(&wanted)
                || g.aliases.iter().any(|a| *a == wanted)
        })
    }

    /// Genre by id, or the default genre. Infallible after `validate()`.
    pub fn genre_or_default(&self, name: &str) -> &GenreProfile {
        self.genre(name)
            .or_else(|| self.genre(DEFAULT_GENRE))
            .unwrap_or(&GENRES[0])
    }

    /// GM instrument for a role in a genre, falling back to the role default.
    pub fn instrument_for(&self, genre: &GenreProfile, role: Role) -> Instrument {
        if role == Role::Drums {
            return Instrument::DrumKit;
        }
        genre
            .instrument_for(role)
            .map(Instrument::Program)
            .unwrap_or_else(|| role.default_instrument())
    }

    /// Whether an instrument is one the genre (or the role default) calls for.
    pub fn is_genre_instrument(&self, genre: &GenreProfile, role: Role, instrument: Instrument) -> bool {
        match instrument {
            Instrument::DrumKit => role == Role::Drums,
            Instrument::Program(p) => {
                genre.instruments.iter().any(|&(_, program)| program == p)
                    || role.default_instrument() == instrument
            }
        }
    }

    /// Check internal consistency. Run once at startup; failures are fatal.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::Registry(msg));

        for (name, intervals) in &self.scales {
            if intervals.first() != Some(&0) {
                return fail(format!("scale '{name}' must start at 0"));
            }
            if intervals.windows(2).any(|w| w[0] >= w[1]) || intervals.iter().any(|&i| i >= 12) {
                return fail(format!("scale '{name}' must be strictly increasing within an octave"));
            }
        }
        for (alias, target) in &self.scale_aliases {
            if !self.scales.contains_key(target) {
                return fail(format!("scale alias '{alias}' points at unknown scale '{target}'"));
            }
        }
        if self.scale(FALLBACK_SCALE).is_none() {
            return fail(format!("fallback scale '{FALLBACK_SCALE}' is missing"));
        }

        let mut ids = BTreeSet::new();
        for genre in &self.genres {
            if !ids.insert(genre.id) {
                return fail(format!("duplicate genre id '{}'", genre.id));
            }
            let (lo, hi) = genre.tempo_range;
            if lo > hi || lo < MIN_TEMPO || hi > MAX_TEMPO {
                return fail(format!("genre '{}' has tempo range {lo}..={hi}", genre.id));
            }
            if genre.default_key >= 12 {
                return fail(format!("genre '{}' has key {}", genre.id, genre.default_key));
            }
            if self.scale(genre.default_scale).is_none() {
                return fail(format!(
                    "genre '{}' uses unknown scale '{}'",
                    genre.id, genre.default_scale
                ));
            }
            if genre.instruments.iter().any(|&(role, p)| p > 127 || role == Role::Drums) {
                return fail(format!("genre '{}' has an invalid instrument entry", genre.id));
            }
            if !(0.0..=0.5).contains(&genre.swing) {
                return fail(format!("genre '{}' has swing {}", genre.id, genre.swing));
            }
            if genre.progression.is_empty() || genre.progression.iter().any(|chord| chord.is_empty()) {
                return fail(format!("genre '{}' has an empty chord progression", genre.id));
            }
        }
        if self.genre(DEFAULT_GENRE).is_none() {
            return fail(format!("default genre '{DEFAULT_GENRE}' is missing"));
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

/// Lowercase, with spaces and hyphens folded to underscores.
fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
