// Intent extraction: prompt text to a fully populated `MusicIntent`.
//
// Two sources feed one merge:
//
//   keywords  a deterministic scan of the prompt (regexes plus word tables)
//             that records only what the prompt states explicitly
//   LLM       the gateway's JSON reply, parsed into a typed schema
//
// The LLM fields are laid over the keyword fields, so anything the model
// leaves out still comes from the prompt. The one exception is duration: an
// explicit time or bar count written in the prompt beats the model's guess.
// Whatever is still unknown after the merge takes the genre's default, so
// extraction never fails. An unusable LLM reply (gateway error, timeout,
// bad JSON, wrong schema) is an `IntentExtractionError`, logged and
// replaced by the keyword result alone.
//
// Duration precedence in the scan: an explicit time ("m:ss", minutes,
// seconds) over an explicit bar or beat count, over 30 seconds at the
// chosen tempo.

use crate::error::IntentExtractionError;
use crate::registry::{DEFAULT_GENRE, Registry};
use crate::types::{
    Energy, IntentSource, MAX_BARS, MAX_TEMPO, MAX_TRACKS, MIN_TEMPO, MusicIntent, TimeSignature,
    bars_from_seconds,
};
use midigen_llm::{LlmError, LlmGateway, strip_code_fences};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// Length assumed when the prompt names none.
const DEFAULT_SECONDS: f64 = 30.0;

/// BPM added to or taken from the genre default by tempo adjectives.
const TEMPO_NUDGE: i32 = 15;

const NUMBER_WORDS: [(&str, u32); 12] = [
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

/// (word, mood, energy). Scanned in text order; the earliest hit wins.
const MOOD_WORDS: &[(&str, &str, Energy)] = &[
    ("frantic", "frantic", Energy::VeryHigh),
    ("insane", "frantic", Energy::VeryHigh),
    ("extreme", "intense", Energy::VeryHigh),
    ("brutal", "aggressive", Energy::VeryHigh),
    ("explosive", "intense", Energy::VeryHigh),
    ("energetic", "energetic", Energy::High),
    ("intense", "intense", Energy::High),
    ("epic", "epic", Energy::High),
    ("upbeat", "happy", Energy::High),
    ("happy", "happy", Energy::High),
    ("powerful", "epic", Energy::High),
    ("aggressive", "aggressive", Energy::High),
    ("driving", "energetic", Energy::High),
    ("exciting", "energetic", Energy::High),
    ("mysterious", "mysterious", Energy::Medium),
    ("dark", "dark", Energy::Medium),
    ("moody", "dark", Energy::Medium),
    ("groovy", "groovy", Energy::Medium),
    ("nostalgic", "nostalgic", Energy::Medium),
    ("romantic", "romantic", Energy::Medium),
    ("calm", "calm", Energy::Low),
    ("relaxing", "relaxing", Energy::Low),
    ("relaxed", "relaxing", Energy::Low),
    ("peaceful", "peaceful", Energy::Low),
    ("sad", "sad", Energy::Low),
    ("melancholic", "melancholic", Energy::Low),
    ("melancholy", "melancholic", Energy::Low),
    ("chill", "calm", Energy::Low),
    ("gentle", "calm", Energy::Low),
    ("soft", "calm", Energy::Low),
    ("dreamy", "dreamy", Energy::Low),
    ("sleepy", "calm", Energy::Low),
    ("quiet", "calm", Energy::Low),
];

const FASTER_WORDS: &[&str] = &["fast", "faster", "uptempo", "up-tempo", "quick"];
const SLOWER_WORDS: &[&str] = &["slow", "slower", "downtempo", "down-tempo"];

/// Length in the form the prompt stated it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationHint {
    Seconds(f64),
    Bars(u32),
}

/// The explicit content of a prompt (or an LLM reply). `None` means "not
/// stated"; defaults are applied later by `resolve`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptFields {
    /// Registry genre id.
    pub genre: Option<&'static str>,
    pub tempo: Option<u16>,
    pub key: Option<u8>,
    /// Canonical registry scale name.
    pub scale: Option<&'static str>,
    pub energy: Option<Energy>,
    pub mood: Option<String>,
    pub duration: Option<DurationHint>,
    pub tracks: Option<usize>,
    pub time_signature: Option<TimeSignature>,
    /// Signed BPM adjustment to the default tempo ("faster", "slow").
    pub tempo_nudge: i32,
}

impl PromptFields {
    /// `self` over `fallback`, field by field; `fallback`'s duration wins.
    pub fn merged_over(self, fallback: PromptFields) -> PromptFields {
        PromptFields {
            genre: self.genre.or(fallback.genre),
            tempo: self.tempo.or(fallback.tempo),
            key: self.key.or(fallback.key),
            scale: self.scale.or(fallback.scale),
            energy: self.energy.or(fallback.energy),
            mood: self.mood.or(fallback.mood),
            duration: fallback.duration.or(self.duration),
            tracks: self.tracks.or(fallback.tracks),
            time_signature: self.time_signature.or(fallback.time_signature),
            tempo_nudge: fallback.tempo_nudge,
        }
    }
}

// ── Patterns ────────────────────────────────────────────────────────

struct Patterns {
    tempo: Regex,
    key_with_mode: Regex,
    key_of: Regex,
    key_in: Regex,
    clock_time: Regex,
    minutes: Regex,
    word_minutes: Regex,
    seconds: Regex,
    bars: Regex,
    beats: Regex,
    tracks: Regex,
    word_tracks: Regex,
    meter: Regex,
}

const ACCIDENTAL: &str = r"(#|♯|b|♭|\s+sharp|\s+flat|-sharp|-flat)?";
const NUMBER_WORD: &str = r"(one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)";

impl Patterns {
    fn compile() -> Result<Patterns, regex::Error> {
        Ok(Patterns {
            tempo: Regex::new(r"(?i)(\d{2,3})\s*(?:bpm|beats?\s+(?:per|a)\s+minute)")?,
            // A bare "<letter> major" only counts after "in", at the start of
            // the prompt or after punctuation: "a major hit" is not a key.
            key_with_mode: Regex::new(&format!(
                r"(?i)(?:^\s*|[^\w\s]\s*|\bin\s+(?:the\s+)?)([a-g]){ACCIDENTAL}\s*(major|minor|maj|min)\b"
            ))?,
            key_of: Regex::new(&format!(
                r"(?i)\bkey\s+of\s+([a-g]){ACCIDENTAL}(?:\s*(major|minor|maj|min|m)\b)?"
            ))?,
            key_in: Regex::new(r"\bin\s+([A-G])([#b]?)(m?)(?:[^A-Za-z0-9]|$)")?,
            clock_time: Regex::new(r"\b(\d{1,2}):([0-5]\d)\b")?,
            minutes: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*-?\s*(?:minutes?|mins?)\b")?,
            word_minutes: Regex::new(&format!(r"(?i)\b{NUMBER_WORD}\s*-?\s*(?:minutes?|mins?)\b"))?,
            seconds: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*-?\s*(?:seconds?|secs?)\b")?,
            bars: Regex::new(r"(?i)(\d+)\s*-?\s*(?:bars?|measures?)\b")?,
            // Group 2 marks a tempo ("beats per minute"), not a length.
            beats: Regex::new(r"(?i)(\d+)\s*-?\s*beats?\b(\s+(?:per|a)\s+minute)?")?,
            tracks: Regex::new(r"(?i)(\d+)\s*-?\s*(?:tracks?|instruments?|parts?|layers?)\b")?,
            word_tracks: Regex::new(&format!(
                r"(?i)\b{NUMBER_WORD}\s*-?\s*(?:tracks?|instruments?|parts?|layers?)\b"
            ))?,
            meter: Regex::new(r"\b(\d{1,2})\s*/\s*(\d{1,2})\b")?,
        })
    }
}

static PATTERNS: LazyLock<Option<Patterns>> = LazyLock::new(|| match Patterns::compile() {
    Ok(p) => Some(p),
    Err(err) => {
        tracing::error!(error = %err, "keyword patterns failed to compile");
        None
    }
});

// ── Keyword scan ────────────────────────────────────────────────────

/// Byte offset of `word` in `text` as a whole word (neighbours are not
/// alphanumeric).
fn find_word(text: &str, word: &str) -> Option<usize> {
    text.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back();
        let after = text[i + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn number_word(word: &str) -> Option<u32> {
    let word = word.to_ascii_lowercase();
    NUMBER_WORDS.iter().find(|(w, _)| *w == word).map(|&(_, n)| n)
}

/// Pitch class of a note letter plus accidental text.
fn pitch_class(letter: &str, accidental: &str) -> Option<u8> {
    let base: i32 = match letter.to_ascii_lowercase().as_str() {
        "c" => 0,
        "d" => 2,
        "e" => 4,
        "f" => 5,
        "g" => 7,
        "a" => 9,
        "b" => 11,
        _ => return None,
    };
    let accidental = accidental.trim().trim_start_matches('-').to_ascii_lowercase();
    let shift = match accidental.as_str() {
        "#" | "♯" | "sharp" => 1,
        "b" | "♭" | "flat" => -1,
        _ => 0,
    };
    Some((base + shift).rem_euclid(12) as u8)
}

fn scale_for_quality(quality: &str) -> Option<&'static str> {
    match quality.to_ascii_lowercase().as_str() {
        "minor" | "min" | "m" => Some("minor"),
        "major" | "maj" => Some("major"),
        _ => None,
    }
}

/// A key name as an LLM writes it: "C", "F#m", "Eb minor", "A flat major".
pub fn parse_key_name(name: &str) -> Option<(u8, Option<&'static str>)> {
    let name = name.trim();
    let mut chars = name.chars();
    let letter = chars.next()?.to_string();
    let rest = chars.as_str().trim_start();
    let (accidental, rest) = ["sharp", "flat", "#", "♯", "♭", "b"]
        .iter()
        .find_map(|acc| {
            let lower = rest.to_ascii_lowercase();
            lower
                .starts_with(acc)
                .then(|| (&rest[..acc.len()], rest[acc.len()..].trim()))
        })
        .unwrap_or(("", rest.trim()));
    // "b" alone after the letter is a flat; "bm" and "b minor" also are.
    let pc = pitch_class(&letter, accidental)?;
    let quality = rest.trim_start_matches('-').trim();
    Some((pc, scale_for_quality(quality)))
}

fn scan_genre(text: &str, registry: &Registry) -> Option<&'static str> {
    let mut best: Option<(usize, usize, &'static str)> = None;
    for genre in registry.genres() {
        let names = [genre.id, genre.display_name]
            .into_iter()
            .chain(genre.aliases.iter().copied());
        for name in names {
            let name_lower = name.to_ascii_lowercase();
            if let Some(pos) = find_word(text, &name_lower) {
                let better = match best {
                    None => true,
                    Some((len, at, _)) => name_lower.len() > len || (name_lower.len() == len && pos < at),
                };
                if better {
                    best = Some((name_lower.len(), pos, genre.id));
                }
            }
        }
    }
    best.map(|(_, _, id)| id)
}

fn scan_scale(text: &str, registry: &Registry) -> Option<&'static str> {
    registry
        .scale_names()
        .filter_map(|name| {
            let spaced = name.replace('_', " ");
            find_word(text, &spaced).map(|_| (spaced.len(), name))
        })
        .max_by_key(|(len, _)| *len)
        .and_then(|(_, name)| registry.resolve_scale(name))
}

/// Key and, when stated, its quality.
fn scan_key(prompt: &str, p: &Patterns) -> Option<(u8, Option<&'static str>)> {
    if let Some(c) = p.key_with_mode.captures(prompt) {
        let pc = pitch_class(&c[1], c.get(2).map_or("", |m| m.as_str()))?;
        return Some((pc, scale_for_quality(&c[3])));
    }
    if let Some(c) = p.key_of.captures(prompt) {
        let pc = pitch_class(&c[1], c.get(2).map_or("", |m| m.as_str()))?;
        return Some((pc, c.get(3).and_then(|m| scale_for_quality(m.as_str()))));
    }
    let c = p.key_in.captures(prompt)?;
    let pc = pitch_class(&c[1], &c[2])?;
    let quality = if &c[3] == "m" { Some("minor") } else { None };
    Some((pc, quality))
}

fn scan_duration(text: &str, p: &Patterns) -> Option<DurationHint> {
    if let Some(c) = p.clock_time.captures(text) {
        let minutes: f64 = c[1].parse().ok()?;
        let seconds: f64 = c[2].parse().ok()?;
        return Some(DurationHint::Seconds(minutes * 60.0 + seconds));
    }
    if let Some(c) = p.minutes.captures(text) {
        let minutes: f64 = c[1].parse().ok()?;
        return Some(DurationHint::Seconds(minutes * 60.0));
    }
    if let Some(c) = p.word_minutes.captures(text) {
        return number_word(&c[1]).map(|m| DurationHint::Seconds(m as f64 * 60.0));
    }
    if let Some(c) = p.seconds.captures(text) {
        let seconds: f64 = c[1].parse().ok()?;
        return Some(DurationHint::Seconds(seconds));
    }
    if let Some(c) = p.bars.captures(text) {
        return c[1].parse().ok().map(DurationHint::Bars);
    }
    None
}

/// Beat counts need the meter, so they are resolved after it.
fn scan_beats(text: &str, p: &Patterns, meter: TimeSignature) -> Option<DurationHint> {
    let beats: u32 = p
        .beats
        .captures_iter(text)
        .find(|c| c.get(2).is_none())?[1]
        .parse()
        .ok()?;
    Some(DurationHint::Bars(beats.div_ceil(meter.numerator as u32)))
}

fn scan_tracks(text: &str, p: &Patterns) -> Option<usize> {
    if let Some(c) = p.tracks.captures(text) {
        return c[1].parse().ok();
    }
    if let Some(c) = p.word_tracks.captures(text) {
        return number_word(&c[1]).map(|n| n as usize);
    }
    find_word(text, "solo").map(|_| 1)
}

fn scan_meter(text: &str, p: &Patterns) -> Option<TimeSignature> {
    let from_fraction = p.meter.captures_iter(text).find_map(|c| {
        let numerator = c[1].parse().ok()?;
        let denominator = c[2].parse().ok()?;
        TimeSignature::new(numerator, denominator)
    });
    from_fraction.or_else(|| find_word(text, "waltz").and_then(|_| TimeSignature::new(3, 4)))
}

fn scan_mood(text: &str) -> Option<(&'static str, Energy)> {
    MOOD_WORDS
        .iter()
        .filter_map(|&(word, mood, energy)| find_word(text, word).map(|pos| (pos, mood, energy)))
        .min_by_key(|(pos, _, _)| *pos)
        .map(|(_, mood, energy)| (mood, energy))
}

/// Everything the prompt states explicitly.
pub fn scan_prompt(prompt: &str, registry: &Registry) -> PromptFields {
    let text = prompt.to_lowercase();
    let mut fields = PromptFields {
        genre: scan_genre(&text, registry),
        ..PromptFields::default()
    };
    if let Some((mood, energy)) = scan_mood(&text) {
        fields.mood = Some(mood.to_string());
        fields.energy = Some(energy);
    }
    if FASTER_WORDS.iter().any(|w| find_word(&text, w).is_some()) {
        fields.tempo_nudge += TEMPO_NUDGE;
    }
    if SLOWER_WORDS.iter().any(|w| find_word(&text, w).is_some()) {
        fields.tempo_nudge -= TEMPO_NUDGE;
    }

    let Some(p) = PATTERNS.as_ref() else {
        return fields;
    };
    fields.tempo = p
        .tempo
        .captures(&text)
        .and_then(|c| c[1].parse::<u16>().ok())
        .map(|bpm| bpm.clamp(MIN_TEMPO, MAX_TEMPO));

    let key = scan_key(prompt, p);
    fields.key = key.map(|(pc, _)| pc);
    fields.scale = scan_scale(&text, registry).or(key.and_then(|(_, q)| q));

    fields.time_signature = scan_meter(&text, p);
    let meter = fields.time_signature.unwrap_or_default();
    fields.duration = scan_duration(&text, p).or_else(|| scan_beats(&text, p, meter));
    fields.tracks = scan_tracks(&text, p);
    fields
}

// ── LLM path ────────────────────────────────────────────────────────

/// The JSON object the model is asked for. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LlmReply {
    genre: Option<String>,
    tempo: Option<f64>,
    key: Option<String>,
    scale: Option<String>,
    energy: Option<String>,
    mood: Option<String>,
    duration_seconds: Option<f64>,
    duration_bars: Option<f64>,
    track_count: Option<f64>,
}

fn system_prompt(registry: &Registry) -> String {
    let genres: Vec<&str> = registry.genres().iter().map(|g| g.id).collect();
    format!(
        "You are a music assistant. Extract generation parameters from the user's \
         description of a piece of music.\n\
         Return ONLY a JSON object with these keys (use null when unknown):\n\
         {{\n  \
           \"genre\": one of [{genres}],\n  \
           \"tempo\": BPM between {MIN_TEMPO} and {MAX_TEMPO},\n  \
           \"key\": tonic and quality such as \"C\", \"F#m\" or \"Eb minor\",\n  \
           \"scale\": scale name such as \"major\", \"minor\" or \"dorian\",\n  \
           \"energy\": one of [\"low\", \"medium\", \"high\", \"very_high\"],\n  \
           \"mood\": one descriptive word,\n  \
           \"duration_seconds\": number,\n  \
           \"duration_bars\": number,\n  \
           \"track_count\": number of instrument tracks, 1 to {MAX_TRACKS}\n\
         }}",
        genres = genres.join(", ")
    )
}

fn finite_positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse a model reply into explicit fields.
pub fn parse_llm_reply(reply: &str, registry: &Registry) -> Result<PromptFields, IntentExtractionError> {
    let body = strip_code_fences(reply);
    if body.is_empty() {
        return Err(IntentExtractionError::InvalidJson("empty reply".into()));
    }
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| IntentExtractionError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(IntentExtractionError::Schema("expected a JSON object".into()));
    }
    let parsed: LlmReply =
        serde_json::from_value(value).map_err(|e| IntentExtractionError::Schema(e.to_string()))?;

    let key = parsed.key.as_deref().and_then(parse_key_name);
    let fields = PromptFields {
        genre: parsed
            .genre
            .as_deref()
            .and_then(|g| registry.genre(g))
            .map(|g| g.id),
        tempo: finite_positive(parsed.tempo)
            .map(|t| (t.round() as u16).clamp(MIN_TEMPO, MAX_TEMPO)),
        key: key.map(|(pc, _)| pc),
        scale: parsed
            .scale
            .as_deref()
            .and_then(|s| registry.resolve_scale(s))
            .or(key.and_then(|(_, q)| q)),
        energy: parsed.energy.as_deref().and_then(Energy::from_name),
        mood: parsed.mood.map(|m| m.trim().to_lowercase()).filter(|m| !m.is_empty()),
        duration: finite_positive(parsed.duration_seconds)
            .map(DurationHint::Seconds)
            .or_else(|| finite_positive(parsed.duration_bars).map(|b| DurationHint::Bars(b.round() as u32))),
        tracks: finite_positive(parsed.track_count).map(|n| n.round() as usize),
        time_signature: None,
        tempo_nudge: 0,
    };
    if fields == PromptFields::default() {
        return Err(IntentExtractionError::Schema("no recognised fields".into()));
    }
    Ok(fields)
}

fn ask_llm(
    prompt: &str,
    gateway: &dyn LlmGateway,
    registry: &Registry,
    timeout: Duration,
) -> Result<PromptFields, IntentExtractionError> {
    let reply = gateway.call(&system_prompt(registry), prompt, timeout)?;
    parse_llm_reply(&reply, registry)
}

/// Apply defaults to explicit fields, producing a complete intent.
pub fn resolve(fields: PromptFields, prompt: &str, registry: &Registry, source: IntentSource) -> MusicIntent {
    let genre = registry.genre_or_default(fields.genre.unwrap_or(DEFAULT_GENRE));
    let tempo_bpm = fields.tempo.unwrap_or_else(|| {
        let nudged = genre.default_tempo() as i32 + fields.tempo_nudge;
        nudged.clamp(MIN_TEMPO as i32, MAX_TEMPO as i32) as u16
    });
    let scale = fields
        .scale
        .and_then(|s| registry.resolve_scale(s))
        .unwrap_or(genre.default_scale);
    let time_signature = fields.time_signature.unwrap_or_default();
    let duration_bars = match fields.duration {
        Some(DurationHint::Seconds(s)) => bars_from_seconds(s, tempo_bpm, time_signature),
        Some(DurationHint::Bars(b)) => b.clamp(1, MAX_BARS),
        None => bars_from_seconds(DEFAULT_SECONDS, tempo_bpm, time_signature),
    };

    MusicIntent {
        prompt: prompt.to_string(),
        genre: genre.id.to_string(),
        tempo_bpm,
        key: fields.key.unwrap_or(genre.default_key) % 12,
        scale: scale.to_string(),
        energy: fields.energy.unwrap_or(genre.default_energy),
        mood: fields.mood.unwrap_or_default(),
        duration_bars,
        requested_tracks: fields.tracks.unwrap_or(0).min(MAX_TRACKS),
        time_signature,
        source,
    }
}

/// Extract an intent from `prompt`. Never fails.
pub fn extract_intent(
    prompt: &str,
    gateway: &dyn LlmGateway,
    registry: &Registry,
    timeout: Duration,
) -> MusicIntent {
    let keywords = scan_prompt(prompt, registry);
    match ask_llm(prompt, gateway, registry, timeout) {
        Ok(llm) => resolve(llm.merged_over(keywords), prompt, registry, IntentSource::Llm),
        Err(IntentExtractionError::Gateway(LlmError::NotConfigured)) => {
            tracing::debug!(gateway = gateway.name(), "no LLM configured, using keywords");
            resolve(keywords, prompt, registry, IntentSource::Keywords)
        }
        Err(err) => {
            tracing::warn!(gateway = gateway.name(), error = %err, "intent extraction fell back to keywords");
            resolve(keywords, prompt, registry, IntentSource::Keywords)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midigen_llm::OfflineGateway;

    fn keywords(prompt: &str) -> MusicIntent {
        let registry = Registry::builtin();
        extract_intent(prompt, &OfflineGateway, &registry, Duration::from_secs(1))
    }

    struct Scripted(&'static str);

    impl LlmGateway for Scripted {
        fn call(&self, _: &str, _: &str, _: Duration) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn patterns_compile() {
        assert!(PATTERNS.is_some());
    }

    #[test]
    fn four_minute_ambient_at_90() {
        let intent = keywords("4 minute ambient piece at 90 BPM");
        assert_eq!(intent.genre, "ambient");
        assert_eq!(intent.tempo_bpm, 90);
        assert_eq!(intent.duration_bars, 90);
        assert_eq!(intent.source, IntentSource::Keywords);
    }

    #[test]
    fn three_track_pop() {
        let intent = keywords("3 track pop song");
        assert_eq!(intent.genre, "pop");
        assert_eq!(intent.requested_tracks, 3);
        let words = keywords("a jazz tune with three instruments");
        assert_eq!(words.genre, "jazz");
        assert_eq!(words.requested_tracks, 3);
        assert_eq!(keywords("piano solo").requested_tracks, 1);
    }

    #[test]
    fn defaults_fill_everything() {
        let intent = keywords("something nice");
        let registry = Registry::builtin();
        let pop = registry.genre("pop").unwrap();
        assert_eq!(intent.genre, "pop");
        assert_eq!(intent.tempo_bpm, pop.default_tempo());
        assert_eq!(intent.key, pop.default_key);
        assert_eq!(intent.scale, pop.default_scale);
        assert_eq!(intent.energy, pop.default_energy);
        assert_eq!(intent.duration_bars, bars_from_seconds(30.0, intent.tempo_bpm, TimeSignature::COMMON));
        assert_eq!(intent.requested_tracks, 0);
    }

    #[test]
    fn longest_genre_alias_wins() {
        assert_eq!(keywords("lo-fi hip hop beat to study to").genre, "lofi");
        assert_eq!(keywords("some deep house").genre, "house");
        assert_eq!(keywords("an r&b slow jam").genre, "rnb");
        assert_eq!(keywords("popular tune").genre, "pop");
    }

    #[test]
    fn keys_and_scales() {
        let d_minor = keywords("a rock song in D minor");
        assert_eq!((d_minor.key, d_minor.scale.as_str()), (2, "minor"));
        let f_sharp = keywords("jazz in the key of F#");
        assert_eq!(f_sharp.key, 6);
        let e_flat = keywords("Eb major ballad");
        assert_eq!((e_flat.key, e_flat.scale.as_str()), (3, "major"));
        let dorian = keywords("funk groove in A dorian");
        assert_eq!((dorian.key, dorian.scale.as_str()), (9, "dorian"));
        // "in a" is an article, not a key.
        let article = keywords("written in a hurry");
        assert_eq!(article.key, Registry::builtin().genre("pop").unwrap().default_key);
        let hit = keywords("a major hit pop song");
        assert_eq!(hit.key, Registry::builtin().genre("pop").unwrap().default_key);
        let after_comma = keywords("lofi beat, A minor");
        assert_eq!((after_comma.key, after_comma.scale.as_str()), (9, "minor"));
    }

    #[test]
    fn tempo_in_words_is_not_a_length() {
        let intent = keywords("chill lofi track at 120 beats per minute");
        assert_eq!(intent.tempo_bpm, 120);
        assert_eq!(intent.duration_bars, bars_from_seconds(30.0, 120, TimeSignature::COMMON));
        assert_eq!(keywords("house at 124 beats a minute").tempo_bpm, 124);

        let registry = Registry::builtin();
        let both = scan_prompt("16 beats of funk at 100 beats per minute", &registry);
        assert_eq!(both.tempo, Some(100));
        assert_eq!(both.duration, Some(DurationHint::Bars(4)));
    }

    #[test]
    fn tempo_is_clamped_and_nudged() {
        assert_eq!(keywords("techno at 400 bpm").tempo_bpm, MAX_TEMPO);
        assert_eq!(keywords("drone at 20bpm").tempo_bpm, MIN_TEMPO);
        let registry = Registry::builtin();
        let base = registry.genre("rock").unwrap().default_tempo();
        assert_eq!(keywords("fast rock").tempo_bpm, base + 15);
        assert_eq!(keywords("slow rock").tempo_bpm, base - 15);
    }

    #[test]
    fn energy_and_mood() {
        let calm = keywords("calm piano piece");
        assert_eq!((calm.energy, calm.mood.as_str()), (Energy::Low, "calm"));
        let frantic = keywords("frantic metal");
        assert_eq!(frantic.energy, Energy::VeryHigh);
        let epic = keywords("an epic cinematic theme");
        assert_eq!(epic.energy, Energy::High);
        // Genre default when no word matches.
        assert_eq!(keywords("ambient textures").energy, Energy::Low);
    }

    #[test]
    fn duration_precedence() {
        let registry = Registry::builtin();
        let both = scan_prompt("16 bars, about 2 minutes long", &registry);
        assert_eq!(both.duration, Some(DurationHint::Seconds(120.0)));
        let clock = scan_prompt("a 1:30 jingle", &registry);
        assert_eq!(clock.duration, Some(DurationHint::Seconds(90.0)));
        let bars = scan_prompt("give me 12 bars of blues", &registry);
        assert_eq!(bars.duration, Some(DurationHint::Bars(12)));
        let words = scan_prompt("two minute lullaby", &registry);
        assert_eq!(words.duration, Some(DurationHint::Seconds(120.0)));
        let beats = scan_prompt("32 beats of techno", &registry);
        assert_eq!(beats.duration, Some(DurationHint::Bars(8)));
        assert_eq!(keywords("45 seconds of pop at 120 bpm").duration_bars, 23);
        assert_eq!(keywords("999 bars of pop").duration_bars, MAX_BARS);
    }

    #[test]
    fn meter() {
        let waltz = keywords("a gentle waltz");
        assert_eq!(waltz.time_signature, TimeSignature::new(3, 4).unwrap());
        let six_eight = keywords("folk tune in 6/8");
        assert_eq!(six_eight.time_signature, TimeSignature::new(6, 8).unwrap());
        assert_eq!(keywords("pop").time_signature, TimeSignature::COMMON);
    }

    #[test]
    fn key_names() {
        assert_eq!(parse_key_name("C"), Some((0, None)));
        assert_eq!(parse_key_name("F#m"), Some((6, Some("minor"))));
        assert_eq!(parse_key_name("Eb minor"), Some((3, Some("minor"))));
        assert_eq!(parse_key_name("Bb"), Some((10, None)));
        assert_eq!(parse_key_name("Bm"), Some((11, Some("minor"))));
        assert_eq!(parse_key_name("A flat major"), Some((8, Some("major"))));
        assert_eq!(parse_key_name("H"), None);
        assert_eq!(parse_key_name(""), None);
    }

    #[test]
    fn llm_reply_is_merged_over_keywords() {
        let registry = Registry::builtin();
        let gateway = Scripted(
            "```json\n{\"genre\": \"jazz\", \"tempo\": 96, \"key\": \"Bb\", \"energy\": \"low\", \
             \"duration_seconds\": 60}\n```",
        );
        let intent = extract_intent(
            "smooth 3 track jazz, 16 bars",
            &gateway,
            &registry,
            Duration::from_secs(1),
        );
        assert_eq!(intent.source, IntentSource::Llm);
        assert_eq!(intent.genre, "jazz");
        assert_eq!(intent.tempo_bpm, 96);
        assert_eq!(intent.key, 10);
        assert_eq!(intent.energy, Energy::Low);
        // From the prompt: explicit bars beat the model's duration.
        assert_eq!(intent.duration_bars, 16);
        assert_eq!(intent.requested_tracks, 3);
    }

    #[test]
    fn bad_replies_fall_back() {
        let registry = Registry::builtin();
        for reply in ["", "not json", "[1, 2]", "{\"tempo\": \"fast\"}", "{\"unrelated\": 1}"] {
            assert!(parse_llm_reply(reply, &registry).is_err(), "{reply:?}");
            let intent = extract_intent("rock at 130 bpm", &Scripted(reply), &registry, Duration::from_secs(1));
            assert_eq!(intent.source, IntentSource::Keywords);
            assert_eq!(intent.genre, "rock");
            assert_eq!(intent.tempo_bpm, 130);
        }
    }

    #[test]
    fn unknown_llm_genre_keeps_keyword_genre() {
        let registry = Registry::builtin();
        let gateway = Scripted("{\"genre\": \"vaporwave\", \"tempo\": 100}");
        let intent = extract_intent("metal riffs", &gateway, &registry, Duration::from_secs(1));
        assert_eq!(intent.genre, "metal");
        assert_eq!(intent.tempo_bpm, 100);
    }
}
