// Quality evaluator: scores a generated composition on four dimensions.
//
//   technical     note validity (pitch, velocity, duration, ordering, bounds)
//                 weighted 0.8, plus density plausibility weighted 0.2
//   coherence     role balance (a melodic voice, a rhythm section, distinct
//                 roles) and melody/bass register separation
//   creativity    how far regenerated tracks moved from their previous
//                 version (normalized edit distance of interval sequences);
//                 1.0 on the first pass
//   intent_match  bars, track count and instruments versus the intent
//
// All sub-scores are in [0, 1]. The overall score is their weighted mean.
// It is exactly 1.0 only when every sub-score is 1.0; otherwise it stays
// strictly below, so float rounding can never fake a perfect score.
//
// The report also carries one score per track, which the refinement
// controller uses to decide what to regenerate.

use crate::registry::Registry;
use crate::types::{MusicIntent, Role, TICKS_PER_SIXTEENTH, Track};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Largest overall score that is not a perfect one.
const BELOW_PERFECT: f64 = 1.0 - 1e-9;

/// Onset fraction above which a track counts as implausibly busy.
const MAX_ONSET_FRACTION: f64 = 0.85;

/// Bar coverage below which a track counts as implausibly empty.
const MIN_BAR_COVERAGE: f64 = 0.2;

/// Sub-score below which an issue is reported as high severity.
const HIGH_SEVERITY_BELOW: f64 = 0.5;

/// Longest sequence compared for creativity.
const MAX_COMPARED_EVENTS: usize = 256;

/// Weights of the four sub-scores in the overall score. Normalized by their
/// sum, so they need not add up to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub technical: f64,
    pub coherence: f64,
    pub creativity: f64,
    pub intent_match: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        QualityWeights {
            technical: 0.20,
            coherence: 0.25,
            creativity: 0.25,
            intent_match: 0.30,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.technical + self.coherence + self.creativity + self.intent_match
    }

    /// Weights must be finite and non-negative with a positive sum.
    pub fn validate(&self) -> Result<(), String> {
        let all = [self.technical, self.coherence, self.creativity, self.intent_match];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!("quality weights must be non-negative: {all:?}"));
        }
        if self.sum() <= 0.0 {
            return Err("quality weights must not all be zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackScore {
    pub role: Role,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationQualityReport {
    pub technical: f64,
    pub coherence: f64,
    pub creativity: f64,
    pub intent_match: f64,
    pub overall: f64,
    pub issues: Vec<QualityIssue>,
    pub track_scores: Vec<TrackScore>,
}

impl GenerationQualityReport {
    pub fn track_score(&self, role: Role) -> Option<f64> {
        self.track_scores
            .iter()
            .find(|t| t.role == role)
            .map(|t| t.score)
    }

    pub fn is_acceptable(&self, threshold: f64) -> bool {
        self.overall >= threshold
    }

    /// Whether this report's candidate should replace `best`'s.
    ///
    /// A first pass always scores 1.0 on creativity and a refinement rarely
    /// does, so comparing overall scores would almost never let a refined
    /// candidate win. Candidates are ranked on technical, coherence and
    /// intent match instead; creativity only breaks ties.
    pub fn outranks(&self, best: &GenerationQualityReport, weights: &QualityWeights) -> bool {
        let ours = content_score(weights, self);
        let theirs = content_score(weights, best);
        if (ours - theirs).abs() > CONTENT_TIE {
            ours > theirs
        } else {
            self.creativity > best.creativity
        }
    }
}

/// Scores closer than this are tied when ranking candidates.
const CONTENT_TIE: f64 = 1e-9;

/// Weighted mean of the sub-scores that do not depend on the previous pass.
fn content_score(weights: &QualityWeights, report: &GenerationQualityReport) -> f64 {
    let parts = [
        (weights.technical, report.technical),
        (weights.coherence, report.coherence),
        (weights.intent_match, report.intent_match),
    ];
    let sum: f64 = parts.iter().map(|(w, _)| w).sum();
    if sum <= 0.0 {
        return parts.iter().map(|(_, s)| s).sum::<f64>() / parts.len() as f64;
    }
    parts.iter().map(|(w, s)| w * s).sum::<f64>() / sum
}

/// Weighted mean of the four sub-scores, strictly below 1.0 unless all four
/// are exactly 1.0.
pub fn overall_score(weights: &QualityWeights, subs: [f64; 4]) -> f64 {
    if subs.iter().all(|&s| s == 1.0) {
        return 1.0;
    }
    let w = [weights.technical, weights.coherence, weights.creativity, weights.intent_match];
    let sum: f64 = w.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    let mean = w.iter().zip(subs).map(|(w, s)| w * s.clamp(0.0, 1.0)).sum::<f64>() / sum;
    mean.clamp(0.0, BELOW_PERFECT)
}

// ── Per-track measurements ──────────────────────────────────────────

/// How a track fills the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityProfile {
    /// Distinct sixteenth slots with an onset, over all slots.
    pub onset_fraction: f64,
    /// Bars in which something sounds, over all bars.
    pub bar_coverage: f64,
}

pub fn density_profile(track: &Track, bars: u32, ticks_per_bar: u32) -> DensityProfile {
    let total = bars.saturating_mul(ticks_per_bar);
    let slots = (total / TICKS_PER_SIXTEENTH).max(1);
    let onsets: BTreeSet<u32> = track
        .notes
        .iter()
        .map(|n| n.start_tick / TICKS_PER_SIXTEENTH)
        .filter(|&s| s < slots)
        .collect();

    let mut covered = vec![false; bars as usize];
    for note in &track.notes {
        let first = note.start_tick / ticks_per_bar.max(1);
        let last = note.end_tick().saturating_sub(1) / ticks_per_bar.max(1);
        for bar in first..=last.min(bars.saturating_sub(1)) {
            if let Some(slot) = covered.get_mut(bar as usize) {
                *slot = true;
            }
        }
    }
    let covered_bars = covered.iter().filter(|c| **c).count();

    DensityProfile {
        onset_fraction: onsets.len() as f64 / slots as f64,
        bar_coverage: if bars == 0 {
            0.0
        } else {
            covered_bars as f64 / bars as f64
        },
    }
}

/// FX is sparse by definition; drums and arpeggios may fill every slot.
pub fn is_density_plausible(role: Role, profile: &DensityProfile) -> bool {
    let max_onsets = match role {
        Role::Fx => return true,
        Role::Drums | Role::Arpeggio => 1.0,
        _ => MAX_ONSET_FRACTION,
    };
    profile.onset_fraction <= max_onsets && profile.bar_coverage >= MIN_BAR_COVERAGE
}

/// Fraction of a track's notes that are well-formed, in order and in bounds.
fn validity(track: &Track, total_ticks: u32) -> f64 {
    if track.notes.is_empty() {
        return 0.0;
    }
    let mut previous_start = 0;
    let valid = track
        .notes
        .iter()
        .filter(|n| {
            let ordered = n.start_tick >= previous_start;
            previous_start = n.start_tick;
            ordered
                && n.pitch <= 127
                && (1..=127).contains(&n.velocity)
                && n.duration_ticks > 0
                && n.end_tick() <= total_ticks
                && n.channel == track.config.channel
        })
        .count();
    valid as f64 / track.notes.len() as f64
}

fn in_range_fraction(track: &Track) -> f64 {
    if track.notes.is_empty() {
        return 0.0;
    }
    let (low, high) = track.config.pitch_range;
    let inside = track
        .notes
        .iter()
        .filter(|n| (low..=high).contains(&n.pitch))
        .count();
    inside as f64 / track.notes.len() as f64
}

/// Interval sequence used for creativity: pitch steps for pitched tracks,
/// (drum, grid position) pairs for drums.
fn event_sequence(track: &Track, ticks_per_bar: u32) -> Vec<i32> {
    let notes = &track.notes[..track.notes.len().min(MAX_COMPARED_EVENTS + 1)];
    if track.config.role == Role::Drums {
        notes
            .iter()
            .map(|n| n.pitch as i32 * 1000 + ((n.start_tick % ticks_per_bar.max(1)) / TICKS_PER_SIXTEENTH) as i32)
            .collect()
    } else {
        notes
            .windows(2)
            .map(|w| w[1].pitch as i32 - w[0].pitch as i32)
            .collect()
    }
}

/// Classic two-row Levenshtein distance.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(x != y);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn normalized_distance(a: &[i32], b: &[i32]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    edit_distance(a, b) as f64 / longest as f64
}

// ── Evaluator ───────────────────────────────────────────────────────

pub struct QualityEvaluator<'a> {
    registry: &'a Registry,
    weights: QualityWeights,
}

impl<'a> QualityEvaluator<'a> {
    pub fn new(registry: &'a Registry, weights: QualityWeights) -> Self {
        QualityEvaluator { registry, weights }
    }

    /// Score `tracks` against `intent`. `previous` is the track set before
    /// the last refinement, if there was one.
    pub fn evaluate(
        &self,
        intent: &MusicIntent,
        tracks: &[Track],
        previous: Option<&[Track]>,
    ) -> GenerationQualityReport {
        let ticks_per_bar = intent.ticks_per_bar();
        let total = intent.total_ticks();
        let mut issues = Vec::new();

        let profiles: Vec<DensityProfile> = tracks
            .iter()
            .map(|t| density_profile(t, intent.duration_bars, ticks_per_bar))
            .collect();
        let plausible: Vec<bool> = tracks
            .iter()
            .zip(&profiles)
            .map(|(t, p)| !t.is_silent() && is_density_plausible(t.role(), p))
            .collect();

        let mut track_scores = Vec::with_capacity(tracks.len());
        for ((track, profile), &ok) in tracks.iter().zip(&profiles).zip(&plausible) {
            let name = &track.config.name;
            if track.is_silent() {
                issues.push(issue(Severity::Medium, format!("track '{name}' is silent")));
            } else if !ok {
                issues.push(issue(
                    Severity::Medium,
                    format!(
                        "track '{name}' has implausible density (onsets {:.2}, coverage {:.2})",
                        profile.onset_fraction, profile.bar_coverage
                    ),
                ));
            }
            let score = if track.is_silent() {
                0.0
            } else {
                0.4 * validity(track, total)
                    + 0.3 * if ok { 1.0 } else { 0.0 }
                    + 0.3 * in_range_fraction(track)
            };
            track_scores.push(TrackScore {
                role: track.role(),
                score,
            });
        }

        let technical = score_technical(tracks, &plausible, total);
        let coherence = score_coherence(tracks, &mut issues);
        let creativity = score_creativity(tracks, previous, ticks_per_bar);
        let intent_match = self.score_intent_match(intent, tracks);

        for (name, value) in [
            ("technical", technical),
            ("coherence", coherence),
            ("creativity", creativity),
            ("intent match", intent_match),
        ] {
            if value < HIGH_SEVERITY_BELOW {
                issues.push(issue(Severity::High, format!("{name} score {value:.2} is below 0.5")));
            }
        }

        let overall = overall_score(&self.weights, [technical, coherence, creativity, intent_match]);
        tracing::debug!(technical, coherence, creativity, intent_match, overall, "quality scored");
        GenerationQualityReport {
            technical,
            coherence,
            creativity,
            intent_match,
            overall,
            issues,
            track_scores,
        }
    }

    fn score_intent_match(&self, intent: &MusicIntent, tracks: &[Track]) -> f64 {
        let ticks_per_bar = intent.ticks_per_bar().max(1);
        let end = tracks.iter().map(Track::end_tick).max().unwrap_or(0);
        let actual_bars = end.div_ceil(ticks_per_bar);
        let bars = ratio(actual_bars as f64, intent.duration_bars as f64);

        let sounding = tracks.iter().filter(|t| !t.is_silent()).count();
        let count = ratio(sounding as f64, intent.target_track_count() as f64);

        let genre = self.registry.genre_or_default(&intent.genre);
        let pitched: Vec<&Track> = tracks.iter().filter(|t| t.role() != Role::Drums).collect();
        let instruments = if pitched.is_empty() {
            1.0
        } else {
            let fitting = pitched
                .iter()
                .filter(|t| {
                    self.registry
                        .is_genre_instrument(genre, t.role(), t.config.instrument)
                })
                .count();
            fitting as f64 / pitched.len() as f64
        };

        (bars + count + instruments) / 3.0
    }
}

fn issue(severity: Severity, message: String) -> QualityIssue {
    QualityIssue { severity, message }
}

/// min/max of two non-negative quantities; 1.0 when both are zero.
fn ratio(a: f64, b: f64) -> f64 {
    let high = a.max(b);
    if high <= 0.0 { 1.0 } else { a.min(b) / high }
}

fn score_technical(tracks: &[Track], plausible: &[bool], total_ticks: u32) -> f64 {
    let note_count: usize = tracks.iter().map(|t| t.notes.len()).sum();
    let validity_score = if note_count == 0 {
        0.0
    } else {
        tracks
            .iter()
            .map(|t| validity(t, total_ticks) * t.notes.len() as f64)
            .sum::<f64>()
            / note_count as f64
    };

    let judged: Vec<bool> = tracks
        .iter()
        .zip(plausible)
        .filter(|(t, _)| t.role() != Role::Fx)
        .map(|(_, &ok)| ok)
        .collect();
    let density_score = if judged.is_empty() {
        1.0
    } else {
        judged.iter().filter(|ok| **ok).count() as f64 / judged.len() as f64
    };

    0.8 * validity_score + 0.2 * density_score
}

fn score_coherence(tracks: &[Track], issues: &mut Vec<QualityIssue>) -> f64 {
    if tracks.is_empty() {
        return 0.0;
    }
    let sounding = |pred: fn(Role) -> bool| tracks.iter().any(|t| !t.is_silent() && pred(t.role()));

    let melodic = if sounding(Role::is_lead_voice) { 1.0 } else { 0.0 };
    let rhythm = if tracks.len() == 1 || sounding(|r| matches!(r, Role::Drums | Role::Bass)) {
        1.0
    } else {
        0.0
    };
    let distinct: BTreeSet<Role> = tracks.iter().map(Track::role).collect();
    let balance = if tracks.len() <= crate::types::MAX_TRACKS {
        distinct.len() as f64 / tracks.len() as f64
    } else {
        0.0
    };

    let span_of = |role: Role| tracks.iter().find(|t| t.role() == role).and_then(Track::pitch_span);
    let separation = match (span_of(Role::Melody), span_of(Role::Bass)) {
        (Some((ml, mh)), Some((bl, bh))) => {
            let overlap = (mh.min(bh) as f64 - ml.max(bl) as f64).max(0.0);
            let width = (mh as f64 - ml as f64).max(1.0);
            let fraction = (overlap / width).min(1.0);
            if fraction > 0.5 {
                issues.push(issue(Severity::Low, "melody and bass registers overlap".into()));
            }
            1.0 - fraction
        }
        _ => 1.0,
    };

    (melodic + rhythm + balance + separation) / 4.0
}

fn score_creativity(tracks: &[Track], previous: Option<&[Track]>, ticks_per_bar: u32) -> f64 {
    let Some(previous) = previous else {
        return 1.0;
    };
    let distances: Vec<f64> = tracks
        .iter()
        .filter_map(|track| {
            let before = previous.iter().find(|p| p.role() == track.role())?;
            if before.notes == track.notes {
                return None;
            }
            Some(normalized_distance(
                &event_sequence(before, ticks_per_bar),
                &event_sequence(track, ticks_per_bar),
            ))
        })
        .collect();
    if distances.is_empty() {
        0.0
    } else {
        distances.iter().sum::<f64>() / distances.len() as f64
    }
}
