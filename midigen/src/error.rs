// Error types for the generation pipeline.
//
// Only `PipelineError` ever reaches a caller. The other enums describe
// failures that the stages recover from locally (intent extraction falls
// back to keywords, a failed role algorithm becomes a silent track) or that
// are wrapped into `PipelineError` (serialization).

use crate::types::Role;
use midigen_llm::LlmError;
use thiserror::Error;

/// A failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("MIDI serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid registry: {0}")]
    Registry(String),

    #[error("internal pipeline error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Track data that cannot be encoded as a Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    #[error("no tracks to serialize")]
    NoTracks,

    #[error("track '{track}': pitch {pitch} is outside 0..=127")]
    InvalidPitch { track: String, pitch: u8 },

    #[error("track '{track}': velocity {velocity} is outside 1..=127")]
    InvalidVelocity { track: String, velocity: u8 },

    #[error("track '{track}': channel {channel} is outside 0..=15")]
    InvalidChannel { track: String, channel: u8 },

    #[error("track '{track}': program {program} is outside 0..=127")]
    InvalidProgram { track: String, program: u8 },

    #[error("track '{track}': zero-length note at tick {tick}")]
    ZeroDuration { track: String, tick: u32 },

    #[error("track '{track}': note end tick overflows the MIDI delta range")]
    TickOverflow { track: String },

    #[error("tempo {0} BPM cannot be encoded")]
    InvalidTempo(u16),

    #[error("failed to write SMF: {0}")]
    Write(String),
}

/// Why the language-model path of intent extraction produced nothing usable.
#[derive(Debug, Error)]
pub enum IntentExtractionError {
    #[error(transparent)]
    Gateway(#[from] LlmError),

    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply does not match the intent schema: {0}")]
    Schema(String),
}

/// A role algorithm produced no notes for a non-empty composition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{role} produced no notes for {bars} bars")]
    NoNotes { role: Role, bars: u32 },
}
