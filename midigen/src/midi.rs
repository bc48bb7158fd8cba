// MIDI output from generated tracks.
//
// Converts a set of `Track`s into a Standard MIDI File at 480 PPQ. With more
// than one track the file is SMF Format 1: a leading conductor track carries
// tempo and time signature, then one MIDI track per generated track. A single
// track is written as Format 0 with the meta events inline.
//
// Each track gets a name, one program change, paired note-on/note-off events
// (at equal ticks note-offs come first, so repeated pitches re-trigger
// cleanly), and an end-of-track marker.
//
// All input is validated before anything is encoded; an invalid note yields
// a `SerializationError` and no bytes. Uses the `midly` crate for event
// encoding (VLQ deltas, running status).

use crate::error::SerializationError;
use crate::types::{TICKS_PER_QUARTER, TimeSignature, Track};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

/// Largest absolute tick we encode; keeps every delta inside `u28`.
const MAX_TICK: u32 = 0x0FFF_FFFF;

/// Largest tempo value a `Tempo` meta event can hold (microseconds/quarter).
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Encode `tracks` as SMF bytes.
pub fn serialize(
    tracks: &[Track],
    tempo_bpm: u16,
    time_signature: TimeSignature,
) -> Result<Vec<u8>, SerializationError> {
    if tracks.is_empty() {
        return Err(SerializationError::NoTracks);
    }
    let tempo = tempo_micros(tempo_bpm)?;
    for track in tracks {
        validate_track(track)?;
    }

    let smf = build_smf(tracks, tempo, time_signature);
    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| SerializationError::Write(e.to_string()))?;
    tracing::debug!(tracks = tracks.len(), bytes = bytes.len(), "encoded SMF");
    Ok(bytes)
}

fn tempo_micros(tempo_bpm: u16) -> Result<u32, SerializationError> {
    if tempo_bpm == 0 {
        return Err(SerializationError::InvalidTempo(tempo_bpm));
    }
    let micros = 60_000_000 / tempo_bpm as u32;
    if micros > MAX_TEMPO_MICROS {
        return Err(SerializationError::InvalidTempo(tempo_bpm));
    }
    Ok(micros)
}

fn validate_track(track: &Track) -> Result<(), SerializationError> {
    let name = || track.config.name.clone();
    if track.config.channel > 15 {
        return Err(SerializationError::InvalidChannel {
            track: name(),
            channel: track.config.channel,
        });
    }
    let program = track.config.instrument.program_number();
    if program > 127 {
        return Err(SerializationError::InvalidProgram {
            track: name(),
            program,
        });
    }
    for note in &track.notes {
        if note.pitch > 127 {
            return Err(SerializationError::InvalidPitch {
                track: name(),
                pitch: note.pitch,
            });
        }
        if note.velocity == 0 || note.velocity > 127 {
            return Err(SerializationError::InvalidVelocity {
                track: name(),
                velocity: note.velocity,
            });
        }
        if note.channel > 15 {
            return Err(SerializationError::InvalidChannel {
                track: name(),
                channel: note.channel,
            });
        }
        if note.duration_ticks == 0 {
            return Err(SerializationError::ZeroDuration {
                track: name(),
                tick: note.start_tick,
            });
        }
        match note.start_tick.checked_add(note.duration_ticks) {
            Some(end) if end <= MAX_TICK => {}
            _ => return Err(SerializationError::TickOverflow { track: name() }),
        }
    }
    Ok(())
}

fn meta(kind: MetaMessage<'_>) -> TrackEventKind<'_> {
    TrackEventKind::Meta(kind)
}

fn conductor_events(tempo: u32, time_signature: TimeSignature) -> [TrackEventKind<'static>; 2] {
    [
        meta(MetaMessage::Tempo(u24::new(tempo))),
        meta(MetaMessage::TimeSignature(
            time_signature.numerator,
            time_signature.denominator_power(),
            24,
            8,
        )),
    ]
}

/// Assemble the SMF. Input must already be validated.
fn build_smf(tracks: &[Track], tempo: u32, time_signature: TimeSignature) -> Smf<'_> {
    let format = if tracks.len() > 1 {
        Format::Parallel
    } else {
        Format::SingleTrack
    };
    let mut smf = Smf::new(Header::new(
        format,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER as u16)),
    ));

    if format == Format::Parallel {
        let mut conductor: Vec<TrackEvent<'static>> = conductor_events(tempo, time_signature)
            .into_iter()
            .map(|kind| TrackEvent {
                delta: u28::new(0),
                kind,
            })
            .collect();
        conductor.push(TrackEvent {
            delta: u28::new(0),
            kind: meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(conductor);
        for track in tracks {
            smf.tracks.push(track_events(track, &[]));
        }
    } else {
        let inline = conductor_events(tempo, time_signature);
        smf.tracks.push(track_events(&tracks[0], &inline));
    }
    smf
}

/// Events of one MIDI track: optional leading meta events, name, program,
/// notes, end of track.
fn track_events<'a>(track: &'a Track, leading: &[TrackEventKind<'a>]) -> Vec<TrackEvent<'a>> {
    let channel = u4::new(track.config.channel);
    let mut events: Vec<TrackEvent<'a>> = leading
        .iter()
        .map(|&kind| TrackEvent {
            delta: u28::new(0),
            kind,
        })
        .collect();
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: meta(MetaMessage::TrackName(track.config.name.as_bytes())),
    });
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(track.config.instrument.program_number()),
            },
        },
    });

    // (tick, is_on, channel, message); offs sort before ons at equal ticks.
    let mut timed: Vec<(u32, bool, u4, MidiMessage)> = Vec::with_capacity(track.notes.len() * 2);
    for note in &track.notes {
        let ch = u4::new(note.channel);
        let key = u7::new(note.pitch);
        timed.push((
            note.start_tick,
            true,
            ch,
            MidiMessage::NoteOn {
                key,
                vel: u7::new(note.velocity),
            },
        ));
        timed.push((
            note.end_tick(),
            false,
            ch,
            MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            },
        ));
    }
    timed.sort_by_key(|&(tick, is_on, _, _)| (tick, is_on));

    let mut last_tick = 0u32;
    for (tick, _, channel, message) in timed {
        events.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: meta(MetaMessage::EndOfTrack),
    });
    events
}
