//! Standard MIDI File front-end
//!
//! Flattens every track of a song into one chronological list of note
//! changes with delays in seconds, ready for the `EventCollector`.
//! Channels are reported 1-based, matching what notation software shows.

use std::collections::BTreeSet;

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::pipeline::collector::EventCollector;

/// Tempo until the song sets one: 120 BPM
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Track names that mark the tune to prioritize
const MELODY_TRACK_PREFIXES: &[&str] = &["melody", "vocals"];

/// Whether a note starts or ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// A note change `delta` seconds after the previous one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawNote {
    pub delta: f64,
    pub kind: NoteKind,
    pub pitch: u8,
    /// 1-based channel
    pub channel: u8,
    pub velocity: u8,
}

/// MIDI errors
#[derive(Debug)]
pub enum MidiError {
    Parse(midly::Error),
    /// Type 2 files hold independent sequences, not one song
    UnsupportedFormat,
}

impl std::fmt::Display for MidiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MidiError::Parse(e) => write!(f, "Invalid MIDI file: {}", e),
            MidiError::UnsupportedFormat => write!(f, "Sequential (type 2) MIDI files are not supported"),
        }
    }
}

impl std::error::Error for MidiError {}

impl From<midly::Error> for MidiError {
    fn from(e: midly::Error) -> Self {
        MidiError::Parse(e)
    }
}

enum Change {
    Note(NoteKind, u8, u8, u8),
    Tempo(u32),
    Other,
}

/// Note changes of a whole song
#[derive(Debug, Clone, Default)]
pub struct MidiSong {
    notes: Vec<RawNote>,
    /// Time after the last note until the song ends
    trailing: f64,
    channels: BTreeSet<u8>,
    melody_channels: BTreeSet<u8>,
}

impl MidiSong {
    pub fn parse(bytes: &[u8]) -> Result<Self, MidiError> {
        let smf = Smf::parse(bytes)?;
        Self::from_smf(&smf)
    }

    pub fn from_smf(smf: &Smf) -> Result<Self, MidiError> {
        if smf.header.format == Format::Sequential {
            return Err(MidiError::UnsupportedFormat);
        }

        let mut song = MidiSong::default();
        let mut merged: Vec<(u64, Change)> = Vec::new();

        for track in &smf.tracks {
            let mut tick = 0u64;
            let mut name: Option<String> = None;
            let mut track_channels = BTreeSet::new();

            for event in track {
                tick += event.delta.as_int() as u64;
                let change = match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        let channel = channel.as_int() + 1;
                        match message {
                            MidiMessage::NoteOn { key, vel } => {
                                track_channels.insert(channel);
                                let kind = if vel.as_int() == 0 {
                                    NoteKind::Off
                                } else {
                                    NoteKind::On
                                };
                                Change::Note(kind, key.as_int(), channel, vel.as_int())
                            }
                            MidiMessage::NoteOff { key, .. } => {
                                Change::Note(NoteKind::Off, key.as_int(), channel, 0)
                            }
                            _ => Change::Other,
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Change::Tempo(tempo.as_int()),
                    TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                        name = Some(String::from_utf8_lossy(bytes).into_owned());
                        Change::Other
                    }
                    _ => Change::Other,
                };
                merged.push((tick, change));
            }

            if name.as_deref().is_some_and(is_melody_name) {
                song.melody_channels.extend(track_channels.iter().copied());
            }
            song.channels.extend(track_channels);
        }

        // stable: simultaneous events keep track order
        merged.sort_by_key(|(tick, _)| *tick);

        let mut tempo = DEFAULT_TEMPO_US;
        let mut last_tick = 0u64;
        let mut pending = 0.0;
        for (tick, change) in merged {
            pending += ticks_to_seconds(tick - last_tick, tempo, smf.header.timing);
            last_tick = tick;
            match change {
                Change::Note(kind, pitch, channel, velocity) => {
                    song.notes.push(RawNote {
                        delta: pending,
                        kind,
                        pitch,
                        channel,
                        velocity,
                    });
                    pending = 0.0;
                }
                Change::Tempo(us) => tempo = us,
                Change::Other => {}
            }
        }
        song.trailing = pending;

        Ok(song)
    }

    pub fn notes(&self) -> &[RawNote] {
        &self.notes
    }

    /// Channels that start at least one note
    pub fn channels(&self) -> &BTreeSet<u8> {
        &self.channels
    }

    /// Channels of tracks named like a melody or vocal line
    pub fn melody_channels(&self) -> &BTreeSet<u8> {
        &self.melody_channels
    }

    /// Song length in seconds
    pub fn duration(&self) -> f64 {
        self.notes.iter().map(|n| n.delta).sum::<f64>() + self.trailing
    }

    /// Replay the song into a collector
    pub fn feed(&self, collector: &mut EventCollector) {
        for note in &self.notes {
            if note.delta > 0.0 {
                collector.log_delay(note.delta);
            }
            match note.kind {
                NoteKind::On => collector.log_note_on(note.pitch, note.channel, note.velocity),
                NoteKind::Off => collector.log_note_off(note.pitch, note.channel),
            }
        }
        collector.log_delay(self.trailing);
    }
}

fn is_melody_name(name: &str) -> bool {
    let name = name.to_lowercase();
    MELODY_TRACK_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn ticks_to_seconds(ticks: u64, tempo_us: u32, timing: Timing) -> f64 {
    match timing {
        Timing::Metrical(per_quarter) => {
            ticks as f64 * tempo_us as f64 / (per_quarter.as_int().max(1) as f64 * 1_000_000.0)
        }
        Timing::Timecode(fps, subframes) => {
            ticks as f64 / (fps.as_f32() as f64 * subframes.max(1) as f64)
        }
    }
}
