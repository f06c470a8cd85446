//! Protocol encoder
//!
//! Serializes allocation decisions into the word stream. Per Event the
//! output is: delay words, note-on words in allocation order, then one
//! notes-off word for voices that were released and not restarted.
//!
//! An Event made only of note-offs is held back. If the next Event follows
//! within `MERGE_WINDOW` seconds the two are merged, which postpones the
//! silence until just before the next note and gives the drives the longest
//! possible release.

use std::io::Write;

use log::debug;

use crate::pipeline::allocator::{
    AffinityConfig, Allocation, ChannelAffinityAllocator, VoiceAllocator,
};
use crate::pipeline::collector::{ChannelFilter, Event, PERCUSSION_CHANNEL};
use crate::pipeline::orchestration::{OrchestratedAllocator, Orchestration};
use crate::protocol::{delay_commands, note_frequency, write_word, Command, MAX_VOICES};

/// Notes-off Events followed sooner than this are merged into the next Event
pub const MERGE_WINDOW: f64 = 0.01;

/// Encoding errors
#[derive(Debug)]
pub enum EncodeError {
    /// Voice count outside 1..=MAX_VOICES
    InvalidVoiceCount(usize),
    /// An allocator chose a voice the stream cannot address
    VoiceOutOfRange { voice: usize, voices: usize },
    /// Tried to merge an Event that starts notes
    InvalidMerge { timestamp: f64 },
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::InvalidVoiceCount(n) => {
                write!(f, "Invalid voice count {}: expected 1-{}", n, MAX_VOICES)
            }
            EncodeError::VoiceOutOfRange { voice, voices } => {
                write!(f, "Voice {} out of range ({} voices)", voice, voices)
            }
            EncodeError::InvalidMerge { timestamp } => {
                write!(f, "Invalid merge of Event with note-ons at {:.3}s", timestamp)
            }
            EncodeError::Io(e) => write!(f, "Write failed: {}", e),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(e: std::io::Error) -> Self {
        EncodeError::Io(e)
    }
}

/// How notes are assigned to drives
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    ChannelAffinity(AffinityConfig),
    Orchestrated(Orchestration),
}

impl Strategy {
    /// Filter the collector should apply for this strategy
    pub fn channel_filter(&self) -> ChannelFilter {
        match self {
            Strategy::ChannelAffinity(config) => {
                let mut excluded = config.excluded_channels.clone();
                excluded.insert(PERCUSSION_CHANNEL);
                ChannelFilter::Exclude(excluded)
            }
            Strategy::Orchestrated(orchestration) => orchestration.channel_filter(),
        }
    }

    pub fn voices(&self) -> usize {
        match self {
            Strategy::ChannelAffinity(config) => config.voices,
            Strategy::Orchestrated(orchestration) => orchestration.voices.len(),
        }
    }

    pub fn build(self) -> Result<Box<dyn VoiceAllocator>, EncodeError> {
        let voices = self.voices();
        if voices == 0 || voices > MAX_VOICES {
            return Err(EncodeError::InvalidVoiceCount(voices));
        }
        Ok(match self {
            Strategy::ChannelAffinity(config) => Box::new(ChannelAffinityAllocator::new(config)),
            Strategy::Orchestrated(orchestration) => {
                Box::new(OrchestratedAllocator::new(orchestration))
            }
        })
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::ChannelAffinity(AffinityConfig::default())
    }
}

/// Counters from one encoding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub events: usize,
    pub words: usize,
    pub notes_placed: usize,
    pub notes_dropped: usize,
}

/// Turns Events into protocol commands
pub struct ProtocolEncoder {
    allocator: Box<dyn VoiceAllocator>,
    /// Seconds of delay requested so far
    elapsed: f64,
    /// Milliseconds of delay emitted so far
    emitted_ms: u64,
    stats: EncodeStats,
}

impl ProtocolEncoder {
    pub fn new(allocator: Box<dyn VoiceAllocator>) -> Result<Self, EncodeError> {
        let voices = allocator.voices();
        if voices == 0 || voices > MAX_VOICES {
            return Err(EncodeError::InvalidVoiceCount(voices));
        }
        Ok(Self {
            allocator,
            elapsed: 0.0,
            emitted_ms: 0,
            stats: EncodeStats::default(),
        })
    }

    pub fn from_strategy(strategy: Strategy) -> Result<Self, EncodeError> {
        Self::new(strategy.build()?)
    }

    pub fn stats(&self) -> EncodeStats {
        self.stats
    }

    /// Encode every Event, applying the notes-off merge
    pub fn encode_events(
        &mut self,
        events: impl IntoIterator<Item = Event>,
    ) -> Result<Vec<Command>, EncodeError> {
        let mut commands = Vec::new();
        let mut pending: Option<Event> = None;

        for mut event in events {
            if let Some(held) = pending.take() {
                if event.delay < MERGE_WINDOW {
                    debug!(
                        "merging {} note-offs at {:.3}s into next event",
                        held.notes_off.len(),
                        held.timestamp
                    );
                    event.merge(held)?;
                } else {
                    self.encode_event(&held, &mut commands)?;
                }
            }

            if event.is_release_only() {
                pending = Some(event);
            } else {
                self.encode_event(&event, &mut commands)?;
            }
        }

        if let Some(held) = pending {
            self.encode_event(&held, &mut commands)?;
        }

        Ok(commands)
    }

    /// Encode every Event and write the words big-endian to `out`
    pub fn write_events<W: Write>(
        &mut self,
        events: impl IntoIterator<Item = Event>,
        out: &mut W,
    ) -> Result<EncodeStats, EncodeError> {
        for command in self.encode_events(events)? {
            write_word(out, command.encode())?;
        }
        out.flush()?;
        Ok(self.stats)
    }

    fn encode_event(&mut self, event: &Event, out: &mut Vec<Command>) -> Result<(), EncodeError> {
        self.stats.events += 1;
        let before = out.len();

        // Rounded from the running total so per-event rounding never drifts
        self.elapsed += event.delay;
        let target_ms = (self.elapsed * 1000.0).round().max(0.0) as u64;
        let delay_ms = target_ms.saturating_sub(self.emitted_ms);
        self.emitted_ms += delay_ms;
        out.extend(delay_commands(delay_ms));

        let Allocation {
            starts,
            stop_mask,
            dropped,
        } = self.allocator.allocate(event);

        let voices = self.allocator.voices();
        for start in &starts {
            if start.voice >= voices {
                return Err(EncodeError::VoiceOutOfRange {
                    voice: start.voice,
                    voices,
                });
            }
            out.push(Command::NoteOn {
                voice: start.voice as u8,
                frequency: note_frequency(start.note.pitch),
            });
        }

        if stop_mask != 0 {
            out.push(Command::NotesOff { mask: stop_mask });
        }

        self.stats.notes_placed += starts.len();
        self.stats.notes_dropped += dropped;
        self.stats.words += out.len() - before;
        Ok(())
    }
}
