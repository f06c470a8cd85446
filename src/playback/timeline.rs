//! Offline view of a command stream
//!
//! Walks the commands with a virtual clock and records when each voice
//! sounded which frequency. Used for plots and preview renders.

use crate::protocol::Command;

/// One voice sounding one frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub voice: usize,
    pub frequency: u16,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// All spans of a stream, ordered by start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    pub spans: Vec<Span>,
    pub duration_ms: u64,
}

impl Timeline {
    /// Highest voice index used, plus one
    pub fn voice_count(&self) -> usize {
        self.spans.iter().map(|s| s.voice + 1).max().unwrap_or(0)
    }
}

/// Build the timeline for a sequence of commands
///
/// A note-on closes whatever its voice was sounding; notes still open at
/// the end of the stream close at the final time.
pub fn timeline(commands: impl IntoIterator<Item = Command>) -> Timeline {
    let mut open: [Option<(u16, u64)>; 16] = [None; 16];
    let mut spans = Vec::new();
    let mut now = 0u64;

    let mut close = |voice: usize, open: &mut [Option<(u16, u64)>; 16], now: u64| {
        if let Some((frequency, start_ms)) = open[voice].take() {
            spans.push(Span {
                voice,
                frequency,
                start_ms,
                end_ms: now,
            });
        }
    };

    for command in commands {
        match command {
            Command::NoteOn { voice, frequency } => {
                let voice = voice as usize;
                close(voice, &mut open, now);
                open[voice] = Some((frequency, now));
            }
            Command::Delay { ms } => now += ms as u64,
            Command::NotesOff { mask } => {
                for voice in Command::mask_voices(mask) {
                    close(voice, &mut open, now);
                }
            }
        }
    }
    for voice in 0..open.len() {
        close(voice, &mut open, now);
    }

    spans.sort_by_key(|s| (s.start_ms, s.voice));
    Timeline {
        spans,
        duration_ms: now,
    }
}
