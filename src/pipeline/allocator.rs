//! Voice allocation
//!
//! Maps an unbounded polyphonic note stream onto a fixed number of drives.
//! Allocators consume one `Event` at a time and report which voices start a
//! new note and which voices fall silent.

use std::collections::BTreeSet;

use log::debug;

use crate::pipeline::collector::{Event, Note};

/// Age a sounding note must reach before a priority note may replace it
pub const PRIORITY_PREEMPT_AGE: f64 = 0.075;

/// Age a sounding note must reach before any other note may replace it
pub const PREEMPT_AGE: f64 = 0.15;

/// Channel to preferred voice; channels not listed prefer voice 0
pub const AFFINITY: &[(u8, usize)] = &[(1, 2), (7, 2), (8, 3)];

/// A voice beginning a new note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceStart {
    pub voice: usize,
    pub note: Note,
}

/// Per-event allocation decisions
///
/// A voice listed in `starts` never has its bit set in `stop_mask`:
/// starting a note silences whatever the voice played before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub starts: Vec<VoiceStart>,
    pub stop_mask: u16,
    /// Note-ons that found no voice
    pub dropped: usize,
}

impl Allocation {
    pub(crate) fn start(&mut self, voice: usize, note: Note) {
        self.stop_mask &= !(1 << voice);
        self.starts.push(VoiceStart { voice, note });
    }
}

/// Strategy for placing notes on voices
pub trait VoiceAllocator {
    /// Number of physical voices this allocator addresses
    fn voices(&self) -> usize;

    /// Apply one Event and report the resulting voice changes
    fn allocate(&mut self, event: &Event) -> Allocation;
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    note: Option<Note>,
    /// When the most recent note on this voice started; kept after release
    started: Option<f64>,
}

/// What every voice is sounding
///
/// Released voices keep their start time until a new note lands, so a
/// freshly vacated voice still ages like the note it held.
#[derive(Debug, Clone)]
pub struct VoiceState {
    slots: Vec<Slot>,
}

impl VoiceState {
    pub fn new(voices: usize) -> Self {
        Self {
            slots: vec![Slot::default(); voices],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn playing(&self, voice: usize) -> Option<&Note> {
        self.slots.get(voice).and_then(|slot| slot.note.as_ref())
    }

    pub fn started(&self, voice: usize) -> Option<f64> {
        self.slots.get(voice).and_then(|slot| slot.started)
    }

    pub fn is_free(&self, voice: usize) -> bool {
        self.playing(voice).is_none()
    }

    pub fn assign(&mut self, voice: usize, note: Note, at: f64) {
        self.slots[voice] = Slot {
            note: Some(note),
            started: Some(at),
        };
    }

    /// Release every voice sounding `note`, returning their mask
    pub fn release_matching(&mut self, note: &Note) -> u16 {
        let mut mask = 0;
        for (voice, slot) in self.slots.iter_mut().enumerate() {
            if slot.note.is_some_and(|playing| playing.same_key(note)) {
                slot.note = None;
                mask |= 1 << voice;
            }
        }
        mask
    }
}

/// Settings for the channel-affinity strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityConfig {
    /// Number of drives
    pub voices: usize,
    /// Channels whose notes are placed first and never preempted
    pub priority_channels: BTreeSet<u8>,
    /// Channels left out of the output entirely
    pub excluded_channels: BTreeSet<u8>,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            voices: 4,
            priority_channels: BTreeSet::new(),
            excluded_channels: BTreeSet::new(),
        }
    }
}

/// Preferred voice for a channel, ignoring rules beyond `voices`
pub fn affinity_voice(channel: u8, voices: usize) -> usize {
    AFFINITY
        .iter()
        .find(|(c, v)| *c == channel && *v < voices)
        .map_or(0, |(_, v)| *v)
}

/// Ages compare in whole milliseconds; an age equal to the threshold is eligible
fn whole_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Strategy A: static channel affinity with age-limited preemption
pub struct ChannelAffinityAllocator {
    config: AffinityConfig,
    state: VoiceState,
}

impl ChannelAffinityAllocator {
    pub fn new(config: AffinityConfig) -> Self {
        let state = VoiceState::new(config.voices);
        Self { config, state }
    }

    pub fn state(&self) -> &VoiceState {
        &self.state
    }

    fn is_priority(&self, channel: u8) -> bool {
        self.config.priority_channels.contains(&channel)
    }

    /// Pick a voice for `note` arriving at `now`, or None to drop it
    fn place(&self, note: &Note, now: f64) -> Option<usize> {
        if self.config.excluded_channels.contains(&note.channel) {
            return None;
        }

        let preferred = affinity_voice(note.channel, self.state.len());
        if self.state.is_free(preferred) {
            return Some(preferred);
        }

        let threshold = if self.is_priority(note.channel) {
            PRIORITY_PREEMPT_AGE
        } else {
            PREEMPT_AGE
        };

        // Voices that never sounded compare as oldest
        (0..self.state.len())
            .filter(|&v| {
                self.state
                    .playing(v)
                    .is_none_or(|playing| !self.is_priority(playing.channel))
            })
            .filter_map(|v| match self.state.started(v) {
                None => Some((v, f64::NEG_INFINITY)),
                Some(started) if whole_ms(now - started) >= whole_ms(threshold) => {
                    Some((v, started))
                }
                Some(_) => None,
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(v, _)| v)
    }
}

impl VoiceAllocator for ChannelAffinityAllocator {
    fn voices(&self) -> usize {
        self.state.len()
    }

    fn allocate(&mut self, event: &Event) -> Allocation {
        let mut allocation = Allocation::default();

        for note_off in &event.notes_off {
            allocation.stop_mask |= self.state.release_matching(note_off);
        }

        // Stable sort keeps source order within each group
        let mut notes_on = event.notes_on.clone();
        notes_on.sort_by_key(|note| !self.is_priority(note.channel));

        for note in notes_on {
            match self.place(&note, event.timestamp) {
                Some(voice) => {
                    self.state.assign(voice, note, event.timestamp);
                    allocation.start(voice, note);
                }
                None => {
                    debug!(
                        "dropped pitch {} on channel {} at {:.3}s",
                        note.pitch, note.channel, event.timestamp
                    );
                    allocation.dropped += 1;
                }
            }
        }

        allocation
    }
}
