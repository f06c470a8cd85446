//! Event collector
//!
//! Coalesces a chronological stream of delays and note on/off calls into
//! `Event`s: groups of simultaneous note changes separated by a delay.
//!
//! Rules:
//! - A delay following an Event that carries no notes extends that Event
//!   (runs of silence become one Event).
//! - Notes attach to the latest Event; the first note creates a zero-delay
//!   Event at t=0.
//! - Notes on filtered channels are dropped.

use std::collections::BTreeSet;

use crate::pipeline::encoder::EncodeError;

/// General MIDI percussion channel (1-based)
pub const PERCUSSION_CHANNEL: u8 = 10;

/// A sounding (or released) note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: u8,
    pub channel: u8,
    pub velocity: u8,
    /// Seconds from the start of the song
    pub timestamp: f64,
}

impl Note {
    /// Two notes are the same sounding note when pitch and channel match
    pub fn same_key(&self, other: &Note) -> bool {
        self.pitch == other.pitch && self.channel == other.channel
    }
}

/// Simultaneous note changes, `delay` seconds after the previous Event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub delay: f64,
    /// Cumulative time: previous Event's timestamp plus `delay`
    pub timestamp: f64,
    pub notes_on: Vec<Note>,
    pub notes_off: Vec<Note>,
}

impl Event {
    pub fn new(delay: f64, previous_timestamp: f64) -> Self {
        Self {
            delay,
            timestamp: previous_timestamp + delay,
            notes_on: Vec::new(),
            notes_off: Vec::new(),
        }
    }

    pub fn has_notes(&self) -> bool {
        !self.notes_on.is_empty() || !self.notes_off.is_empty()
    }

    /// True for an Event made only of note-offs
    pub fn is_release_only(&self) -> bool {
        self.notes_on.is_empty() && !self.notes_off.is_empty()
    }

    /// Fold an earlier notes-off-only Event into this one
    ///
    /// The prior Event's delay is added to ours and its note-offs are
    /// processed with ours. Fails if the prior Event carries note-ons.
    pub fn merge(&mut self, prior: Event) -> Result<(), EncodeError> {
        if !prior.notes_on.is_empty() {
            return Err(EncodeError::InvalidMerge {
                timestamp: prior.timestamp,
            });
        }
        self.delay += prior.delay;
        self.notes_off.extend(prior.notes_off);
        Ok(())
    }
}

/// Which source channels reach the allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    /// Everything except these channels
    Exclude(BTreeSet<u8>),
    /// Only these channels
    Include(BTreeSet<u8>),
}

impl ChannelFilter {
    pub fn allows(&self, channel: u8) -> bool {
        match self {
            ChannelFilter::Exclude(channels) => !channels.contains(&channel),
            ChannelFilter::Include(channels) => channels.contains(&channel),
        }
    }
}

impl Default for ChannelFilter {
    fn default() -> Self {
        ChannelFilter::Exclude(BTreeSet::from([PERCUSSION_CHANNEL]))
    }
}

/// Builds the Event list from chronological note calls
#[derive(Debug, Default)]
pub struct EventCollector {
    filter: ChannelFilter,
    events: Vec<Event>,
}

impl EventCollector {
    pub fn new(filter: ChannelFilter) -> Self {
        Self {
            filter,
            events: Vec::new(),
        }
    }

    /// Record `seconds` of time passing
    pub fn log_delay(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        match self.events.last_mut() {
            Some(last) if !last.has_notes() => {
                last.delay += seconds;
                last.timestamp += seconds;
            }
            _ => {
                let previous = self.previous_timestamp();
                self.events.push(Event::new(seconds, previous));
            }
        }
    }

    pub fn log_note_on(&mut self, pitch: u8, channel: u8, velocity: u8) {
        if !self.filter.allows(channel) {
            return;
        }
        let event = self.ensure_event();
        let timestamp = event.timestamp;
        event.notes_on.push(Note {
            pitch,
            channel,
            velocity,
            timestamp,
        });
    }

    pub fn log_note_off(&mut self, pitch: u8, channel: u8) {
        if !self.filter.allows(channel) {
            return;
        }
        let event = self.ensure_event();
        let timestamp = event.timestamp;
        event.notes_off.push(Note {
            pitch,
            channel,
            velocity: 0,
            timestamp,
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    fn ensure_event(&mut self) -> &mut Event {
        if self.events.is_empty() {
            self.events.push(Event::new(0.0, 0.0));
        }
        let last = self.events.len() - 1;
        &mut self.events[last]
    }

    fn previous_timestamp(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.timestamp)
    }
}
