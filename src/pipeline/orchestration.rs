//! Fixed orchestration
//!
//! Each voice lists the channels it may render, in priority order. A
//! selector's sign picks the top (positive) or bottom (negative) note of a
//! chord on that channel. Loaded from JSON:
//!
//! ```json
//! { "voices": [[1, -3], [2], [-3]] }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::allocator::{Allocation, VoiceAllocator};
use crate::pipeline::collector::{ChannelFilter, Event, Note};
use crate::protocol::MAX_VOICES;

/// Which note of a chord a selector picks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Highest,
    Lowest,
}

/// A channel plus which end of its chord to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Selector {
    pub channel: u8,
    pub extremum: Extremum,
}

impl Selector {
    pub fn highest(channel: u8) -> Self {
        Self {
            channel,
            extremum: Extremum::Highest,
        }
    }

    pub fn lowest(channel: u8) -> Self {
        Self {
            channel,
            extremum: Extremum::Lowest,
        }
    }

    /// Pick this selector's note from the notes held on its channel
    fn choose<'a>(&self, held: &'a [Note]) -> Option<&'a Note> {
        match self.extremum {
            Extremum::Highest => held.iter().max_by_key(|n| n.pitch),
            Extremum::Lowest => held.iter().min_by_key(|n| n.pitch),
        }
    }
}

impl TryFrom<i16> for Selector {
    type Error = OrchestrationError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        let channel = u8::try_from(value.unsigned_abs())
            .ok()
            .filter(|c| *c != 0)
            .ok_or(OrchestrationError::InvalidSelector(value))?;
        Ok(if value > 0 {
            Selector::highest(channel)
        } else {
            Selector::lowest(channel)
        })
    }
}

impl From<Selector> for i16 {
    fn from(selector: Selector) -> i16 {
        match selector.extremum {
            Extremum::Highest => selector.channel as i16,
            Extremum::Lowest => -(selector.channel as i16),
        }
    }
}

/// Orchestration errors
#[derive(Debug)]
pub enum OrchestrationError {
    InvalidSelector(i16),
    InvalidVoiceCount(usize),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationError::InvalidSelector(v) => {
                write!(f, "Invalid selector {}: channel must be non-zero", v)
            }
            OrchestrationError::InvalidVoiceCount(n) => {
                write!(f, "Invalid voice count {}: expected 1-{}", n, MAX_VOICES)
            }
            OrchestrationError::Json(e) => write!(f, "Invalid orchestration JSON: {}", e),
            OrchestrationError::Io(e) => write!(f, "Cannot read orchestration: {}", e),
        }
    }
}

impl std::error::Error for OrchestrationError {}

impl From<serde_json::Error> for OrchestrationError {
    fn from(e: serde_json::Error) -> Self {
        OrchestrationError::Json(e)
    }
}

impl From<std::io::Error> for OrchestrationError {
    fn from(e: std::io::Error) -> Self {
        OrchestrationError::Io(e)
    }
}

/// Per-voice selector lists, highest priority first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orchestration {
    pub voices: Vec<Vec<Selector>>,
}

impl Orchestration {
    pub fn new(voices: Vec<Vec<Selector>>) -> Result<Self, OrchestrationError> {
        let orchestration = Self { voices };
        orchestration.validate()?;
        Ok(orchestration)
    }

    pub fn from_json(text: &str) -> Result<Self, OrchestrationError> {
        let orchestration: Orchestration = serde_json::from_str(text)?;
        orchestration.validate()?;
        Ok(orchestration)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestrationError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), OrchestrationError> {
        if self.voices.is_empty() || self.voices.len() > MAX_VOICES {
            return Err(OrchestrationError::InvalidVoiceCount(self.voices.len()));
        }
        Ok(())
    }

    /// Every channel named by some voice
    pub fn channels(&self) -> BTreeSet<u8> {
        self.voices.iter().flatten().map(|s| s.channel).collect()
    }

    /// Collector filter admitting only orchestrated channels
    pub fn channel_filter(&self) -> ChannelFilter {
        ChannelFilter::Include(self.channels())
    }
}

/// Strategy B: every voice follows its orchestration
pub struct OrchestratedAllocator {
    orchestration: Orchestration,
    /// Notes currently held, per channel
    held: BTreeMap<u8, Vec<Note>>,
    /// What each voice sounds
    sounding: Vec<Option<Note>>,
}

impl OrchestratedAllocator {
    pub fn new(orchestration: Orchestration) -> Self {
        let held = orchestration
            .channels()
            .into_iter()
            .map(|c| (c, Vec::new()))
            .collect();
        let sounding = vec![None; orchestration.voices.len()];
        Self {
            orchestration,
            held,
            sounding,
        }
    }

    pub fn sounding(&self, voice: usize) -> Option<&Note> {
        self.sounding.get(voice).and_then(|n| n.as_ref())
    }

    fn update_held(&mut self, event: &Event) {
        for off in &event.notes_off {
            if let Some(notes) = self.held.get_mut(&off.channel) {
                notes.retain(|n| !n.same_key(off));
            }
        }
        for on in &event.notes_on {
            if let Some(notes) = self.held.get_mut(&on.channel) {
                notes.retain(|n| !n.same_key(on));
                notes.push(*on);
            }
        }
    }

    fn target(&self, voice: usize) -> Option<Note> {
        self.orchestration.voices[voice].iter().find_map(|selector| {
            let held = self.held.get(&selector.channel)?;
            selector.choose(held).copied()
        })
    }
}

impl VoiceAllocator for OrchestratedAllocator {
    fn voices(&self) -> usize {
        self.sounding.len()
    }

    fn allocate(&mut self, event: &Event) -> Allocation {
        self.update_held(event);

        let mut allocation = Allocation::default();
        for voice in 0..self.sounding.len() {
            let target = self.target(voice);
            let current = self.sounding[voice];
            match (target, current) {
                (Some(next), current) => {
                    let struck_now = event.notes_on.iter().any(|n| n.same_key(&next));
                    let unchanged = current.is_some_and(|c| c.same_key(&next));
                    if struck_now || !unchanged {
                        self.sounding[voice] = Some(next);
                        allocation.start(voice, next);
                    }
                }
                (None, Some(_)) => {
                    self.sounding[voice] = None;
                    allocation.stop_mask |= 1 << voice;
                }
                (None, None) => {}
            }
        }
        allocation
    }
}
