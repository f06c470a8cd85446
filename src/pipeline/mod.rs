//! Encoding pipeline
//!
//! Turns a chronological note stream into the drive command stream:
//! - Collector: coalesce note calls into timed Events
//! - Allocator: place notes on a fixed number of voices
//! - Encoder: serialize allocation decisions as protocol words

pub mod allocator;
pub mod collector;
pub mod encoder;
pub mod orchestration;

pub use allocator::{AffinityConfig, Allocation, ChannelAffinityAllocator, VoiceAllocator};
pub use collector::{ChannelFilter, Event, EventCollector, Note};
pub use encoder::{EncodeError, EncodeStats, ProtocolEncoder, Strategy};
pub use orchestration::{OrchestratedAllocator, Orchestration, OrchestrationError, Selector};
