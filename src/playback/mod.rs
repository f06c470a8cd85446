//! Playback of the command stream
//!
//! - Decoder: bytes to protocol words
//! - Scheduler: apply words to an actuator on time
//! - Timeline: offline view of a stream for plots and previews

pub mod actuator;
pub mod clock;
pub mod decoder;
pub mod scheduler;
pub mod timeline;

pub use actuator::{Actuator, ActuatorError, LogActuator, SilenceGuard};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use decoder::{decode_bytes, WordReader};
pub use scheduler::{PlaybackError, PlaybackOutcome, Scheduler, SchedulerConfig, WaitStrategy};
pub use timeline::{timeline, Span, Timeline};
