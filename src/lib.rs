//! Drive music: encode note streams for a handful of tone-producing drives
//! and replay the resulting command stream with millisecond timing.

pub mod generator;
pub mod midi;
pub mod pipeline;
pub mod playback;
pub mod protocol;
pub mod wav;
