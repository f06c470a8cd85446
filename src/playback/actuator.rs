//! Actuator boundary
//!
//! Whatever turns (voice, frequency) into sound: stepper drives on real
//! hardware, a log on a workstation, a recorder in tests.

use std::ops::{Deref, DerefMut, RangeInclusive};

use log::info;

use crate::protocol::{MAX_FREQUENCY, MAX_VOICES};

/// Actuator failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// The voice cannot be driven at this frequency
    UnsupportedFrequency { voice: usize, frequency: u16 },
}

impl std::fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorError::UnsupportedFrequency { voice, frequency } => {
                write!(f, "Voice {} cannot play {} Hz", voice, frequency)
            }
        }
    }
}

impl std::error::Error for ActuatorError {}

/// Tone-producing voices driven by the scheduler
pub trait Actuator {
    /// Number of voices; higher indices are never addressed
    fn voices(&self) -> usize;

    /// Start or retune `voice`
    fn play(&mut self, voice: usize, frequency: u16) -> Result<(), ActuatorError>;

    fn stop(&mut self, voice: usize);

    /// Stop every voice
    fn silence(&mut self) {
        for voice in 0..self.voices() {
            self.stop(voice);
        }
    }
}

/// Silences the wrapped actuator when dropped
///
/// Holds for every way out of playback: normal return, cancellation, an
/// error propagated with `?`, or a panic unwinding through the loop.
pub struct SilenceGuard<'a, A: Actuator + ?Sized> {
    actuator: &'a mut A,
}

impl<'a, A: Actuator + ?Sized> SilenceGuard<'a, A> {
    pub fn new(actuator: &'a mut A) -> Self {
        Self { actuator }
    }
}

impl<A: Actuator + ?Sized> Deref for SilenceGuard<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.actuator
    }
}

impl<A: Actuator + ?Sized> DerefMut for SilenceGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.actuator
    }
}

impl<A: Actuator + ?Sized> Drop for SilenceGuard<'_, A> {
    fn drop(&mut self) {
        self.actuator.silence();
    }
}

/// Actuator that reports calls through `log`
///
/// Tracks what each voice is sounding and refuses frequencies outside its
/// band, which is how a drive refuses a step rate it cannot divide down to.
#[derive(Debug, Clone)]
pub struct LogActuator {
    band: RangeInclusive<u16>,
    sounding: Vec<Option<u16>>,
}

impl LogActuator {
    pub fn new(voices: usize) -> Self {
        Self::with_band(voices, 1..=MAX_FREQUENCY)
    }

    pub fn with_band(voices: usize, band: RangeInclusive<u16>) -> Self {
        Self {
            band,
            sounding: vec![None; voices.min(MAX_VOICES)],
        }
    }

    /// Frequency `voice` is sounding, if any
    pub fn sounding(&self, voice: usize) -> Option<u16> {
        self.sounding.get(voice).copied().flatten()
    }
}

impl Actuator for LogActuator {
    fn voices(&self) -> usize {
        self.sounding.len()
    }

    fn play(&mut self, voice: usize, frequency: u16) -> Result<(), ActuatorError> {
        if !self.band.contains(&frequency) {
            return Err(ActuatorError::UnsupportedFrequency { voice, frequency });
        }
        info!("voice {} -> {} Hz", voice, frequency);
        self.sounding[voice] = Some(frequency);
        Ok(())
    }

    fn stop(&mut self, voice: usize) {
        if self.sounding[voice].take().is_some() {
            info!("voice {} off", voice);
        }
    }

    fn silence(&mut self) {
        info!("silence");
        self.sounding.iter_mut().for_each(|s| *s = None);
    }
}
