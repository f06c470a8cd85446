//! Real-time scheduler
//!
//! Applies decoded commands to an actuator strictly in stream order. Delay
//! commands advance a deadline that is kept independent of how late each
//! wait actually returned, so timing errors do not accumulate over a song.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::playback::actuator::{Actuator, SilenceGuard};
use crate::playback::clock::{ticks_diff, Clock};
use crate::playback::decoder::WordReader;
use crate::protocol::Command;

/// How the scheduler waits for a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Sleep in short slices, checking the deadline in between
    Sleep,
    /// Spin on the clock; for targets whose sleep is unreliable
    Spin,
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub wait: WaitStrategy,
    /// Longest single sleep, bounding how late a cancellation is noticed
    pub poll_ms: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait: WaitStrategy::Sleep,
            poll_ms: 1,
        }
    }
}

/// How a playback run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { words: usize },
    Cancelled { words: usize },
}

/// Playback errors
#[derive(Debug)]
pub enum PlaybackError {
    Io(io::Error),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::Io(e) => write!(f, "Read failed: {}", e),
        }
    }
}

impl std::error::Error for PlaybackError {}

impl From<io::Error> for PlaybackError {
    fn from(e: io::Error) -> Self {
        PlaybackError::Io(e)
    }
}

/// Drives an actuator from a command stream
pub struct Scheduler<A: Actuator, C: Clock> {
    config: SchedulerConfig,
    actuator: A,
    clock: C,
    stop: Arc<AtomicBool>,
}

impl<A: Actuator, C: Clock> Scheduler<A, C> {
    pub fn new(config: SchedulerConfig, actuator: A, clock: C) -> Self {
        Self {
            config,
            actuator,
            clock,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels playback when set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn into_actuator(self) -> A {
        self.actuator
    }

    /// Play a byte stream to its end
    pub fn play<R: Read>(&mut self, reader: R) -> Result<PlaybackOutcome, PlaybackError> {
        self.play_words(WordReader::new(reader))
    }

    /// Play a sequence of words
    ///
    /// The actuator is silenced on every return path.
    pub fn play_words<I>(&mut self, words: I) -> Result<PlaybackOutcome, PlaybackError>
    where
        I: IntoIterator<Item = io::Result<u16>>,
    {
        let Self {
            config,
            actuator,
            clock,
            stop,
        } = self;
        let mut actuator = SilenceGuard::new(actuator);
        let mut deadline = clock.now_ms();
        let mut count = 0;

        for word in words {
            if stop.load(Ordering::SeqCst) {
                return Ok(PlaybackOutcome::Cancelled { words: count });
            }
            let command = Command::decode(word?);
            count += 1;

            match command {
                Command::NoteOn { voice, frequency } => {
                    let voice = voice as usize;
                    if voice >= actuator.voices() {
                        warn!("skipping note-on for voice {} (have {})", voice, actuator.voices());
                        continue;
                    }
                    if let Err(e) = actuator.play(voice, frequency) {
                        warn!("{}; stopping voice instead", e);
                        actuator.stop(voice);
                    }
                }
                Command::Delay { ms } => {
                    deadline = deadline.wrapping_add(ms as u32);
                    if !wait_until(config, clock, stop, deadline) {
                        debug!("cancelled after {} words", count);
                        return Ok(PlaybackOutcome::Cancelled { words: count });
                    }
                }
                Command::NotesOff { mask } => {
                    let voices = actuator.voices();
                    for voice in Command::mask_voices(mask).filter(|v| *v < voices) {
                        actuator.stop(voice);
                    }
                }
            }
        }

        Ok(PlaybackOutcome::Completed { words: count })
    }
}

/// Wait for `deadline`; false if cancelled first
fn wait_until<C: Clock>(
    config: &SchedulerConfig,
    clock: &mut C,
    stop: &AtomicBool,
    deadline: u32,
) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = ticks_diff(deadline, clock.now_ms());
        if remaining <= 0 {
            return true;
        }
        match config.wait {
            WaitStrategy::Sleep => clock.pause((remaining as u32).min(config.poll_ms.max(1))),
            WaitStrategy::Spin => std::hint::spin_loop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::actuator::ActuatorError;
    use crate::playback::clock::VirtualClock;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Play(u32, usize, u16),
        Stop(u32, usize),
        Silence(u32),
    }

    /// Records calls stamped with the shared virtual time
    struct Recorder {
        clock: VirtualClock,
        voices: usize,
        calls: Vec<Call>,
        refuse_above: u16,
    }

    impl Recorder {
        fn new(clock: &VirtualClock, voices: usize) -> Self {
            Self {
                clock: clock.clone(),
                voices,
                calls: Vec::new(),
                refuse_above: u16::MAX,
            }
        }
    }

    impl Actuator for Recorder {
        fn voices(&self) -> usize {
            self.voices
        }

        fn play(&mut self, voice: usize, frequency: u16) -> Result<(), ActuatorError> {
            if frequency > self.refuse_above {
                return Err(ActuatorError::UnsupportedFrequency { voice, frequency });
            }
            self.calls
                .push(Call::Play(self.clock.now_ms(), voice, frequency));
            Ok(())
        }

        fn stop(&mut self, voice: usize) {
            self.calls.push(Call::Stop(self.clock.now_ms(), voice));
        }

        fn silence(&mut self) {
            self.calls.push(Call::Silence(self.clock.now_ms()));
        }
    }

    fn ok(words: &[u16]) -> Vec<io::Result<u16>> {
        words.iter().map(|w| Ok(*w)).collect()
    }

    #[test]
    fn test_plays_in_order_with_delays() {
        let clock = VirtualClock::new();
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 4), clock.clone());
        let outcome = scheduler
            .play_words(ok(&[0x0106, 0x8000 | 250, 0x0800 | 330, 0x8000 | 100, 0xC003]))
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed { words: 5 });
        assert_eq!(
            scheduler.actuator().calls,
            vec![
                Call::Play(0, 0, 262),
                Call::Play(250, 1, 330),
                Call::Stop(350, 0),
                Call::Stop(350, 1),
                Call::Silence(350),
            ]
        );
    }

    #[test]
    fn test_deadline_survives_wraparound() {
        let clock = VirtualClock::starting_at(u32::MAX - 5);
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 1), clock.clone());
        scheduler
            .play_words(ok(&[0x8000 | 20, 0x0106]))
            .unwrap();
        assert_eq!(scheduler.actuator().calls[0], Call::Play(14, 0, 262));
    }

    #[test]
    fn test_chunked_delay_sums() {
        let clock = VirtualClock::new();
        let mut scheduler = Scheduler::new(
            SchedulerConfig {
                poll_ms: 1000,
                ..Default::default()
            },
            Recorder::new(&clock, 1),
            clock.clone(),
        );
        scheduler
            .play_words(ok(&[0xBFFF, 0x8E21]))
            .unwrap();
        assert_eq!(clock.now_ms(), 20_000);
    }

    #[test]
    fn test_refused_frequency_stops_voice() {
        let clock = VirtualClock::new();
        let mut recorder = Recorder::new(&clock, 2);
        recorder.refuse_above = 500;
        let mut scheduler = Scheduler::new(SchedulerConfig::default(), recorder, clock.clone());
        scheduler
            .play_words(ok(&[0x0800 | 600, 0x0106]))
            .unwrap();
        assert_eq!(
            scheduler.actuator().calls,
            vec![Call::Stop(0, 1), Call::Play(0, 0, 262), Call::Silence(0)]
        );
    }

    #[test]
    fn test_out_of_range_voice_skipped() {
        let clock = VirtualClock::new();
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 2), clock.clone());
        scheduler
            .play_words(ok(&[(5 << 11) | 262, 0xC000 | 0b100]))
            .unwrap();
        assert_eq!(scheduler.actuator().calls, vec![Call::Silence(0)]);
    }

    #[test]
    fn test_cancel_silences() {
        let clock = VirtualClock::new();
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 1), clock.clone());
        let stop = scheduler.stop_handle();
        stop.store(true, Ordering::SeqCst);
        let outcome = scheduler.play_words(ok(&[0x0106, 0x8000 | 100])).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Cancelled { words: 0 });
        assert_eq!(scheduler.actuator().calls, vec![Call::Silence(0)]);
    }

    /// Cancels playback once the clock passes a tick
    struct CancellingClock {
        inner: VirtualClock,
        at: u32,
        stop: Arc<AtomicBool>,
    }

    impl Clock for CancellingClock {
        fn now_ms(&self) -> u32 {
            self.inner.now_ms()
        }

        fn pause(&mut self, ms: u32) {
            self.inner.pause(ms);
            if self.inner.now_ms() >= self.at {
                self.stop.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_cancel_during_wait() {
        let clock = VirtualClock::new();
        let stop = Arc::new(AtomicBool::new(false));
        let cancelling = CancellingClock {
            inner: clock.clone(),
            at: 40,
            stop: stop.clone(),
        };
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 1), cancelling);
        scheduler.stop = stop;
        let outcome = scheduler
            .play_words(ok(&[0x0106, 0x8000 | 1000, 0x0106]))
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Cancelled { words: 2 });
        assert_eq!(
            scheduler.actuator().calls,
            vec![Call::Play(0, 0, 262), Call::Silence(40)]
        );
    }

    #[test]
    fn test_read_error_still_silences() {
        let clock = VirtualClock::new();
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 1), clock.clone());
        let words = vec![
            Ok(0x0106),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "link dropped")),
        ];
        assert!(scheduler.play_words(words).is_err());
        assert_eq!(
            scheduler.actuator().calls,
            vec![Call::Play(0, 0, 262), Call::Silence(0)]
        );
    }

    #[test]
    fn test_play_from_bytes() {
        let clock = VirtualClock::new();
        let mut scheduler =
            Scheduler::new(SchedulerConfig::default(), Recorder::new(&clock, 1), clock.clone());
        let outcome = scheduler.play(&[0x01, 0x06, 0x80, 0x0A, 0xC0][..]).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed { words: 2 });
        assert_eq!(clock.now_ms(), 10);
    }
}
