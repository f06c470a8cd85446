//! Wire protocol for the drive command stream
//!
//! The stream is a sequence of big-endian 16-bit words with no framing:
//!
//! ```text
//! note on:   0 V3 V2 V1 V0 FA F9 F8 F7 F6 F5 F4 F3 F2 F1 F0   (voice, frequency Hz)
//! delay:     1  0 DD DC DB DA D9 D8 D7 D6 D5 D4 D3 D2 D1 D0   (milliseconds)
//! notes off: 1  1  0  0 VB VA V9 V8 V7 V6 V5 V4 V3 V2 V1 V0   (voice mask)
//! ```

/// Most voices a stream can address (width of the notes-off mask)
pub const MAX_VOICES: usize = 12;

/// Largest delay a single word can carry
pub const MAX_DELAY_MS: u16 = 0x3FFF;

/// Largest frequency a note-on word can carry
pub const MAX_FREQUENCY: u16 = 0x7FF;

/// Lowest frequency the drives reproduce well
pub const MIN_BAND_HZ: f64 = 64.0;

/// Highest frequency the drives reproduce well
pub const MAX_BAND_HZ: f64 = 640.0;

const DELAY_TAG: u16 = 0x8000;
const NOTES_OFF_TAG: u16 = 0xC000;
const TAG_MASK: u16 = 0xC000;
const VOICE_MASK: u16 = 0x0FFF;

/// A single decoded protocol word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start (or retune) a voice
    NoteOn { voice: u8, frequency: u16 },
    /// Wait before the next command
    Delay { ms: u16 },
    /// Stop every voice whose bit is set
    NotesOff { mask: u16 },
}

impl Command {
    /// Pack the command into its 16-bit wire form
    ///
    /// Fields wider than their slot are masked; callers validate ranges
    /// before building commands.
    pub fn encode(self) -> u16 {
        match self {
            Command::NoteOn { voice, frequency } => {
                ((voice as u16 & 0xF) << 11) | (frequency & MAX_FREQUENCY)
            }
            Command::Delay { ms } => DELAY_TAG | (ms & MAX_DELAY_MS),
            Command::NotesOff { mask } => NOTES_OFF_TAG | (mask & VOICE_MASK),
        }
    }

    /// Unpack a 16-bit word
    pub fn decode(word: u16) -> Command {
        if word & 0x8000 == 0 {
            Command::NoteOn {
                voice: ((word & 0x7800) >> 11) as u8,
                frequency: word & MAX_FREQUENCY,
            }
        } else if word & TAG_MASK == DELAY_TAG {
            Command::Delay {
                ms: word & MAX_DELAY_MS,
            }
        } else {
            Command::NotesOff {
                mask: word & VOICE_MASK,
            }
        }
    }

    /// Iterate the voices selected by a notes-off mask
    pub fn mask_voices(mask: u16) -> impl Iterator<Item = usize> {
        (0..MAX_VOICES).filter(move |v| mask & (1 << v) != 0)
    }
}

/// Split a delay into words of at most `MAX_DELAY_MS`
///
/// A zero remainder produces no trailing word, so a zero delay produces
/// nothing at all.
pub fn delay_commands(total_ms: u64) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut remaining = total_ms;
    while remaining > MAX_DELAY_MS as u64 {
        commands.push(Command::Delay { ms: MAX_DELAY_MS });
        remaining -= MAX_DELAY_MS as u64;
    }
    if remaining > 0 {
        commands.push(Command::Delay {
            ms: remaining as u16,
        });
    }
    commands
}

/// Frequency for a MIDI pitch, folded by octaves into the drive band
///
/// Formula: f = 440 * 2^((pitch - 69) / 12), halved while above 640 Hz and
/// doubled while below 64 Hz, then rounded to the nearest Hz.
pub fn note_frequency(pitch: u8) -> u16 {
    let mut freq = 440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0);
    while freq > MAX_BAND_HZ {
        freq /= 2.0;
    }
    while freq < MIN_BAND_HZ {
        freq *= 2.0;
    }
    let rounded = freq.round() as u16;
    debug_assert!(rounded <= MAX_FREQUENCY, "folded frequency {rounded} Hz");
    rounded
}

/// Write one word big-endian
pub fn write_word<W: std::io::Write>(out: &mut W, word: u16) -> std::io::Result<()> {
    out.write_all(&word.to_be_bytes())
}
