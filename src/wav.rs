//! Preview rendering to WAV
//!
//! Renders a stream's timeline with square-wave voices and writes mono
//! 16-bit PCM, so a song can be auditioned without any drives attached.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::generator::{SignalGenerator, SquareGenerator};
use crate::playback::timeline::Timeline;

/// Samples per generator call
const FRAME_SIZE: usize = 64;

/// Mix every span of `timeline` into one mono buffer
///
/// Each voice gets an equal share of full scale so the mix never clips.
pub fn render_timeline(timeline: &Timeline, sample_rate: u32) -> Vec<f32> {
    let to_samples = |ms: u64| (ms * sample_rate as u64 / 1000) as usize;
    let mut mix = vec![0.0f32; to_samples(timeline.duration_ms)];
    let amplitude = 1.0 / timeline.voice_count().max(1) as f32;
    let mut frame = [0.0f32; FRAME_SIZE];

    for span in &timeline.spans {
        let start = to_samples(span.start_ms).min(mix.len());
        let end = to_samples(span.end_ms).min(mix.len());
        let mut tone = SquareGenerator::new(span.frequency, amplitude, end - start, sample_rate);

        for chunk in mix[start..end].chunks_mut(FRAME_SIZE) {
            tone.process(&mut frame[..chunk.len()]);
            for (out, sample) in chunk.iter_mut().zip(frame.iter()) {
                *out += sample;
            }
        }
    }

    mix
}

/// Write mono 16-bit PCM WAV data to `out`
///
/// # Arguments
/// * `out` - Destination
/// * `samples` - Audio samples (f32, range [-1.0, 1.0], clamped)
/// * `sample_rate` - Sample rate in Hz
pub fn write_wav_16bit<W: Write>(out: &mut W, samples: &[f32], sample_rate: u32) -> io::Result<()> {
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;
    let data_size = samples.len() as u32 * block_align as u32;

    out.write_all(b"RIFF")?;
    out.write_all(&(36 + data_size).to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?; // PCM
    out.write_all(&num_channels.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&bits_per_sample.to_le_bytes())?;

    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())?;
    for &sample in samples {
        out.write_all(&to_i16(sample).to_le_bytes())?;
    }
    out.flush()
}

/// Render `timeline` and save it as a WAV file
pub fn save_preview(path: impl AsRef<Path>, timeline: &Timeline, sample_rate: u32) -> io::Result<()> {
    let samples = render_timeline(timeline, sample_rate);
    let mut out = BufWriter::new(File::create(path)?);
    write_wav_16bit(&mut out, &samples, sample_rate)
}

fn to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32) as i16
    } else {
        // -1.0 must reach i16::MIN
        (clamped * -(i16::MIN as f32)) as i16
    }
}
