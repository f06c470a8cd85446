//! CLI tool for playing a drive command stream
//!
//! Usage: play <input.bin> [options]
//!
//! Without hardware attached, every actuator call is logged (set RUST_LOG=info
//! to see them). Ctrl+C stops playback and silences all voices.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::Ordering;

use drivetone::playback::{
    decode_bytes, timeline, Actuator, Clock, LogActuator, PlaybackOutcome, Scheduler,
    SchedulerConfig, SystemClock, VirtualClock, WaitStrategy,
};
use drivetone::protocol::MAX_VOICES;
use drivetone::wav::save_preview;

const USAGE: &str = "Usage: play <input.bin> [options]

Play a drive command stream.

Arguments:
  input.bin      Stream produced by encode

Options:
  --voices <N>   Voices available to the player (default 4, max 12)
  --spin         Busy-wait for deadlines instead of sleeping
  --dry-run      Run through the stream without waiting
  --wav <FILE>   Render a square-wave preview instead of playing
  --rate <HZ>    Preview sample rate (default 44100)

Examples:
  play song.bin
  play song.bin --wav song.wav
";

struct Args {
    input_path: String,
    voices: usize,
    spin: bool,
    dry_run: bool,
    wav_path: Option<String>,
    sample_rate: u32,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        input_path: String::new(),
        voices: 4,
        spin: false,
        dry_run: false,
        wav_path: None,
        sample_rate: 44100,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--voices" => {
                i += 1;
                parsed.voices = args.get(i).ok_or("--voices requires a value")?.parse()?;
            }
            "--spin" => parsed.spin = true,
            "--dry-run" => parsed.dry_run = true,
            "--wav" => {
                i += 1;
                parsed.wav_path = Some(args.get(i).ok_or("--wav requires a file")?.clone());
            }
            "--rate" => {
                i += 1;
                parsed.sample_rate = args.get(i).ok_or("--rate requires a value")?.parse()?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if other.starts_with('-') || !parsed.input_path.is_empty() => {
                eprintln!("{}", USAGE);
                return Err(format!("Unexpected argument: {}", other).into());
            }
            path => parsed.input_path = path.to_string(),
        }
        i += 1;
    }

    if parsed.input_path.is_empty() {
        eprintln!("{}", USAGE);
        return Err("Missing input stream".into());
    }
    if parsed.voices == 0 || parsed.voices > MAX_VOICES {
        return Err(format!("--voices must be between 1 and {}", MAX_VOICES).into());
    }
    Ok(parsed)
}

fn run<A: Actuator, C: Clock>(
    mut scheduler: Scheduler<A, C>,
    input_path: &str,
) -> Result<PlaybackOutcome, Box<dyn std::error::Error>> {
    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    let reader = BufReader::new(File::open(input_path)?);
    Ok(scheduler.play(reader)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = parse_args()?;

    if let Some(wav_path) = &args.wav_path {
        let bytes = std::fs::read(&args.input_path)?;
        let timeline = timeline(decode_bytes(&bytes));
        println!(
            "Rendering {} spans ({:.1}s)...",
            timeline.spans.len(),
            timeline.duration_ms as f64 / 1000.0
        );
        save_preview(wav_path, &timeline, args.sample_rate)?;
        println!("✓ Generated {}", wav_path);
        return Ok(());
    }

    println!("Playing {} on {} voices", args.input_path, args.voices);
    let actuator = LogActuator::new(args.voices);
    let config = SchedulerConfig {
        // the virtual clock only moves while sleeping
        wait: if args.spin && !args.dry_run {
            WaitStrategy::Spin
        } else {
            WaitStrategy::Sleep
        },
        ..Default::default()
    };

    let outcome = if args.dry_run {
        run(Scheduler::new(config, actuator, VirtualClock::new()), &args.input_path)?
    } else {
        run(Scheduler::new(config, actuator, SystemClock::new()), &args.input_path)?
    };

    match outcome {
        PlaybackOutcome::Completed { words } => println!("✓ Played {} words", words),
        PlaybackOutcome::Cancelled { words } => println!("Stopped after {} words", words),
    }
    Ok(())
}
