//! CLI tool for converting a MIDI file into a drive command stream
//!
//! Usage: encode <input.mid> <output.bin|-> [options]

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};

use drivetone::midi::MidiSong;
use drivetone::pipeline::{
    AffinityConfig, EventCollector, Orchestration, ProtocolEncoder, Strategy,
};

const USAGE: &str = "Usage: encode <input.mid> <output.bin|-> [options]

Convert a MIDI file into a drive command stream.

Arguments:
  input.mid      MIDI file to convert
  output.bin     Output stream, or - to write to stdout

Options:
  -d, --drives <N>                  Number of drives to target (default 4)
  -p, --prioritize-channels <CH>..  Channels placed first and never preempted
                                    (default: channels of tracks named melody/vocals)
  -x, --exclude-channels <CH>..     Channels left out of the output
  -o, --orchestration <FILE>        Per-drive channel lists (JSON); overrides the above

Examples:
  encode song.mid song.bin
  encode song.mid song.bin -d 3 -p 1 -x 4 5
";

struct Args {
    input_path: String,
    output_path: String,
    drives: usize,
    priority: Option<BTreeSet<u8>>,
    excluded: BTreeSet<u8>,
    orchestration: Option<String>,
}

fn parse_channels(
    args: &[String],
    i: &mut usize,
) -> Result<BTreeSet<u8>, Box<dyn std::error::Error>> {
    let mut channels = BTreeSet::new();
    while let Some(value) = args.get(*i + 1).filter(|a| !a.starts_with('-')) {
        channels.insert(value.parse::<u8>()?);
        *i += 1;
    }
    Ok(channels)
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut positional = Vec::new();
    let mut parsed = Args {
        input_path: String::new(),
        output_path: String::new(),
        drives: 4,
        priority: None,
        excluded: BTreeSet::new(),
        orchestration: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--drives" => {
                i += 1;
                parsed.drives = args.get(i).ok_or("--drives requires a value")?.parse()?;
            }
            "-p" | "--prioritize-channels" => {
                parsed.priority = Some(parse_channels(&args, &mut i)?);
            }
            "-x" | "--exclude-channels" => {
                parsed.excluded = parse_channels(&args, &mut i)?;
            }
            "-o" | "--orchestration" => {
                i += 1;
                parsed.orchestration =
                    Some(args.get(i).ok_or("--orchestration requires a file")?.clone());
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            "-" => positional.push(args[i].clone()),
            other if other.starts_with('-') => {
                eprintln!("{}", USAGE);
                return Err(format!("Unknown option: {}", other).into());
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    if positional.len() != 2 {
        eprintln!("{}", USAGE);
        return Err("Expected an input and an output path".into());
    }
    parsed.output_path = positional.pop().unwrap_or_default();
    parsed.input_path = positional.pop().unwrap_or_default();
    Ok(parsed)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = parse_args()?;

    let song = MidiSong::parse(&fs::read(&args.input_path)?)?;

    let strategy = match &args.orchestration {
        Some(path) => Strategy::Orchestrated(Orchestration::load(path)?),
        None => {
            let priority_channels = match args.priority {
                Some(channels) => channels,
                None => {
                    let melody = song.melody_channels().clone();
                    if !melody.is_empty() {
                        eprintln!(
                            "{}: prioritized melody channels {:?}",
                            args.input_path, melody
                        );
                    }
                    melody
                }
            };
            Strategy::ChannelAffinity(AffinityConfig {
                voices: args.drives,
                priority_channels,
                excluded_channels: args.excluded,
            })
        }
    };

    let mut collector = EventCollector::new(strategy.channel_filter());
    song.feed(&mut collector);
    let events = collector.into_events();
    let event_count = events.len();

    let mut encoder = ProtocolEncoder::from_strategy(strategy)?;
    let stats = if args.output_path == "-" {
        let stdout = io::stdout();
        let mut out = io::BufWriter::new(stdout.lock());
        let stats = encoder.write_events(events, &mut out)?;
        out.flush()?;
        stats
    } else {
        let mut out = io::BufWriter::new(fs::File::create(&args.output_path)?);
        encoder.write_events(events, &mut out)?
    };

    // stdout may carry the stream, so report on stderr
    eprintln!("Encoded {}:", args.input_path);
    eprintln!("  Duration: {:.1}s", song.duration());
    eprintln!("  Events: {} ({} written)", event_count, stats.events);
    eprintln!("  Words: {} ({} bytes)", stats.words, stats.words * 2);
    eprintln!(
        "  Notes: {} placed, {} dropped",
        stats.notes_placed, stats.notes_dropped
    );
    if args.output_path != "-" {
        eprintln!("✓ Wrote {}", args.output_path);
    }

    Ok(())
}
