//! Piano-roll plot of a drive command stream
//!
//! Usage: plot-stream <input.bin> <output.svg>

use drivetone::playback::{decode_bytes, timeline, Timeline};
use plotters::prelude::*;

const VOICE_COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

struct Args {
    input_path: String,
    output_path: String,
}

fn print_usage() {
    eprintln!("Usage: plot-stream <input.bin> <output.svg>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  plot-stream song.bin song.svg");
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 {
        print_usage();
        return Err("Invalid number of arguments".into());
    }

    Ok(Args {
        input_path: args[1].clone(),
        output_path: args[2].clone(),
    })
}

fn create_plot(args: &Args, timeline: &Timeline) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(&args.output_path, (1200, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_time = (timeline.duration_ms as f32 / 1000.0).max(0.001);
    let max_freq = timeline
        .spans
        .iter()
        .map(|s| s.frequency)
        .max()
        .unwrap_or(640) as f32
        * 1.1;

    let title = format!(
        "{}: {} notes on {} voices, {:.1}s",
        args.input_path,
        timeline.spans.len(),
        timeline.voice_count(),
        max_time
    );

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f32..max_time, 0f32..max_freq)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Frequency (Hz)")
        .x_labels(10)
        .y_labels(10)
        .draw()?;

    // One horizontal segment per sounding note
    for span in &timeline.spans {
        let color = VOICE_COLORS[span.voice % VOICE_COLORS.len()];
        let freq = span.frequency as f32;
        chart.draw_series(LineSeries::new(
            [
                (span.start_ms as f32 / 1000.0, freq),
                (span.end_ms as f32 / 1000.0, freq),
            ],
            color.stroke_width(3),
        ))?;
    }

    root.present()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    println!("Stream Plot Generator");
    println!("=====================");

    let bytes = std::fs::read(&args.input_path)?;
    if bytes.len() % 2 != 0 {
        println!("  Ignoring trailing odd byte");
    }
    let timeline = timeline(decode_bytes(&bytes));
    println!("  Words: {}", bytes.len() / 2);
    println!("  Notes: {}", timeline.spans.len());
    println!("  Voices: {}", timeline.voice_count());
    println!("  Duration: {:.1}s", timeline.duration_ms as f64 / 1000.0);

    print!("  Creating plot... ");
    create_plot(&args, &timeline)?;
    println!("done");

    println!();
    println!("Output: {}", args.output_path);

    Ok(())
}
