// MidiGen CLI: prompt(s) in, Standard MIDI Files out.
//
// Builds one pipeline from the config file (if any) plus flag overrides and
// runs every prompt through it, in parallel when there are several. Each
// result is written as a `.mid` file and summarized on stdout along with
// its quality report.
//
// Usage:
//   midigen "lofi beat in D minor" ["4 minute ambient piece at 90 BPM" ...]
//     [--output DIR|FILE.mid] [--seed N] [--config FILE]
//     [--llm-endpoint URL] [--model NAME] [--offline]
//
// Logging goes through `tracing`; set RUST_LOG to change the level
// (default `info`).

use clap::Parser;
use midigen::config::PipelineConfig;
use midigen::error::PipelineError;
use midigen::pipeline::{Pipeline, PipelineOutput};
use midigen::types::{note_name, pitch_class_name};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "midigen")]
#[command(about = "Generate multi-track MIDI from a text description")]
#[command(version)]
struct Args {
    /// Description(s) of the music to generate
    #[arg(required = true)]
    prompts: Vec<String>,

    /// Output directory, or a .mid file path when there is one prompt
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Base seed (defaults to a hash of each prompt)
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON config file
    #[arg(short, long, env = "MIDIGEN_CONFIG")]
    config: Option<PathBuf>,

    /// OpenAI-compatible endpoint for intent extraction
    #[arg(long, env = "MIDIGEN_LLM_ENDPOINT")]
    llm_endpoint: Option<String>,

    /// Model name for the endpoint
    #[arg(long)]
    model: Option<String>,

    /// Never call a language model; use keyword extraction only
    #[arg(long)]
    offline: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// Load the config file and apply flag overrides.
fn build_config(args: &Args) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(endpoint) = &args.llm_endpoint {
        config.llm.endpoint = Some(endpoint.clone());
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if args.offline {
        config.llm.endpoint = None;
    }
    config.validate()?;
    Ok(config)
}

/// Returns whether every prompt succeeded.
fn run(args: &Args) -> Result<bool, PipelineError> {
    let config = build_config(args)?;
    let gateway = config.build_gateway()?;
    let pipeline = Pipeline::new(config, gateway)?;

    let single_file = args.prompts.len() == 1
        && args.output.extension().is_some_and(|e| e.eq_ignore_ascii_case("mid"));
    if !single_file {
        std::fs::create_dir_all(&args.output)?;
    }

    println!("=== MidiGen ===");
    let results = pipeline.run_many(args.prompts.as_slice());
    let mut all_ok = true;
    let numbered = args.prompts.len() > 1;
    for (index, (prompt, result)) in args.prompts.iter().zip(results).enumerate() {
        println!();
        println!("Prompt: {prompt}");
        match result {
            Ok(output) => {
                let path = if single_file {
                    args.output.clone()
                } else {
                    args.output.join(file_name_for(prompt, numbered.then_some(index + 1)))
                };
                std::fs::write(&path, &output.midi_bytes)?;
                print_summary(&output, &path);
            }
            Err(err) => {
                all_ok = false;
                println!("  FAILED: {err}");
            }
        }
    }
    Ok(all_ok)
}

/// A file name derived from the prompt: lowercase words joined by
/// underscores, at most 48 characters. In a batch the prompt's position is
/// appended so prompts sharing a prefix never overwrite each other.
fn file_name_for(prompt: &str, position: Option<usize>) -> String {
    let slug: String = prompt
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    let mut slug: String = slug.chars().take(48).collect();
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    let slug = slug.trim_end_matches('_');
    match position {
        Some(n) => format!("{slug}_{n:02}.mid"),
        None => format!("{slug}.mid"),
    }
}

fn print_summary(output: &PipelineOutput, path: &Path) {
    let intent = &output.intent;
    println!(
        "  {} | {} {} | {} BPM | {} | {} bars ({:.0}s) | energy {}",
        intent.genre,
        pitch_class_name(intent.key),
        intent.scale,
        intent.tempo_bpm,
        intent.time_signature,
        intent.duration_bars,
        intent.duration_seconds(),
        intent.energy,
    );
    for track in &output.track_summaries {
        let span = match track.pitch_span {
            Some((low, high)) => format!("{}-{}", note_name(low), note_name(high)),
            None => "silent".to_string(),
        };
        println!(
            "    ch {:>2}  prog {:>3}  {:<28} {:>5} notes  {}",
            track.channel, track.program, track.name, track.note_count, span
        );
    }
    let report = &output.report;
    println!(
        "  Quality {:.3} (technical {:.2}, coherence {:.2}, creativity {:.2}, intent {:.2}) after {} pass(es)",
        report.overall,
        report.technical,
        report.coherence,
        report.creativity,
        report.intent_match,
        output.generation_passes
    );
    for issue in &report.issues {
        println!("    [{:?}] {}", issue.severity, issue.message);
    }
    println!("  Seed {}; wrote {} ({} bytes)", output.seed, path.display(), output.midi_bytes.len());
}
