use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use clap::{Parser, Subcommand};
use metronome_core::{
    interval_millis, parse_pattern, BeatSink, EngineConfig, Metronome, MetronomeError, TapOutcome,
};
use tracing_subscriber::EnvFilter;

fn main() -> metronome_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Interval { bpm } => {
            match interval_millis(bpm) {
                Some(ms) => println!("{ms}"),
                None => return Err(MetronomeError::msg("tempo must be above zero")),
            }
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> metronome_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None if args.legacy => EngineConfig::legacy(),
        None => EngineConfig::default(),
    };
    if let Some(bpm) = args.bpm {
        config.tempo.default_bpm = bpm;
    }
    if let Some(meter) = args.meter {
        config.meter.default = meter;
    }
    config.sound_enabled &= !args.no_sound;
    config.flash_enabled &= !args.no_flash;

    tracing::info!(config = ?args.config, legacy = args.legacy, "starting metronome");
    let metronome = Metronome::new(&config, TerminalSink::default())?;
    if let Some(pattern) = &args.pattern {
        metronome.set_pattern(parse_pattern(pattern)?)?;
    }
    metronome.start()?;

    match args.duration {
        Some(seconds) if seconds.is_finite() => {
            std::thread::sleep(Duration::from_secs_f64(seconds.clamp(0.0, 86_400.0)));
        }
        Some(seconds) => {
            return Err(MetronomeError::msg(format!("invalid duration {seconds}")));
        }
        None => {
            print_help();
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                if !handle_command(&metronome, line?.trim()) {
                    break;
                }
            }
        }
    }

    metronome.stop()
}

/// Applies one interactive command. Returns `false` when the user quits.
/// Refused requests are already logged by the engine and leave it running.
fn handle_command(metronome: &Metronome, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let outcome = match (words.next(), words.next()) {
        (Some("q"), _) => return false,
        (Some("+"), _) => metronome.step_bpm(true, false).map(drop),
        (Some("-"), _) => metronome.step_bpm(false, false).map(drop),
        (Some("++"), _) => metronome.step_bpm(true, true).map(drop),
        (Some("--"), _) => metronome.step_bpm(false, true).map(drop),
        (Some("bpm"), Some(value)) => match value.parse::<i64>() {
            Ok(bpm) => metronome.set_bpm(bpm).map(drop),
            Err(_) => Err(MetronomeError::msg(format!("`{value}` is not a tempo"))),
        },
        (Some("m+"), _) => metronome.change_meter(1).map(drop),
        (Some("m-"), _) => metronome.change_meter(-1).map(drop),
        (Some("t"), _) => metronome.tap().map(report_tap),
        (Some("b"), Some(value)) => match value.parse::<usize>() {
            Ok(beat) if beat > 0 => metronome.cycle_beat(beat - 1).map(drop),
            _ => Err(MetronomeError::msg(format!("`{value}` is not a beat number"))),
        },
        (Some("s"), _) => metronome
            .snapshot()
            .and_then(|snapshot| metronome.set_sound_enabled(!snapshot.sound_enabled)),
        (Some("f"), _) => metronome
            .snapshot()
            .and_then(|snapshot| metronome.set_flash_enabled(!snapshot.flash_enabled)),
        (Some("p"), _) => metronome.toggle().map(drop),
        (Some("?"), _) => metronome.snapshot().and_then(|snapshot| {
            let json = serde_json::to_string_pretty(&snapshot)?;
            println!("{json}");
            Ok(())
        }),
        (None, _) => Ok(()),
        _ => {
            print_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        tracing::warn!(%err, command = line, "command refused");
    }
    true
}

fn report_tap(outcome: TapOutcome) {
    match outcome {
        TapOutcome::Collecting { taps } => println!("tap {taps}"),
        TapOutcome::Estimated { bpm } => println!("tapped tempo: {bpm} bpm"),
        TapOutcome::OutOfRange { bpm } => println!("tapped tempo {bpm} bpm is out of range"),
        TapOutcome::Degenerate => println!("taps too close together"),
    }
}

fn print_help() {
    println!(
        "commands: + - ++ -- | bpm N | m+ m- | t (tap) | b N (cycle beat) | s (sound) | f (flash) | p (play/pause) | ? | q"
    );
}

/// Renders beats as terminal lines: a bell plus marker for sound, a star for
/// the flash, then the count.
#[derive(Debug, Default)]
struct TerminalSink {
    line: String,
}

impl TerminalSink {
    fn emit(&mut self, marker: &str, bell: bool) -> metronome_core::Result<()> {
        if bell {
            let mut stdout = io::stdout();
            stdout
                .write_all(b"\x07")
                .and_then(|()| stdout.flush())
                .map_err(|err| MetronomeError::AudioUnavailable(err.to_string()))?;
        }
        self.line.push_str(marker);
        Ok(())
    }
}

impl BeatSink for TerminalSink {
    fn play_accent(&mut self) -> metronome_core::Result<()> {
        self.emit("ACCENT ", true)
    }

    fn play_normal(&mut self) -> metronome_core::Result<()> {
        self.emit("click  ", true)
    }

    fn flash(&mut self) -> metronome_core::Result<()> {
        self.emit("* ", false)
    }

    fn publish_count(&mut self, count: usize) {
        let line = std::mem::take(&mut self.line);
        if writeln!(io::stdout(), "{count:>2} {line}").is_err() {
            tracing::debug!(count, "stdout closed");
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Visual and audible metronome", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the metronome and read commands from stdin.
    Run(RunArgs),
    /// Print the beat interval in milliseconds for a tempo.
    Interval {
        /// Tempo in beats per minute.
        bpm: u32,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Starting tempo in beats per minute.
    #[arg(short, long)]
    bpm: Option<u32>,
    /// Starting number of beats per measure.
    #[arg(short, long)]
    meter: Option<usize>,
    /// Beat pattern such as `A,N,S,N` (accent, normal, silent).
    #[arg(long)]
    pattern: Option<String>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Use the first-release bounds (meter 2-6, no tempo clamp).
    #[arg(long)]
    legacy: bool,
    #[arg(long)]
    no_sound: bool,
    #[arg(long)]
    no_flash: bool,
    /// Run for this many seconds instead of reading commands.
    #[arg(short, long)]
    duration: Option<f64>,
}
