use clap::{Parser, Subcommand, ValueEnum};
use magexcite::analysis::{excitation, prescreen};
use magexcite::config;
use magexcite::oracle::{DeviceOracle, Unavailable, WaveformProcessor};
use std::path::PathBuf;

/// Converter excitation synthesis and loss prescreening for magnetic components
#[derive(Parser)]
#[command(name = "magexcite", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Device oracle backing summaries and loss scoring
    #[arg(long, value_enum, default_value_t = OracleChoice::Processor, global = true)]
    oracle: OracleChoice,

    /// Print performance stats to stderr
    #[arg(long, global = true)]
    stats: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize converter waveforms and write a truncated-harmonic excitation profile
    Excite {
        /// Excitation config (JSON)
        config: PathBuf,
    },
    /// Rank the operating points of an excitation profile by estimated loss
    Prescreen {
        /// Prescreen config (JSON)
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OracleChoice {
    /// No solver: summaries are omitted and every score falls back
    #[value(name = "none")]
    Off,
    /// Local waveform processing; loss scores fall back
    Processor,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(magexcite::stats::Stats::new()) } else { None };

    let oracle: Box<dyn DeviceOracle> = match cli.oracle {
        OracleChoice::Off => Box::new(Unavailable),
        OracleChoice::Processor => Box::new(WaveformProcessor),
    };

    match &cli.command {
        Command::Excite { config } => {
            let raw = config::read_json(config).unwrap_or_else(|e| {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            });
            excitation::run(&raw, oracle.as_ref(), stats.as_mut()).unwrap_or_else(|e| {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            });
        }
        Command::Prescreen { config } => {
            let cfg = config::load_prescreen_config(config).unwrap_or_else(|e| {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            });
            prescreen::run(&cfg, oracle.as_ref(), stats.as_mut()).unwrap_or_else(|e| {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            });
        }
    }

    if let Some(ref stats) = stats {
        stats.display();
    }
    println!("OK");
}
