//! trafficarb CLI
//!
//! - `run`: drive the arbitration loop from simulated sensors, reading
//!   operator commands from stdin
//! - `tick`: arbitrate a single set of counts and exit
//! - `classify`: congestion level for a vehicle total
//! - `config`: print the default or effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use trafficarb_core::command::OperatorCommand;
use trafficarb_core::config::{Config, LogFormat};
use trafficarb_core::congestion::classify;
use trafficarb_core::engine::ArbitrationEngine;
use trafficarb_core::logging::init_logging;
use trafficarb_core::runtime::{ArbitrationRuntime, epoch_ms};
use trafficarb_core::sensor::simulated_bank;

mod render;

#[derive(Parser, Debug)]
#[command(
    name = "trafficarb",
    version,
    about = "Lane right-of-way arbitration for signalized intersections"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "TRAFFICARB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TRAFFICARB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format for stderr
    #[arg(long, global = true, env = "TRAFFICARB_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the arbitration loop against simulated sensors
    Run(RunArgs),

    /// Arbitrate one tick and print the result
    Tick {
        /// Vehicle count per lane, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        counts: Vec<u32>,

        /// Emergency vehicle count per lane, comma separated
        #[arg(long, value_delimiter = ',')]
        emergencies: Vec<u32>,

        /// Disable auto mode
        #[arg(long)]
        manual: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },

    /// Print the congestion level for a total vehicle count
    Classify { total: u64 },

    /// Print configuration as TOML
    Config {
        /// Print built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Seed for the simulated sensors
    #[arg(long, env = "TRAFFICARB_SEED")]
    seed: Option<u64>,

    /// Number of lanes
    #[arg(long)]
    lanes: Option<usize>,

    /// Tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Start with auto mode off
    #[arg(long)]
    manual: bool,

    /// Ignore stdin instead of reading operator commands
    #[arg(long)]
    no_input: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Classify { total } => {
            println!("{}", classify(total));
            Ok(())
        }
        Commands::Config { default } => {
            let shown = if default { Config::default() } else { config };
            print!("{}", shown.to_toml()?);
            Ok(())
        }
        Commands::Tick {
            counts,
            emergencies,
            manual,
            format,
        } => {
            init_logging(&config.logging)?;
            config.engine.num_lanes = counts.len();
            config.engine.auto_mode = !manual;
            let mut engine = ArbitrationEngine::new(config.engine)?;
            let result = engine.tick(&counts, &emergencies, epoch_ms());
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
                OutputFormat::Plain => print!("{}", render::arbitration(&result)),
            }
            Ok(())
        }
        Commands::Run(args) => {
            if let Some(lanes) = args.lanes {
                config.engine.num_lanes = lanes;
            }
            if let Some(ms) = args.interval_ms {
                config.runtime.tick_interval_ms = ms;
            }
            if args.seed.is_some() {
                config.simulation.seed = args.seed;
            }
            if args.manual {
                config.engine.auto_mode = false;
            }
            config.validate()?;
            init_logging(&config.logging)?;

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            rt.block_on(run(config, &args))
        }
    }
}

async fn run(config: Config, args: &RunArgs) -> Result<()> {
    let sensors = simulated_bank(config.engine.num_lanes, &config.simulation);
    let mut runtime = ArbitrationRuntime::new(config.engine, config.runtime, sensors)?;
    if let Some(limit) = args.ticks {
        if limit == 0 {
            bail!("--ticks must be at least 1");
        }
        runtime = runtime.with_tick_limit(limit);
    }
    let handle = runtime.start();
    let mut reports = handle.subscribe();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut reading_input = !args.no_input;

    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Ok(report) => {
                    match args.format {
                        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
                        OutputFormat::Plain => print!("{}", render::tick_report(&report)),
                    }
                    if args.ticks.is_some_and(|limit| report.tick >= limit) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Report output fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if reading_input => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<OperatorCommand>() {
                    Ok(command) => match handle.apply(command).await {
                        Ok(outcome) => eprint!("{}", render::outcome(&outcome)),
                        Err(err) => eprintln!("error: {err}"),
                    },
                    Err(err) => eprintln!("error: {err}"),
                },
                Ok(None) => {
                    debug!("stdin closed; no more operator commands");
                    reading_input = false;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to read stdin");
                    reading_input = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    let summary = handle.shutdown().await?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "summary": summary })),
        OutputFormat::Plain => eprint!("{}", render::summary(&summary)),
    }
    Ok(())
}
