//! gee-sim - GEE score test simulation CLI
//!
//! Command-line interface for Monte Carlo calibration of the robust GEE
//! score test.

use clap::{Parser, Subcommand, ValueEnum};
use gee_score_sim::error::Result;
use gee_score_sim::model::CovStructKind;
use gee_score_sim::report::{run_report, BoxStats, DEFAULT_PLOT_SIZE, DEFAULT_PLOT_WIDTH};
use gee_score_sim::simulate::{Hypothesis, Simulation, SimulationConfig};
use std::path::PathBuf;

/// CLI-friendly hypothesis enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliHypothesis {
    /// Responses generated from the null mean model
    Null,
    /// Responses generated from the alternative mean model
    Alt,
}

impl From<CliHypothesis> for Hypothesis {
    fn from(h: CliHypothesis) -> Self {
        match h {
            CliHypothesis::Null => Hypothesis::Null,
            CliHypothesis::Alt => Hypothesis::Alternative,
        }
    }
}

/// CLI-friendly working structure enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCovStruct {
    /// Uncorrelated observations within clusters
    Independence,
    /// One common correlation within clusters
    Exchangeable,
}

impl From<CliCovStruct> for CovStructKind {
    fn from(c: CliCovStruct) -> Self {
        match c {
            CliCovStruct::Independence => CovStructKind::Independence,
            CliCovStruct::Exchangeable => CovStructKind::Exchangeable,
        }
    }
}

/// Robust GEE score test simulation
#[derive(Parser)]
#[command(name = "gee-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full report: independence then exchangeable working structure
    Run {
        /// Path to simulation configuration YAML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,

        /// Replicates for the independence cycle
        #[arg(long)]
        reps: Option<usize>,

        /// Replicates for the exchangeable cycle
        #[arg(long)]
        exchangeable_reps: Option<usize>,

        /// Write the scale box plots to this SVG file
        #[arg(long)]
        plot: Option<PathBuf>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one batch of replicates under a single hypothesis
    Simulate {
        /// Mean model generating the responses
        #[arg(long, value_enum)]
        hypothesis: CliHypothesis,

        /// Working correlation structure
        #[arg(long, value_enum, default_value = "independence")]
        cov_struct: CliCovStruct,

        /// Number of replicates (default: 100)
        #[arg(long, default_value = "100")]
        reps: usize,

        /// Path to simulation configuration YAML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the default configuration as YAML
    Template,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            seed,
            reps,
            exchangeable_reps,
            plot,
            format,
        } => cmd_run(
            config.as_ref(),
            seed,
            reps,
            exchangeable_reps,
            plot.as_ref(),
            &format,
        ),

        Commands::Simulate {
            hypothesis,
            cov_struct,
            reps,
            config,
            seed,
            format,
        } => cmd_simulate(
            hypothesis.into(),
            cov_struct.into(),
            reps,
            config.as_ref(),
            seed,
            &format,
        ),

        Commands::Template => cmd_template(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>, seed: Option<u64>) -> Result<SimulationConfig> {
    let mut config = match path {
        Some(p) => {
            log::info!("Loading configuration from {:?}", p);
            SimulationConfig::from_file(p)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

/// Run the two-cycle report
fn cmd_run(
    config_path: Option<&PathBuf>,
    seed: Option<u64>,
    reps: Option<usize>,
    exchangeable_reps: Option<usize>,
    plot_path: Option<&PathBuf>,
    format: &str,
) -> Result<()> {
    let config = load_config(config_path, seed)?;
    let independence_reps = reps.unwrap_or(config.independence_reps);
    let exchangeable_reps = exchangeable_reps.unwrap_or(config.exchangeable_reps);
    let config = config.with_reps(independence_reps, exchangeable_reps);

    let report = run_report(&config)?;

    if let Some(path) = plot_path {
        report.save_plot(path, DEFAULT_PLOT_SIZE)?;
        eprintln!("Box plot written to {:?}", path);
    }

    match format {
        "json" => println!("{}", report.to_json()?),
        _ => print!("{}", report.to_text(DEFAULT_PLOT_WIDTH)),
    }
    Ok(())
}

/// Run one driver batch
fn cmd_simulate(
    hypothesis: Hypothesis,
    cov_struct: CovStructKind,
    reps: usize,
    config_path: Option<&PathBuf>,
    seed: Option<u64>,
    format: &str,
) -> Result<()> {
    let config = load_config(config_path, seed)?;
    let sim = Simulation::new(config)?;
    let result = sim.dosim(hypothesis, cov_struct, reps)?;

    let scale_null = BoxStats::from_values("null", &result.scales_null)?;
    let scale_alt = BoxStats::from_values("alt", &result.scales_alt)?;

    match format {
        "json" => {
            let out = serde_json::json!({
                "result": result,
                "scale_null": scale_null,
                "scale_alt": scale_alt,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            println!(
                "{} / {} ({} replicates)",
                result.hypothesis, result.cov_struct, result.n_reps
            );
            println!("  Mean p-value:     {:.4}", result.mean_p_value());
            println!(
                "  Prop(p<{}):      {:.4}",
                result.threshold,
                result.rejection_rate()
            );
            if result.n_nonconverged > 0 {
                println!("  Non-converged:    {}", result.n_nonconverged);
            }
            println!();
            println!("Estimated scale   min      q1  median      q3     max");
            for b in [&scale_null, &scale_alt] {
                println!(
                    "  {:<12} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3}",
                    b.label, b.min, b.q1, b.median, b.q3, b.max
                );
            }
        }
    }
    Ok(())
}

/// Print the default configuration
fn cmd_template() -> Result<()> {
    print!("{}", SimulationConfig::default().to_yaml()?);
    Ok(())
}
