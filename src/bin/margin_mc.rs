//! margin_mc - Monte Carlo margin analysis of the reference strut network.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use design_margins::config::AnalysisConfig;
use design_margins::monte_carlo::{run_monte_carlo, summarize};
use design_margins::network::{MarginNetwork, SurrogateTraining};
use design_margins::output::{
    create_timestamped_output_dir, write_network_outputs, write_summary_json,
};
use design_margins::strut::{strut_components, StrutModel};

#[derive(Debug, Parser)]
#[command(name = "margin_mc")]
#[command(version)]
#[command(about = "Monte Carlo excess, impact and absorption analysis of a margin network")]
struct Cli {
    /// Path to an analysis config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output-margin-mc")]
    outdir: PathBuf,

    #[arg(long)]
    trials: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Skip the absorption root solves
    #[arg(long, default_value_t = false)]
    no_absorption: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

fn resolve_default_config_path() -> PathBuf {
    let local = PathBuf::from("configs").join("default.toml");
    if local.exists() {
        return local;
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("configs")
        .join("default.toml")
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let path = cli.config.clone().unwrap_or_else(resolve_default_config_path);
    let mut cfg = if path.exists() {
        AnalysisConfig::from_toml_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?
    } else if cli.config.is_some() {
        anyhow::bail!("config file {} does not exist", path.display());
    } else {
        AnalysisConfig::default()
    };

    if let Some(trials) = cli.trials {
        cfg.n_trials = trials;
    }
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if cli.no_absorption {
        cfg.compute_absorption = false;
    }
    cfg.validate().context("invalid analysis config")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let cfg = load_config(&cli)?;

    let mut components = strut_components().context("failed to build strut network")?;
    components.margin_nodes = components
        .margin_nodes
        .into_iter()
        .map(|node| node.with_cutoff(cfg.cutoff).with_buffer_limit(cfg.buffer_limit))
        .collect();
    let mut network = MarginNetwork::new(components, StrutModel, "strut")?
        .with_surrogate_degree(cfg.surrogate_degree)
        .with_root_options(cfg.root_options());

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    if cfg.compute_impact || cfg.compute_absorption {
        network
            .train_performance_surrogate(
                SurrogateTraining::Synthesize {
                    n_samples: cfg.surrogate_samples,
                    sampling_freq: cfg.sampling_freq,
                },
                &mut rng,
            )
            .context("failed to train performance surrogate")?;
    }

    let mc = cfg.monte_carlo();
    info!(trials = mc.n_trials, seed = mc.seed, "starting monte carlo");
    run_monte_carlo(&mut network, &mc, &mut rng)?;
    let summary = summarize(&network, &mc);

    let run_dir = create_timestamped_output_dir(&cli.outdir)?;
    write_network_outputs(&run_dir, &network, mc.cdf_bins)?;
    write_summary_json(&run_dir.join("summary.json"), &summary)?;

    println!("wrote outputs to {}", run_dir.display());
    Ok(())
}
