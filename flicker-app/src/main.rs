mod app;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, Subcommand, ValueEnum};
use flicker_core::{ImageStimulus, TrialResult};
use flicker_experiment::{
    ExperimentConfig, SimulationMode, SimulationOptions, TrialConfig, TrialSpec, load_trial_list,
    simulate,
};
use flicker_timing::{Timer, VirtualTimer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flicker", about = "Flicker change-detection experiment runner")]
struct Cli {
    /// Trial list: JSON array of [first, second, flip_x] triples.
    #[arg(long, default_value = "assets/condlist.json")]
    trial_list: PathBuf,

    /// Optional session configuration file (JSON); defaults mirror the study.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the stimulus and mask images.
    #[arg(long, default_value = "assets/images")]
    images: PathBuf,

    /// Font file; falls back to common system locations.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Where the session results are written.
    #[arg(long, default_value = "results.json")]
    output: PathBuf,

    /// Run in a window instead of borderless fullscreen.
    #[arg(long)]
    windowed: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trial list through simulation, without a participant.
    Simulate {
        #[arg(long, value_enum, default_value_t = ModeArg::DataOnly)]
        mode: ModeArg,
        /// Seed for deterministic synthetic responses.
        #[arg(long)]
        seed: Option<u64>,
        /// Pin every synthetic latency to this value.
        #[arg(long)]
        rt_ms: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    DataOnly,
    Visual,
}

impl From<ModeArg> for SimulationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DataOnly => SimulationMode::DataOnly,
            ModeArg::Visual => SimulationMode::Visual,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            ExperimentConfig::from_reader(file)
                .with_context(|| format!("failed to parse config {}", path.display()))
        }
        None => Ok(ExperimentConfig::default()),
    }
}

fn run_simulation(
    config: &ExperimentConfig,
    trial_list: &[TrialSpec],
    mode: SimulationMode,
    seed: Option<u64>,
    rt_ms: Option<f64>,
    output: &Path,
) -> Result<()> {
    config.validate()?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut timer = VirtualTimer::new();
    let options = SimulationOptions { rt_ms, click: None };

    let mut rows = Vec::with_capacity(trial_list.len());
    for (index, spec) in trial_list.iter().enumerate() {
        let trial_config = TrialConfig {
            first: ImageStimulus::new(&spec.first, spec.flip_x, config.flip_y),
            second: ImageStimulus::new(&spec.second, spec.flip_x, config.flip_y),
            mask: ImageStimulus::upright(&config.masks[index % config.masks.len()]),
            phase_duration_ms: config.phase_duration_ms,
            response_target: config.response_target.clone(),
            prompt: config.prompt.clone(),
            valid_response_factor: config.valid_response_factor,
        };
        let record = simulate(&trial_config, mode, options, &mut timer, &mut rng, || {
            info!(trial = index, "simulated trial ready");
        })?;
        rows.push(TrialResult {
            trial_index: index,
            first: spec.first.clone(),
            second: spec.second.clone(),
            flip_x: spec.flip_x,
            response: record,
            timestamp_ns: timer.now(),
        });
    }

    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    serde_json::to_writer_pretty(file, &rows)?;
    info!(trials = rows.len(), output = %output.display(), "simulation complete");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let trial_list_file = File::open(&cli.trial_list)
        .with_context(|| format!("failed to open trial list {}", cli.trial_list.display()))?;
    let trial_list = load_trial_list(trial_list_file)
        .with_context(|| format!("failed to parse trial list {}", cli.trial_list.display()))?;
    info!(trials = trial_list.len(), "trial list loaded");

    match cli.command {
        Some(Command::Simulate { mode, seed, rt_ms }) => run_simulation(
            &config,
            &trial_list,
            mode.into(),
            seed,
            rt_ms,
            &cli.output,
        ),
        None => {
            let app = App::new(
                config,
                trial_list,
                &cli.images,
                cli.font.as_deref(),
                cli.output.clone(),
                cli.windowed,
            )?;
            app.run()
        }
    }
}
