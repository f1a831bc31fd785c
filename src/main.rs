use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gridnav::agent::{Agent, AgentPreset};
use gridnav::model::{Model, ModelConf};
use gridnav::sim::{ScriptScanner, Simulation, SimulationConf};

/// Grid-cell and place-graph navigation agent simulator.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Number of grid modules (must be greater than zero).
    #[arg(long)]
    modules: usize,

    /// Agent preset.
    #[arg(long, value_enum)]
    agent: AgentPreset,

    /// Read the simulation script from this file instead of stdin.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Place field radius.
    #[arg(long = "field-size", default_value_t = 7.0)]
    field_size: f64,

    /// Accepted for script compatibility; this build is headless.
    #[arg(long)]
    live_plot: bool,

    /// Accepted for script compatibility; this build is headless.
    #[arg(long)]
    final_plot: bool,

    /// Accepted for script compatibility; this build is headless.
    #[arg(long)]
    lite_plot: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(parse_error) => {
            let _ = parse_error.print();
            return ExitCode::from(1);
        }
    };
    if cli.modules == 0 {
        error!("module count (--modules=N) must be greater than zero");
        return ExitCode::from(1);
    }

    let script: Box<dyn BufRead> = match &cli.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(open_error) => {
                error!(path = %path.display(), %open_error, "cannot open script file");
                return ExitCode::from(1);
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    info!(modules = cli.modules, agent = ?cli.agent, field_size = cli.field_size, "starting");

    let conf = ModelConf {
        module_count: cli.modules,
        place_cell_radius: cli.field_size,
        ..ModelConf::default()
    };
    let simulation_conf = SimulationConf {
        live_plot: cli.live_plot,
        final_plot: cli.final_plot,
        lite_plot: cli.lite_plot,
    };

    let mut rng = SmallRng::from_os_rng();
    let mut model = Model::new(conf, &mut rng);
    model.settle(&mut rng);
    let agent = Agent::with_preset(cli.agent, model);

    let mut simulation = Simulation::new(agent, simulation_conf, rng);
    match simulation.run(ScriptScanner::new(script)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(simulation_error) => {
            error!(%simulation_error, "simulation failed");
            ExitCode::from(1)
        }
    }
}
