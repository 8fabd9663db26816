use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use crate::config::{Capabilities, EngineConfig, SearchConfig};
use crate::engine::Ledger;
use crate::models::{ProblemSpec, Solution};
use crate::problem::Problem;

mod config;
mod engine;
mod geometry;
mod models;
mod optimizer;
mod problem;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Scoring rules to switch off even when the problem would enable them.
#[derive(Args, Clone, Copy)]
struct RuleFlags {
  #[arg(long)]
  ignore_pillars: bool,
  #[arg(long)]
  no_volumes: bool,
  #[arg(long)]
  no_closeness: bool,
}

impl RuleFlags {
  fn engine_config(self, spec: &ProblemSpec) -> EngineConfig {
    let detected = Capabilities::for_problem(spec);
    EngineConfig::with_capabilities(Capabilities {
      pillars: detected.pillars && !self.ignore_pillars,
      volumes: detected.volumes && !self.no_volumes,
      closeness: detected.closeness && !self.no_closeness,
    })
  }
}

/// How workers pick their starting placement when no solution is given.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum InitStrategy {
  /// One placement, built musician by musician on a grid
  Greedy,
  /// An independent random placement per worker
  Random,
}

#[derive(Subcommand)]
enum Commands {
  /// Scores a solution for the provided problem
  Score {
    problem: PathBuf,
    solution: PathBuf,
    #[command(flatten)]
    rules: RuleFlags,
  },
  /// Runs the optimizer on the provided problem
  Optimize {
    problem: PathBuf,
    /// Starting solution; `--init` decides the start when absent
    #[arg(short, long)]
    solution: Option<PathBuf>,
    #[arg(long, value_enum, env = "STAGE_INIT", default_value_t = InitStrategy::Random)]
    init: InitStrategy,
    /// Grid spacing for the greedy start
    #[arg(long, env = "STAGE_GRID_STEP", default_value_t = 5.0)]
    grid_step: f64,
    /// Where to write the best solution found
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Seconds per search phase
    #[arg(long, env = "STAGE_TIME_LIMIT", default_value_t = 30.0)]
    phase_time: f64,
    #[arg(long, env = "STAGE_PHASES", default_value_t = 4)]
    phases: usize,
    #[arg(long, env = "STAGE_THREADS", default_value_t = 1)]
    threads: usize,
    #[arg(long, env = "STAGE_SEED", default_value_t = 0)]
    seed: u64,
    /// Initial annealing temperature; zero or less climbs greedily
    #[arg(long, env = "STAGE_START_TEMP", default_value_t = 100_000.0)]
    start_temperature: f64,
    /// Fail on repeated score drift instead of only rolling back
    #[arg(long, env = "STAGE_STRICT")]
    strict: bool,
    #[arg(long)]
    no_progress: bool,
    #[command(flatten)]
    rules: RuleFlags,
  },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

fn default_output(problem: &Path) -> PathBuf {
  let name = problem.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "problem.json".into());
  problem.with_file_name(format!("solution-{name}"))
}

fn main() -> Result<(), anyhow::Error> {
  dotenvy::dotenv().ok();
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let cli: Cli = Cli::parse();

  match cli.command {
    Commands::Score { problem, solution, rules } => {
      let spec: ProblemSpec = read_json(&problem)?;
      let engine = rules.engine_config(&spec);
      let solution: Solution = read_json(&solution)?;
      let problem = Problem::new(spec)?;
      info!("capabilities: {:?}", engine.capabilities);
      let ledger = Ledger::initialize(&problem, engine, solution.placements)?;
      let score = if solution.volumes.is_empty() {
        ledger.total_score()
      } else {
        if !engine.capabilities.volumes {
          warn!("volumes in the solution are ignored: the volume rule is off");
        }
        let played = ledger.score_with_volumes(&solution.volumes)?;
        info!("with optimal volumes the score would be {}", ledger.total_score());
        played
      };
      println!("{score}");
    }
    Commands::Optimize {
      problem: path, solution, init, grid_step, out, phase_time, phases, threads, seed, start_temperature, strict,
      no_progress, rules,
    } => {
      let spec: ProblemSpec = read_json(&path)?;
      let engine = rules.engine_config(&spec);
      let problem = Problem::new(spec)?;
      info!(
        "{}: {} musicians, {} attendees, {} pillars, {:?}",
        path.display(), problem.musician_count(), problem.attendee_count(), problem.pillars.len(), engine.capabilities
      );
      let initial = match (&solution, init) {
        (Some(p), _) => Some(read_json::<Solution>(p)?.placements),
        (None, InitStrategy::Greedy) => {
          let placements = optimizer::greedy_placement(&problem, &engine, grid_step)?;
          info!("greedy start scores {}", Ledger::score_placement(&problem, engine, &placements)?);
          Some(placements)
        }
        (None, InitStrategy::Random) => None,
      };

      let search = SearchConfig {
        phases,
        phase_time: Duration::from_secs_f64(phase_time),
        threads,
        seed,
        start_temperature,
        strict: strict || SearchConfig::default().strict,
        progress: !no_progress,
        ..Default::default()
      };
      let outcome = optimizer::optimize(&problem, engine, &search, initial)?;
      info!("best score {} from worker {}", outcome.score, outcome.worker);

      let out = out.unwrap_or_else(|| default_output(&path));
      let solution = Solution { placements: outcome.placements, volumes: outcome.volumes };
      std::fs::write(&out, serde_json::to_vec(&solution)?).with_context(|| format!("writing {}", out.display()))?;
      info!("wrote {}", out.display());
    }
  }

  Ok(())
}
