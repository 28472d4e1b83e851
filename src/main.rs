use clap::Parser;
use perceptron_viz::model::perceptron::{RunState, StepOutcome};
use perceptron_viz::parsing::presets::Preset;
use perceptron_viz::{logging, report, Session, SessionEvent, TrainingConfig};
use std::fs::File;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of a CSV file with x,y,classification,label rows
    #[arg(short, long, conflicts_with = "preset")]
    data_path: Option<String>,

    /// Bundled dataset to train on when no data path is given
    #[arg(short, long, value_enum, default_value_t = Preset::AndGate)]
    preset: Preset,

    /// Learning rate of the perceptron
    #[arg(short, long, default_value_t = 0.1)]
    learning_rate: f64,

    /// Training halts after this many epochs
    #[arg(short, long, default_value_t = 100)]
    max_epochs: usize,

    /// Pause between two steps of a timed run, in milliseconds
    #[arg(long, default_value_t = 500)]
    pause_ms: u64,

    /// Seed for the per-epoch shuffle
    #[arg(long, default_value = None)]
    seed: Option<u64>,

    /// Start from these weights (w1 w2 bias) instead of the centroid seeding
    #[arg(short, long, num_args = 3, value_delimiter = ' ', allow_negative_numbers = true)]
    weights: Option<Vec<f64>>,

    /// Perform this many manual steps instead of a timed run
    #[arg(long, default_value = None)]
    steps: Option<usize>,

    /// Write the final session snapshot as JSON
    #[arg(long, default_value = None)]
    snapshot_path: Option<String>,

    /// Write the step history as CSV
    #[arg(long, default_value = None)]
    history_path: Option<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Expected 3 weights (w1 w2 bias), got {0}")]
    WeightCount(usize),
    #[error("Failed to write history: {0}")]
    History(#[from] csv::Error),
    #[error(transparent)]
    Engine(#[from] perceptron_viz::EngineError),
}

/// Step manually, printing the calculation of every step
fn run_steps(session: &mut Session, steps: usize) -> Result<(), CliError> {
    for _ in 0..steps {
        match session.step_once()? {
            StepOutcome::Stepped(record) => println!("{}\n", report::step_details(&record)),
            StepOutcome::Halted => break,
        }

        if session.run_state().is_finished() {
            break;
        }
    }

    Ok(())
}

/// Start a timed run and wait for it to converge or stop
fn run_timed(session: &mut Session) -> Result<(), CliError> {
    let events = session.subscribe();
    session.start_run()?;

    for event in events.iter() {
        match event {
            SessionEvent::Stepped(record) => {
                info!(
                    "Step {} (epoch {}): {} errors",
                    record.step_index,
                    record.epoch + 1,
                    record.total_errors
                );
            }
            SessionEvent::StateChanged(state) if state.is_finished() => break,
            _ => {}
        }
    }

    Ok(())
}

fn write_snapshot(path: &str, session: &Session) -> Result<(), CliError> {
    let data = report::snapshot_json(&session.snapshot());
    let mut file = File::create(path).map_err(|source| CliError::Write {
        path: path.to_string(),
        source,
    })?;

    file.write_all(data.pretty(2).as_bytes())
        .map_err(|source| CliError::Write {
            path: path.to_string(),
            source,
        })
}

fn write_history(path: &str, session: &Session) -> Result<(), CliError> {
    let file = File::create(path).map_err(|source| CliError::Write {
        path: path.to_string(),
        source,
    })?;

    Ok(report::write_history(file, &session.history())?)
}

fn run(args: Args) -> Result<(), CliError> {
    let config = TrainingConfig {
        learning_rate: args.learning_rate,
        max_epochs: args.max_epochs,
        pause: Duration::from_millis(args.pause_ms),
        seed: args.seed,
    };
    let mut session = Session::new(config)?;

    let warnings = match &args.data_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
                path: path.clone(),
                source,
            })?;
            session.load_text(&text)
        }
        None => session.load_preset(args.preset),
    };
    for warning in &warnings {
        warn!("{}", warning);
    }

    match args.weights.as_deref() {
        Some(&[w1, w2, bias]) => session.set_weights(w1, w2, bias)?,
        Some(other) => return Err(CliError::WeightCount(other.len())),
        None => {}
    }

    match args.steps {
        Some(steps) => run_steps(&mut session, steps)?,
        None => run_timed(&mut session)?,
    }

    let snapshot = session.snapshot();
    println!("{}", report::progress_text(&snapshot));
    println!(
        "Decision boundary: {}",
        report::boundary_equation(&snapshot.weights, &snapshot.dataset.meta)
    );
    match snapshot.boundary {
        Some((start, end)) => println!(
            "Visible segment: ({:.3}, {:.3}) -> ({:.3}, {:.3})",
            start.x, start.y, end.x, end.y
        ),
        None => println!("The boundary does not cross the viewport"),
    }
    if snapshot.run_state == RunState::Converged {
        println!("All {} samples classified correctly", snapshot.dataset.len());
    }

    if let Some(path) = &args.snapshot_path {
        write_snapshot(path, &session)?;
    }
    if let Some(path) = &args.history_path {
        write_history(path, &session)?;
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {}", err);
    }

    if let Err(err) = run(args) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
