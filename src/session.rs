//! The query and command surface used by a renderer.
//!
//! A `Session` owns the training engine behind a mutex. Timed runs execute on a
//! worker thread that wakes up every `pause`, re-checks under the lock that its
//! run is still the active one and only then performs a step. `stop_run`
//! clears the active run under the same lock before joining the worker, so no
//! step lands after it returns.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::error::{EngineError, ParseWarning};
use crate::geometry::{self, Point, Viewport, ViewportError};
use crate::model::perceptron::{
    EpochSummary, RunState, StepOutcome, StepRecord, TrainingEngine,
};
use crate::model::weights::WeightVector;
use crate::parsing::presets::Preset;
use crate::parsing::{csv_text, Label, LabeledDataset};

/// Change notifications sent to subscribers
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    DatasetLoaded { samples: usize, warnings: usize },
    WeightsChanged(WeightVector),
    Stepped(StepRecord),
    StateChanged(RunState),
    ViewportChanged(Viewport),
    ConfigChanged(TrainingConfig),
}

/// Read-only view of everything a renderer draws
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub dataset: LabeledDataset,
    pub warnings: Vec<ParseWarning>,
    pub weights: WeightVector,
    pub viewport: Viewport,
    pub boundary: Option<(Point, Point)>,
    pub run_state: RunState,
    pub epoch: usize,
    pub total_errors: usize,
    pub history_len: usize,
    pub last_step: Option<StepRecord>,
    pub epoch_errors: Vec<EpochSummary>,
    pub config: TrainingConfig,
}

struct SessionState {
    engine: TrainingEngine,
    viewport: Viewport,
    warnings: Vec<ParseWarning>,
    active_run: Option<u64>,
    next_run_id: u64,
    listeners: Vec<Sender<SessionEvent>>,
}

impl SessionState {
    fn emit(&mut self, event: SessionEvent) {
        // drop subscribers whose receiver is gone
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_state(&mut self) {
        let state = self.engine.state();
        self.emit(SessionEvent::StateChanged(state));
    }

    fn autoscaled(&self) -> Viewport {
        geometry::autoscale(&self.engine.dataset().samples, self.viewport)
    }
}

struct RunHandle {
    stop_tx: Sender<()>,
    worker: JoinHandle<()>,
}

pub struct Session {
    shared: Arc<Mutex<SessionState>>,
    run: Option<RunHandle>,
}

fn lock(shared: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    // every operation leaves the state consistent, so a poisoned lock is still usable
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(config: TrainingConfig) -> Result<Session, EngineError> {
        let engine = TrainingEngine::new(config)?;

        Ok(Session {
            shared: Arc::new(Mutex::new(SessionState {
                engine,
                viewport: Viewport::default(),
                warnings: vec![],
                active_run: None,
                next_run_id: 0,
                listeners: vec![],
            })),
            run: None,
        })
    }

    /// Receive every change from now on
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared).listeners.push(tx);
        rx
    }

    // Queries

    pub fn dataset(&self) -> LabeledDataset {
        lock(&self.shared).engine.dataset().clone()
    }

    /// Rows skipped by the last parse
    pub fn warnings(&self) -> Vec<ParseWarning> {
        lock(&self.shared).warnings.clone()
    }

    pub fn weights(&self) -> WeightVector {
        lock(&self.shared).engine.weights()
    }

    pub fn viewport(&self) -> Viewport {
        lock(&self.shared).viewport
    }

    pub fn history(&self) -> Vec<StepRecord> {
        lock(&self.shared).engine.history().to_vec()
    }

    pub fn epoch_errors(&self) -> Vec<EpochSummary> {
        lock(&self.shared).engine.epoch_errors().to_vec()
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.shared).engine.state()
    }

    pub fn config(&self) -> TrainingConfig {
        lock(&self.shared).engine.config().clone()
    }

    pub fn predict(&self, x: f64, y: f64) -> Label {
        lock(&self.shared).engine.predict(x, y)
    }

    /// Display name of the predicted class, e.g. "TRUE"
    pub fn classify(&self, x: f64, y: f64) -> String {
        let state = lock(&self.shared);
        let label = state.engine.predict(x, y);
        state.engine.dataset().meta.display_name(label).to_string()
    }

    /// Visible part of the decision boundary
    pub fn boundary(&self) -> Option<(Point, Point)> {
        let state = lock(&self.shared);
        geometry::boundary_line(&state.engine.weights(), &state.viewport)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.shared);
        let engine = &state.engine;
        let weights = engine.weights();

        SessionSnapshot {
            dataset: engine.dataset().clone(),
            warnings: state.warnings.clone(),
            weights,
            viewport: state.viewport,
            boundary: geometry::boundary_line(&weights, &state.viewport),
            run_state: engine.state(),
            epoch: engine.epoch(),
            total_errors: engine.total_errors(),
            history_len: engine.history().len(),
            last_step: engine.last_step().cloned(),
            epoch_errors: engine.epoch_errors().to_vec(),
            config: engine.config().clone(),
        }
    }

    // Commands

    /// Parse `text`, replace the dataset and start over. Stops any active run
    pub fn load_text(&mut self, text: &str) -> Vec<ParseWarning> {
        self.stop_run();
        let (dataset, warnings) = csv_text::parse(text);
        if !warnings.is_empty() {
            info!("Skipped {} malformed rows", warnings.len());
        }

        let mut state = lock(&self.shared);
        let samples = dataset.len();
        state.engine.load_dataset(dataset);
        state.viewport = state.autoscaled();
        state.warnings = warnings.clone();

        state.emit(SessionEvent::DatasetLoaded {
            samples,
            warnings: warnings.len(),
        });
        let weights = state.engine.weights();
        state.emit(SessionEvent::WeightsChanged(weights));
        let viewport = state.viewport;
        state.emit(SessionEvent::ViewportChanged(viewport));
        state.emit_state();

        warnings
    }

    pub fn load_preset(&mut self, preset: Preset) -> Vec<ParseWarning> {
        info!("Loading preset {}", preset.display_name());
        self.load_text(preset.csv())
    }

    /// Load a bundled dataset by its display name. An unknown name leaves the
    /// session untouched
    pub fn load_preset_by_name(&mut self, name: &str) -> Result<Vec<ParseWarning>, EngineError> {
        let preset = Preset::from_name(name).ok_or_else(|| EngineError::invalid("preset", name))?;
        Ok(self.load_preset(preset))
    }

    pub fn set_weights(&mut self, w1: f64, w2: f64, bias: f64) -> Result<(), EngineError> {
        let weights = WeightVector::checked(w1, w2, bias)?;
        let mut state = lock(&self.shared);
        let before = state.engine.state();
        state.engine.set_weights(weights)?;

        state.emit(SessionEvent::WeightsChanged(weights));
        if state.engine.state() != before {
            state.emit_state();
        }

        Ok(())
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), EngineError> {
        self.update_config(|engine| engine.set_learning_rate(learning_rate))
    }

    pub fn set_max_epochs(&mut self, max_epochs: usize) -> Result<(), EngineError> {
        self.update_config(|engine| engine.set_max_epochs(max_epochs))
    }

    pub fn set_pause_duration(&mut self, pause: Duration) -> Result<(), EngineError> {
        self.update_config(|engine| engine.set_pause(pause))
    }

    fn update_config(
        &mut self,
        apply: impl FnOnce(&mut TrainingEngine) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let mut state = lock(&self.shared);
        apply(&mut state.engine)?;

        let config = state.engine.config().clone();
        state.emit(SessionEvent::ConfigChanged(config));
        Ok(())
    }

    /// Perform one manual step. Rejected while a timed run is active
    pub fn step_once(&mut self) -> Result<StepOutcome, EngineError> {
        let mut state = lock(&self.shared);
        if state.active_run.is_some() {
            return Err(EngineError::precondition(
                "cannot step manually while a run is active",
            ));
        }

        let before = state.engine.state();
        let result = state.engine.step();
        publish_step(&mut state, &result);
        if state.engine.state() != before {
            state.emit_state();
        }

        result
    }

    /// Start the timed sequence of steps on a worker thread
    pub fn start_run(&mut self) -> Result<(), EngineError> {
        let (run_id, pause) = {
            let mut state = lock(&self.shared);
            state.engine.begin_run()?;
            let run_id = state.next_run_id;
            state.next_run_id += 1;
            state.active_run = Some(run_id);
            state.emit_state();
            (run_id, state.engine.config().pause)
        };
        // a previous worker, if any, belongs to a run that has already ended
        self.finish_worker();

        let shared = Arc::clone(&self.shared);
        let (stop_tx, stop_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("training-run".to_string())
            .spawn(move || run_loop(shared, run_id, pause, stop_rx));

        match spawned {
            Ok(worker) => {
                self.run = Some(RunHandle { stop_tx, worker });
                Ok(())
            }
            Err(err) => {
                let mut state = lock(&self.shared);
                state.active_run = None;
                state.engine.stop();
                state.emit_state();
                Err(EngineError::precondition(format!(
                    "could not start the training thread: {}",
                    err
                )))
            }
        }
    }

    /// Stop the timed run. No step executes after this returns.
    /// Returns false when nothing was running
    pub fn stop_run(&mut self) -> bool {
        let was_running = {
            let mut state = lock(&self.shared);
            state.active_run = None;
            let stopped = state.engine.stop();
            if stopped {
                state.emit_state();
            }
            stopped
        };

        self.finish_worker();

        was_running
    }

    /// Stop any run, clear the history and reseed the weights
    pub fn reset(&mut self) {
        self.stop_run();

        let mut state = lock(&self.shared);
        state.engine.reset();
        let weights = state.engine.weights();
        state.emit(SessionEvent::WeightsChanged(weights));
        state.emit_state();
    }

    pub fn zoom(
        &mut self,
        scale_x: f64,
        scale_y: f64,
        center_x: f64,
        center_y: f64,
    ) -> Result<Viewport, ViewportError> {
        self.update_viewport(|v| v.zoom(scale_x, scale_y, center_x, center_y))
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> Result<Viewport, ViewportError> {
        self.update_viewport(|v| v.pan(dx, dy))
    }

    /// Fit the viewport to the data again, or the default rectangle when there is none
    pub fn reset_viewport(&mut self) -> Viewport {
        let mut state = lock(&self.shared);
        let viewport = geometry::autoscale(&state.engine.dataset().samples, Viewport::default());
        state.viewport = viewport;
        state.emit(SessionEvent::ViewportChanged(viewport));
        viewport
    }

    fn update_viewport(
        &mut self,
        transform: impl FnOnce(&Viewport) -> Result<Viewport, ViewportError>,
    ) -> Result<Viewport, ViewportError> {
        let mut state = lock(&self.shared);
        let viewport = transform(&state.viewport)?;
        state.viewport = viewport;
        state.emit(SessionEvent::ViewportChanged(viewport));
        Ok(viewport)
    }

    /// Signal and join the worker. Must not be called with the state locked
    fn finish_worker(&mut self) {
        if let Some(run) = self.run.take() {
            // the worker may already have exited on its own
            let _ = run.stop_tx.send(());
            if run.worker.join().is_err() {
                warn!("Training worker panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_run();
    }
}

fn publish_step(state: &mut SessionState, result: &Result<StepOutcome, EngineError>) {
    match result {
        Ok(StepOutcome::Stepped(record)) => {
            if record.was_misclassified {
                state.emit(SessionEvent::WeightsChanged(record.weights_after));
            }
            state.emit(SessionEvent::Stepped(record.clone()));
        }
        Ok(StepOutcome::Halted) => {}
        Err(err) => debug!("Step rejected: {}", err),
    }
}

/// Body of the timed-run worker
fn run_loop(shared: Arc<Mutex<SessionState>>, run_id: u64, pause: Duration, stop_rx: Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(pause) {
            Err(RecvTimeoutError::Timeout) => {}
            // stop requested or session dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let mut state = lock(&shared);
        if state.active_run != Some(run_id) {
            return;
        }

        let result = state.engine.run_step();
        publish_step(&mut state, &result);
        if let Err(err) = &result {
            warn!("Run {} ended: {}", run_id, err);
        }

        if state.engine.state() != RunState::Running {
            state.active_run = None;
            state.emit_state();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(TrainingConfig {
            seed: Some(3),
            pause: Duration::from_millis(1),
            ..TrainingConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn loading_text_autoscales_and_seeds_weights() {
        let mut session = session();
        let warnings = session.load_text("0,0,-1,Off\n1,1,1,On\nnot a row\n");

        assert_eq!(warnings.len(), 1);
        assert_eq!(session.warnings(), warnings);
        assert_eq!(session.dataset().len(), 2);
        let v = session.viewport();
        assert!((v.x_min() + 0.2).abs() < 1e-9 && (v.x_max() - 1.2).abs() < 1e-9);
        assert_eq!(session.run_state(), RunState::Idle);
        assert_eq!(session.classify(1.0, 1.0), "On");
        assert_eq!(session.classify(0.0, 0.0), "Off");
        assert_eq!(session.predict(0.9, 0.9), Label::Positive);
        assert!(session.boundary().is_some());
    }

    #[test]
    fn events_follow_commands() {
        let mut session = session();
        let events = session.subscribe();
        session.load_preset(Preset::AndGate);
        session.set_weights(1.0, 1.0, 0.0).unwrap();
        session.step_once().unwrap();

        let received: Vec<SessionEvent> = events.try_iter().collect();
        assert!(matches!(
            received.first(),
            Some(SessionEvent::DatasetLoaded {
                samples: 4,
                warnings: 0
            })
        ));
        assert!(received.contains(&SessionEvent::WeightsChanged(WeightVector::new(1.0, 1.0, 0.0))));
        assert!(received.iter().any(|e| matches!(e, SessionEvent::Stepped(r) if r.step_index == 1)));
        assert!(received.contains(&SessionEvent::StateChanged(RunState::Stepping))
            || received.contains(&SessionEvent::StateChanged(RunState::Converged)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut session = session();
        drop(session.subscribe());
        let live = session.subscribe();
        session.load_preset(Preset::OrGate);

        assert!(live.try_iter().count() > 0);
        assert_eq!(lock(&session.shared).listeners.len(), 1);
    }

    #[test]
    fn presets_load_by_display_name() {
        let mut session = session();
        session.load_preset(Preset::AndGate);

        let warnings = session.load_preset_by_name("study hours").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(session.dataset().meta.x_axis_name, "Hours Studied");

        assert!(matches!(
            session.load_preset_by_name("XOR Gate"),
            Err(EngineError::InvalidParameter { name: "preset", .. })
        ));
        assert_eq!(session.dataset().len(), 12);
    }

    #[test]
    fn viewport_commands() {
        let mut session = session();
        session.load_preset(Preset::AndGate);
        let fitted = session.viewport();

        let panned = session.pan(1.0, 0.0).unwrap();
        assert!((panned.x_min() - fitted.x_min() - 1.0).abs() < 1e-12);
        assert!(session.zoom(0.0, 1.0, 0.0, 0.0).is_err());
        assert_eq!(session.viewport(), panned);
        session.zoom(2.0, 2.0, 0.5, 0.5).unwrap();

        assert_eq!(session.reset_viewport(), fitted);
    }

    #[test]
    fn reset_viewport_without_data_is_default() {
        let mut session = session();
        session.pan(3.0, 3.0).unwrap();
        assert_eq!(session.reset_viewport(), Viewport::default());
    }

    #[test]
    fn configuration_commands() {
        let mut session = session();
        session.set_learning_rate(0.5).unwrap();
        session.set_max_epochs(20).unwrap();
        session.set_pause_duration(Duration::from_millis(250)).unwrap();

        let config = session.config();
        assert_eq!(config.learning_rate, 0.5);
        assert_eq!(config.max_epochs, 20);
        assert_eq!(config.pause, Duration::from_millis(250));
        assert!(session.set_learning_rate(f64::INFINITY).is_err());
        assert!(session.set_weights(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn snapshot_reflects_engine() {
        let mut session = session();
        session.load_preset(Preset::StudyHours);
        session.step_once().unwrap();
        let snapshot = session.snapshot();

        assert_eq!(snapshot.dataset.len(), 12);
        assert_eq!(snapshot.history_len, 1);
        assert_eq!(snapshot.weights, session.weights());
        assert_eq!(snapshot.last_step.map(|r| r.step_index), Some(1));
        assert_eq!(snapshot.boundary, session.boundary());
        assert_eq!(snapshot.dataset.meta.x_axis_name, "Hours Studied");
    }

    #[test]
    fn stepping_an_empty_session_fails() {
        let mut session = session();
        assert!(matches!(
            session.step_once(),
            Err(EngineError::PreconditionNotMet(_))
        ));
        assert!(session.start_run().is_err());
        assert!(!session.stop_run());
    }
}
