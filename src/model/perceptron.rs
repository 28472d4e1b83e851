use std::time::Duration;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::weights::{self, WeightVector};
use super::Model;
use crate::config::{self, TrainingConfig};
use crate::error::EngineError;
use crate::parsing::{Label, LabeledDataset, Sample};

/// Why a run stopped
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    User,
    EpochLimit,
    NumericInstability,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Stepping,
    Running,
    Converged,
    Stopped(StopReason),
}

impl RunState {
    /// True once no further step will be taken without outside help
    pub fn is_finished(self) -> bool {
        matches!(self, RunState::Converged | RunState::Stopped(_))
    }
}

/// Everything that happened during one training step
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StepRecord {
    /// 1-based position in the history
    pub step_index: usize,
    /// 0-based epoch the step belongs to
    pub epoch: usize,
    pub total_errors: usize,
    pub was_misclassified: bool,
    pub sample: Sample,
    pub predicted_label: Label,
    pub actual_label: Label,
    pub weights_before: WeightVector,
    pub weights_after: WeightVector,
    pub learning_rate: f64,
}

impl StepRecord {
    /// `actual - predicted`: 0 on a correct prediction, otherwise -2 or 2
    pub fn error(&self) -> i8 {
        self.actual_label.value() - self.predicted_label.value()
    }
}

/// Total errors at the end of an epoch
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSummary {
    /// 1-based epoch number
    pub epoch: usize,
    pub total_errors: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Stepped(StepRecord),
    /// The epoch limit was reached before a sample could be presented
    Halted,
}

/// Online perceptron trainer. Owns the weights, the presentation order and the
/// step history
pub struct TrainingEngine {
    dataset: LabeledDataset,
    features: Array2<f64>,
    targets: Array1<f64>,
    weights: WeightVector,
    config: TrainingConfig,
    state: RunState,
    history: Vec<StepRecord>,
    epoch_errors: Vec<EpochSummary>,
    order: Vec<usize>, // Shuffled sample indices for the current epoch
    cursor: usize,
    epoch: usize,
    total_errors: usize,
    rng: StdRng,
}

impl TrainingEngine {
    /// Construct an engine with an empty dataset. The shuffle is seeded from
    /// `config.seed` when present
    pub fn new(config: TrainingConfig) -> Result<TrainingEngine, EngineError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        TrainingEngine::with_rng(config, rng)
    }

    pub fn with_rng(config: TrainingConfig, rng: StdRng) -> Result<TrainingEngine, EngineError> {
        config.validate()?;

        Ok(TrainingEngine {
            dataset: LabeledDataset::default(),
            features: Array2::zeros((0, 2)),
            targets: Array1::zeros(0),
            weights: WeightVector::default(),
            config,
            state: RunState::Idle,
            history: vec![],
            epoch_errors: vec![],
            order: vec![],
            cursor: 0,
            epoch: 0,
            total_errors: 0,
            rng,
        })
    }

    pub fn dataset(&self) -> &LabeledDataset {
        &self.dataset
    }

    pub fn weights(&self) -> WeightVector {
        self.weights
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn last_step(&self) -> Option<&StepRecord> {
        self.history.last()
    }

    pub fn epoch_errors(&self) -> &[EpochSummary] {
        &self.epoch_errors
    }

    /// Number of epochs started after the first one
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Misclassified samples under the current weights
    pub fn total_errors(&self) -> usize {
        self.total_errors
    }

    pub fn predict(&self, x: f64, y: f64) -> Label {
        self.weights.predict(x, y)
    }

    /// Replace the dataset and start over
    pub fn load_dataset(&mut self, dataset: LabeledDataset) {
        self.features = dataset.features();
        self.targets = dataset.targets();
        self.dataset = dataset;
        info!("Loaded dataset with {} samples", self.dataset.len());
        self.reset();
    }

    /// Back to `Idle`: clear the history, reshuffle and reseed the weights from
    /// the class centroids
    pub fn reset(&mut self) {
        self.history.clear();
        self.epoch_errors.clear();
        self.epoch = 0;
        self.cursor = 0;
        self.order = (0..self.dataset.len()).collect();
        self.order.shuffle(&mut self.rng);
        self.weights = weights::initialize(&self.dataset, self.weights);
        self.total_errors = self.count_errors();
        self.state = RunState::Idle;

        debug!(
            "Training reset: weights {:?}, {} errors",
            self.weights, self.total_errors
        );
    }

    pub fn set_weights(&mut self, weights: WeightVector) -> Result<(), EngineError> {
        self.ensure_not_running("set weights")?;
        let weights = WeightVector::checked(weights.w1, weights.w2, weights.bias)?;

        self.weights = weights;
        self.total_errors = self.count_errors();
        // convergence and a refused update both refer to the old weights
        if matches!(
            self.state,
            RunState::Converged | RunState::Stopped(StopReason::NumericInstability)
        ) {
            self.state = if self.history.is_empty() {
                RunState::Idle
            } else {
                RunState::Stepping
            };
        }

        Ok(())
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), EngineError> {
        self.ensure_not_running("change the learning rate")?;
        config::check_learning_rate(learning_rate)?;
        self.config.learning_rate = learning_rate;

        Ok(())
    }

    pub fn set_max_epochs(&mut self, max_epochs: usize) -> Result<(), EngineError> {
        self.ensure_not_running("change max epochs")?;
        config::check_max_epochs(max_epochs)?;
        self.config.max_epochs = max_epochs;

        Ok(())
    }

    pub fn set_pause(&mut self, pause: Duration) -> Result<(), EngineError> {
        self.ensure_not_running("change the pause duration")?;
        self.config.pause = pause;

        Ok(())
    }

    /// Perform a single manual step
    pub fn step(&mut self) -> Result<StepOutcome, EngineError> {
        self.ensure_not_running("step manually")?;
        self.ensure_steppable()?;

        self.state = RunState::Stepping;
        self.perform_step()
    }

    /// Enter `Running` with the current weights and a fresh history.
    /// Steps are then driven by `run_step`
    pub fn begin_run(&mut self) -> Result<(), EngineError> {
        self.ensure_not_running("start a second run")?;
        self.ensure_steppable()?;

        self.history.clear();
        self.epoch_errors.clear();
        self.epoch = 0;
        self.cursor = 0;
        self.order.shuffle(&mut self.rng);
        self.state = RunState::Running;
        info!(
            "Run started: learning rate {}, max epochs {}",
            self.config.learning_rate, self.config.max_epochs
        );

        Ok(())
    }

    /// Perform the next step of a timed run
    pub fn run_step(&mut self) -> Result<StepOutcome, EngineError> {
        if self.state != RunState::Running {
            return Err(EngineError::precondition("no run is active"));
        }

        self.perform_step()
    }

    /// Stop a run. Returns false when no run was active
    pub fn stop(&mut self) -> bool {
        if self.state != RunState::Running {
            return false;
        }

        self.state = RunState::Stopped(StopReason::User);
        info!("Run stopped after {} steps", self.history.len());
        true
    }

    fn ensure_not_running(&self, action: &str) -> Result<(), EngineError> {
        if self.state == RunState::Running {
            return Err(EngineError::precondition(format!(
                "cannot {} while a run is active",
                action
            )));
        }

        Ok(())
    }

    fn ensure_steppable(&self) -> Result<(), EngineError> {
        if self.dataset.is_empty() {
            return Err(EngineError::precondition("the dataset is empty"));
        }

        match self.state {
            RunState::Converged => Err(EngineError::precondition("training has converged")),
            RunState::Stopped(StopReason::NumericInstability) => Err(EngineError::precondition(
                "the last update was numerically unstable",
            )),
            _ if self.epoch >= self.config.max_epochs => {
                Err(EngineError::precondition("the epoch limit has been reached"))
            }
            _ => Ok(()),
        }
    }

    /// One step of the perceptron learning rule
    fn perform_step(&mut self) -> Result<StepOutcome, EngineError> {
        if self.cursor >= self.order.len() {
            self.epoch += 1;
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;

            if self.epoch >= self.config.max_epochs {
                self.state = RunState::Stopped(StopReason::EpochLimit);
                info!(
                    "Epoch limit of {} reached with {} errors",
                    self.config.max_epochs, self.total_errors
                );
                return Ok(StepOutcome::Halted);
            }
        }

        let sample = self
            .order
            .get(self.cursor)
            .and_then(|&idx| self.dataset.get(idx))
            .copied()
            .ok_or_else(|| EngineError::precondition("the dataset is empty"))?;

        let before = self.weights;
        let learning_rate = self.config.learning_rate;
        let predicted = before.predict(sample.x, sample.y);
        let was_misclassified = predicted != sample.label;

        let after = if was_misclassified {
            let error = sample.label.as_f64() - predicted.as_f64();
            WeightVector::new(
                before.w1 + learning_rate * error * sample.x,
                before.w2 + learning_rate * error * sample.y,
                before.bias + learning_rate * error,
            )
        } else {
            before
        };

        if !after.is_finite() {
            warn!(
                "Refusing non-finite update {:?} -> {:?}; stopping",
                before, after
            );
            self.state = RunState::Stopped(StopReason::NumericInstability);
            return Err(EngineError::NumericInstability);
        }

        self.cursor += 1;
        self.weights = after;
        // full rescan after every step
        self.total_errors = self.count_errors();

        let record = StepRecord {
            step_index: self.history.len() + 1,
            epoch: self.epoch,
            total_errors: self.total_errors,
            was_misclassified,
            sample,
            predicted_label: predicted,
            actual_label: sample.label,
            weights_before: before,
            weights_after: after,
            learning_rate,
        };
        self.history.push(record.clone());

        debug!(
            "Step {}: ({}, {}) predicted {} actual {}, {} errors",
            record.step_index,
            sample.x,
            sample.y,
            predicted.value(),
            sample.label.value(),
            self.total_errors
        );

        let converged = self.total_errors == 0;
        if converged || self.cursor >= self.order.len() {
            self.epoch_errors.push(EpochSummary {
                epoch: self.epoch + 1,
                total_errors: self.total_errors,
            });
        }
        if converged {
            self.state = RunState::Converged;
            info!(
                "Converged after {} steps in epoch {}",
                record.step_index,
                self.epoch + 1
            );
        }

        Ok(StepOutcome::Stepped(record))
    }

    fn count_errors(&self) -> usize {
        self.weights
            .count_errors(&self.features.view(), &self.targets.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::csv_text::parse;
    use crate::parsing::presets::Preset;
    use crate::parsing::DatasetMeta;

    fn engine_with(samples: &[(f64, f64, Label)], learning_rate: f64) -> TrainingEngine {
        let config = TrainingConfig {
            learning_rate,
            seed: Some(1),
            ..TrainingConfig::default()
        };
        let mut engine = TrainingEngine::new(config).unwrap();
        engine.load_dataset(LabeledDataset::new(
            samples.iter().map(|&(x, y, l)| Sample::new(x, y, l)).collect(),
            DatasetMeta::default(),
        ));
        engine
    }

    fn stepped(outcome: StepOutcome) -> StepRecord {
        match outcome {
            StepOutcome::Stepped(record) => record,
            StepOutcome::Halted => panic!("expected a step"),
        }
    }

    #[test]
    fn correct_prediction_leaves_weights_alone() {
        let mut engine = engine_with(&[(1.0, 1.0, Label::Positive)], 0.1);
        engine.set_weights(WeightVector::new(1.0, 1.0, -1.5)).unwrap();

        let record = stepped(engine.step().unwrap());

        assert!(!record.was_misclassified);
        assert_eq!(record.predicted_label, Label::Positive);
        assert_eq!(record.error(), 0);
        assert_eq!(record.weights_after, WeightVector::new(1.0, 1.0, -1.5));
        assert_eq!(engine.weights(), WeightVector::new(1.0, 1.0, -1.5));
    }

    #[test]
    fn misclassified_origin_only_moves_the_bias() {
        let mut engine = engine_with(&[(0.0, 0.0, Label::Negative)], 0.1);
        engine.set_weights(WeightVector::new(1.0, 1.0, 0.5)).unwrap();

        let record = stepped(engine.step().unwrap());

        assert!(record.was_misclassified);
        assert_eq!(record.predicted_label, Label::Positive);
        assert_eq!(record.actual_label, Label::Negative);
        assert_eq!(record.error(), -2);
        assert_eq!(record.learning_rate, 0.1);
        let w = engine.weights();
        assert_eq!(w.w1, 1.0);
        assert_eq!(w.w2, 1.0);
        assert!((w.bias - 0.3).abs() < 1e-12);
        assert_eq!(record.weights_before.bias, 0.5);
    }

    #[test]
    fn and_gate_converges_for_a_range_of_learning_rates() {
        let (dataset, _) = parse(Preset::AndGate.csv());

        for learning_rate in [0.01, 0.05, 0.1, 0.25, 0.5, 0.75, 1.0] {
            for seed in 0..5 {
                let config = TrainingConfig {
                    learning_rate,
                    max_epochs: 100,
                    seed: Some(seed),
                    ..TrainingConfig::default()
                };
                let mut engine = TrainingEngine::new(config).unwrap();
                engine.load_dataset(dataset.clone());
                // start from the untrained default so training has work to do
                engine.set_weights(WeightVector::default()).unwrap();

                while engine.state() != RunState::Converged {
                    match engine.step() {
                        Ok(_) => {}
                        Err(err) => panic!("lr {} seed {}: {}", learning_rate, seed, err),
                    }
                }

                assert_eq!(engine.total_errors(), 0);
                assert!(engine.epoch() < 100);
                assert_eq!(engine.last_step().map(|r| r.total_errors), Some(0));
            }
        }
    }

    #[test]
    fn reset_restores_centroid_weights() {
        let (dataset, _) = parse(Preset::OrGate.csv());
        let mut engine = TrainingEngine::new(TrainingConfig::default()).unwrap();
        engine.load_dataset(dataset.clone());
        let seeded = engine.weights();
        assert_eq!(seeded, weights::initialize(&dataset, WeightVector::default()));

        engine.set_weights(WeightVector::new(-3.0, 2.0, 1.0)).unwrap();
        for _ in 0..3 {
            let _ = engine.step();
        }
        engine.reset();

        assert_eq!(engine.state(), RunState::Idle);
        assert!(engine.history().is_empty());
        assert!(engine.epoch_errors().is_empty());
        assert_eq!(engine.epoch(), 0);
        assert_eq!(engine.weights(), seeded);
    }

    #[test]
    fn empty_dataset_cannot_step() {
        let mut engine = TrainingEngine::new(TrainingConfig::default()).unwrap();

        assert!(matches!(engine.step(), Err(EngineError::PreconditionNotMet(_))));
        assert!(engine.begin_run().is_err());
        assert_eq!(engine.state(), RunState::Idle);
    }

    #[test]
    fn manual_steps_are_rejected_while_running() {
        let mut engine = engine_with(&[(0.0, 0.0, Label::Negative), (1.0, 1.0, Label::Positive)], 0.1);
        engine.set_weights(WeightVector::new(-1.0, -1.0, 0.0)).unwrap();
        engine.begin_run().unwrap();

        assert!(matches!(engine.step(), Err(EngineError::PreconditionNotMet(_))));
        assert!(engine.begin_run().is_err());
        assert!(engine.set_learning_rate(0.5).is_err());
        assert!(engine.history().is_empty());

        assert!(engine.run_step().is_ok());
        assert!(engine.stop());
        assert_eq!(engine.state(), RunState::Stopped(StopReason::User));
        assert!(engine.run_step().is_err());
        assert!(!engine.stop());
    }

    #[test]
    fn starting_a_run_clears_the_previous_history() {
        let mut engine = engine_with(&[(0.0, 0.0, Label::Negative), (1.0, 1.0, Label::Positive)], 0.1);
        engine.set_weights(WeightVector::new(-1.0, -1.0, 0.0)).unwrap();
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(engine.history().len(), 2);
        let weights = engine.weights();

        engine.begin_run().unwrap();
        assert!(engine.history().is_empty());
        assert!(engine.epoch_errors().is_empty());
        assert_eq!(engine.epoch(), 0);
        assert_eq!(engine.weights(), weights);

        match engine.run_step().unwrap() {
            StepOutcome::Stepped(record) => {
                assert_eq!(record.step_index, 1);
                assert_eq!(record.epoch, 0);
            }
            StepOutcome::Halted => panic!("run halted on its first step"),
        }
    }

    #[test]
    fn inseparable_data_halts_at_the_epoch_limit() {
        // XOR
        let mut engine = engine_with(
            &[
                (0.0, 0.0, Label::Negative),
                (1.0, 1.0, Label::Negative),
                (0.0, 1.0, Label::Positive),
                (1.0, 0.0, Label::Positive),
            ],
            0.1,
        );
        engine.set_max_epochs(3).unwrap();

        let mut steps = 0;
        loop {
            match engine.step().unwrap() {
                StepOutcome::Stepped(_) => steps += 1,
                StepOutcome::Halted => break,
            }
        }

        assert_eq!(steps, 12);
        assert_eq!(engine.state(), RunState::Stopped(StopReason::EpochLimit));
        assert_eq!(engine.epoch(), 3);
        assert_eq!(
            engine.epoch_errors().iter().map(|e| e.epoch).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(engine.step().is_err());

        // raising the limit lets training continue
        engine.set_max_epochs(4).unwrap();
        assert!(matches!(engine.step(), Ok(StepOutcome::Stepped(_))));
        assert_eq!(engine.state(), RunState::Stepping);
    }

    #[test]
    fn every_epoch_presents_each_sample_once() {
        // alternating labels on a line are not separable, so no convergence
        let samples: Vec<(f64, f64, Label)> = (0..6)
            .map(|i| {
                let label = if i % 2 == 0 { Label::Negative } else { Label::Positive };
                (i as f64, 0.0, label)
            })
            .collect();
        let mut engine = engine_with(&samples, 0.1);

        for _ in 0..2 {
            let mut seen: Vec<f64> = (0..6)
                .map(|_| stepped(engine.step().unwrap()).sample.x)
                .collect();
            seen.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        }
        assert_eq!(engine.epoch_errors().len(), 2);
    }

    #[test]
    fn centroid_seeding_separates_the_and_gate() {
        let (dataset, _) = parse(Preset::AndGate.csv());
        let mut engine = TrainingEngine::new(TrainingConfig::default()).unwrap();
        engine.load_dataset(dataset);

        assert_eq!(engine.total_errors(), 0);
        stepped(engine.step().unwrap());
        assert_eq!(engine.state(), RunState::Converged);
    }

    #[test]
    fn same_seed_same_order() {
        let (dataset, _) = parse(Preset::StudyHours.csv());
        let run = || {
            let config = TrainingConfig {
                seed: Some(42),
                ..TrainingConfig::default()
            };
            let mut engine = TrainingEngine::new(config).unwrap();
            engine.load_dataset(dataset.clone());
            engine.set_weights(WeightVector::new(0.0, -1.0, 0.0)).unwrap();
            (0..5)
                .filter_map(|_| engine.step().ok())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn non_finite_update_is_refused() {
        let mut engine = engine_with(&[(1e308, 0.0, Label::Negative)], 1.0);
        engine.set_weights(WeightVector::new(1.0, 0.0, 0.0)).unwrap();

        assert_eq!(engine.step(), Err(EngineError::NumericInstability));
        assert_eq!(engine.weights(), WeightVector::new(1.0, 0.0, 0.0));
        assert_eq!(engine.state(), RunState::Stopped(StopReason::NumericInstability));
        assert!(engine.history().is_empty());
        assert!(engine.step().is_err());

        engine.reset();
        assert_eq!(engine.state(), RunState::Idle);
    }

    #[test]
    fn converged_engine_rejects_steps_until_reset() {
        let mut engine = engine_with(&[(0.0, 0.0, Label::Negative), (1.0, 1.0, Label::Positive)], 0.1);
        stepped(engine.step().unwrap());

        // centroid seeding already separates two points
        assert_eq!(engine.state(), RunState::Converged);
        assert_eq!(engine.epoch_errors(), &[EpochSummary { epoch: 1, total_errors: 0 }]);
        assert!(engine.step().is_err());

        engine.reset();
        assert!(engine.step().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut engine = engine_with(&[(0.0, 0.0, Label::Negative)], 0.1);

        assert!(engine.set_learning_rate(-0.1).is_err());
        assert!(engine.set_max_epochs(0).is_err());
        assert!(engine.set_weights(WeightVector::new(f64::NAN, 0.0, 0.0)).is_err());
        assert_eq!(engine.config().learning_rate, 0.1);
        assert!(TrainingEngine::new(TrainingConfig {
            learning_rate: 0.0,
            ..TrainingConfig::default()
        })
        .is_err());
    }
}
