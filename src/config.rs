use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_MAX_EPOCHS: usize = 100;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

/// Training hyperparams and pacing of the timed run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    /// Training halts when the epoch counter reaches this value
    pub max_epochs: usize,
    /// Delay between two steps of a timed run
    pub pause: Duration,
    /// Seed for the per-epoch shuffle. `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            learning_rate: DEFAULT_LEARNING_RATE,
            max_epochs: DEFAULT_MAX_EPOCHS,
            pause: DEFAULT_PAUSE,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_learning_rate(self.learning_rate)?;
        check_max_epochs(self.max_epochs)
    }
}

pub(crate) fn check_learning_rate(learning_rate: f64) -> Result<(), EngineError> {
    if learning_rate.is_finite() && learning_rate > 0f64 {
        Ok(())
    } else {
        Err(EngineError::invalid("learning rate", learning_rate))
    }
}

pub(crate) fn check_max_epochs(max_epochs: usize) -> Result<(), EngineError> {
    if max_epochs == 0 {
        return Err(EngineError::invalid("max epochs", max_epochs));
    }

    Ok(())
}
