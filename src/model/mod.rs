use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::parsing::Label;

pub mod perceptron;
pub mod weights;

/// A linear binary classifier over 2-D inputs
pub trait Model {
    /// Raw activation for a single point
    fn activation(&self, x: f64, y: f64) -> f64;

    /// Activations for a set of instances - each instance is a row in "inputs"
    fn activations(&self, inputs: &ArrayView2<f64>) -> Array1<f64>;

    fn predict(&self, x: f64, y: f64) -> Label {
        Label::from_activation(self.activation(x, y))
    }

    /// Number of instances whose predicted label differs from the target
    fn count_errors(&self, inputs: &ArrayView2<f64>, targets: &ArrayView1<f64>) -> usize {
        self.activations(inputs)
            .iter()
            .zip(targets.iter())
            .filter(|(activation, target)| Label::from_activation(**activation).as_f64() != **target)
            .count()
    }
}
