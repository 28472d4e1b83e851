use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::Model;
use crate::error::EngineError;
use crate::parsing::{Label, LabeledDataset};

/// Weights and bias of the perceptron: `w1*x + w2*y + bias`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct WeightVector {
    pub w1: f64,
    pub w2: f64,
    pub bias: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        WeightVector {
            w1: 1f64,
            w2: 1f64,
            bias: 0f64,
        }
    }
}

impl WeightVector {
    pub fn new(w1: f64, w2: f64, bias: f64) -> WeightVector {
        WeightVector { w1, w2, bias }
    }

    /// Build a weight vector, rejecting NaN and infinities
    pub fn checked(w1: f64, w2: f64, bias: f64) -> Result<WeightVector, EngineError> {
        let weights = WeightVector::new(w1, w2, bias);
        if !weights.is_finite() {
            return Err(EngineError::invalid(
                "weights",
                format!("({}, {}, {})", w1, w2, bias),
            ));
        }

        Ok(weights)
    }

    pub fn is_finite(&self) -> bool {
        self.w1.is_finite() && self.w2.is_finite() && self.bias.is_finite()
    }

    /// Euclidean norm of the normal vector `(w1, w2)`
    pub fn norm(&self) -> f64 {
        self.w1.hypot(self.w2)
    }

    fn normal(&self) -> Array1<f64> {
        Array1::from(vec![self.w1, self.w2])
    }
}

impl Model for WeightVector {
    fn activation(&self, x: f64, y: f64) -> f64 {
        self.w1 * x + self.w2 * y + self.bias
    }

    fn activations(&self, inputs: &ArrayView2<f64>) -> Array1<f64> {
        inputs.dot(&self.normal()) + self.bias
    }
}

/// Seed a hyperplane halfway between the class centroids, with its normal
/// pointing from the negative centroid towards the positive one.
///
/// Returns `current` unchanged when a class is empty or the centroids coincide
pub fn initialize(dataset: &LabeledDataset, current: WeightVector) -> WeightVector {
    let (Some(positive), Some(negative)) = (
        centroid(dataset, Label::Positive),
        centroid(dataset, Label::Negative),
    ) else {
        return current;
    };

    let direction = &positive - &negative;
    let length = direction.dot(&direction).sqrt();
    if length == 0f64 || !length.is_finite() {
        return current;
    }

    let normal = direction / length;
    let midpoint = (&positive + &negative) / 2f64;
    let bias = -normal.dot(&midpoint);

    WeightVector::new(normal[0], normal[1], bias)
}

/// Mean `[x, y]` of the samples with the given label
fn centroid(dataset: &LabeledDataset, label: Label) -> Option<Array1<f64>> {
    let flat: Vec<f64> = dataset.with_label(label).flat_map(|s| [s.x, s.y]).collect();
    let rows = flat.len() / 2;
    let points = Array2::from_shape_vec((rows, 2), flat).ok()?;

    // None for an empty class
    points.mean_axis(Axis(0))
}
