use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

pub mod csv_text;
pub mod presets;

pub const DEFAULT_X_AXIS_NAME: &str = "X1";
pub const DEFAULT_Y_AXIS_NAME: &str = "X2";
pub const DEFAULT_OUTPUT_NAME: &str = "Classification";
pub const DEFAULT_NEGATIVE_NAME: &str = "FALSE";
pub const DEFAULT_POSITIVE_NAME: &str = "TRUE";

/// Class of a sample. Serialized as `-1` / `1`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(into = "i8", try_from = "i8")]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// The sign of an activation: zero counts as positive
    pub fn from_activation(activation: f64) -> Label {
        if activation >= 0f64 {
            Label::Positive
        } else {
            Label::Negative
        }
    }

    pub fn value(self) -> i8 {
        match self {
            Label::Negative => -1,
            Label::Positive => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.value())
    }
}

impl From<Label> for i8 {
    fn from(label: Label) -> i8 {
        label.value()
    }
}

impl TryFrom<i8> for Label {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Label::Negative),
            1 => Ok(Label::Positive),
            other => Err(format!("classification must be -1 or 1, got {}", other)),
        }
    }
}

/// A single labeled point
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub label: Label,
}

impl Sample {
    pub fn new(x: f64, y: f64, label: Label) -> Sample {
        Sample { x, y, label }
    }
}

/// Names inferred from the header row and the display-label column
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DatasetMeta {
    pub x_axis_name: String,
    pub y_axis_name: String,
    pub output_name: String,
    pub negative_display_name: String,
    pub positive_display_name: String,
}

impl Default for DatasetMeta {
    fn default() -> Self {
        DatasetMeta {
            x_axis_name: DEFAULT_X_AXIS_NAME.to_string(),
            y_axis_name: DEFAULT_Y_AXIS_NAME.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            negative_display_name: DEFAULT_NEGATIVE_NAME.to_string(),
            positive_display_name: DEFAULT_POSITIVE_NAME.to_string(),
        }
    }
}

impl DatasetMeta {
    pub fn display_name(&self, label: Label) -> &str {
        match label {
            Label::Negative => &self.negative_display_name,
            Label::Positive => &self.positive_display_name,
        }
    }
}

/// Ordered samples plus their metadata. Replaced wholesale on every parse
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LabeledDataset {
    pub samples: Vec<Sample>,
    pub meta: DatasetMeta,
}

impl LabeledDataset {
    pub fn new(samples: Vec<Sample>, meta: DatasetMeta) -> LabeledDataset {
        LabeledDataset { samples, meta }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn with_label(&self, label: Label) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(move |s| s.label == label)
    }

    /// Feature matrix with one `[x, y]` row per sample
    pub fn features(&self) -> Array2<f64> {
        let flat: Vec<f64> = self.samples.iter().flat_map(|s| [s.x, s.y]).collect();

        // the shape always matches the flattened length
        Array2::from_shape_vec((self.samples.len(), 2), flat).unwrap_or_else(|_| Array2::zeros((0, 2)))
    }

    /// Target vector of `-1` / `1` values
    pub fn targets(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.label.as_f64()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_i8() {
        assert_eq!(Label::try_from(-1i8), Ok(Label::Negative));
        assert_eq!(Label::try_from(1i8), Ok(Label::Positive));
        assert!(Label::try_from(0i8).is_err());
        assert_eq!(i8::from(Label::Negative), -1);
    }

    #[test]
    fn zero_activation_is_positive() {
        assert_eq!(Label::from_activation(0.0), Label::Positive);
        assert_eq!(Label::from_activation(-1e-12), Label::Negative);
    }

    #[test]
    fn features_and_targets_follow_sample_order() {
        let dataset = LabeledDataset::new(
            vec![
                Sample::new(1.0, 2.0, Label::Positive),
                Sample::new(3.0, 4.0, Label::Negative),
            ],
            DatasetMeta::default(),
        );

        let features = dataset.features();
        assert_eq!(features.shape(), &[2, 2]);
        assert_eq!(features[[1, 0]], 3.0);
        assert_eq!(features[[0, 1]], 2.0);
        assert_eq!(dataset.targets().to_vec(), vec![1.0, -1.0]);
    }

    #[test]
    fn empty_dataset_has_empty_feature_matrix() {
        let dataset = LabeledDataset::default();
        assert_eq!(dataset.features().shape(), &[0, 2]);
        assert!(dataset.get(0).is_none());
    }
}
