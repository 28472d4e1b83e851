use std::io::Write;

use json::{object, JsonValue};
use serde::Serialize;

use crate::geometry::Point;
use crate::model::perceptron::{RunState, StepRecord, StopReason};
use crate::model::weights::WeightVector;
use crate::model::Model;
use crate::parsing::DatasetMeta;
use crate::session::SessionSnapshot;

/// Live calculation shown next to a test point, e.g. `1.00×0.5 + 1.00×0.5 + -1.00 = 0.00`
pub fn calculation_display(weights: &WeightVector, x: f64, y: f64) -> String {
    format!(
        "{:.2}×{:.1} + {:.2}×{:.1} + {:.2} = {:.2}",
        weights.w1,
        x,
        weights.w2,
        y,
        weights.bias,
        weights.activation(x, y)
    )
}

/// The boundary written with the dataset's axis names
pub fn boundary_equation(weights: &WeightVector, meta: &DatasetMeta) -> String {
    format!(
        "{:.1}×{} + {:.1}×{} + {:.1} = 0",
        weights.w1, meta.x_axis_name, weights.w2, meta.y_axis_name, weights.bias
    )
}

/// Breakdown of one training step and the resulting weight updates
pub fn step_details(record: &StepRecord) -> String {
    let actual = record.actual_label.value();
    let predicted = record.predicted_label.value();
    let mut lines = vec![
        format!("Step {} Calculation Details", record.step_index),
        format!(
            "Training Point: ({:.1}, {:.1}) → {}",
            record.sample.x, record.sample.y, actual
        ),
        format!(
            "Prediction: {} ({})",
            predicted,
            if record.was_misclassified { "Error" } else { "Correct" }
        ),
    ];

    if !record.was_misclassified {
        lines.push("No weight updates needed - prediction was correct!".to_string());
        return lines.join("\n");
    }

    let error = record.error();
    let (before, after) = (record.weights_before, record.weights_after);
    let update_row = |name: &str, old: f64, input: String, new: f64| {
        format!(
            "{} {:.2} + ({:.2} × {} × {}) = {:.2}",
            name, old, record.learning_rate, error, input, new
        )
    };

    lines.push(format!(
        "Weight Updates (Error = {} - {} = {})",
        actual, predicted, error
    ));
    lines.push(update_row("W1:", before.w1, format!("{:.1}", record.sample.x), after.w1));
    lines.push(update_row("W2:", before.w2, format!("{:.1}", record.sample.y), after.w2));
    lines.push(update_row("Bias:", before.bias, "1".to_string(), after.bias));

    lines.join("\n")
}

/// One-line training progress for the progress chart caption
pub fn progress_text(snapshot: &SessionSnapshot) -> String {
    let max_epochs = snapshot.config.max_epochs;
    let current = (snapshot.epoch + 1).min(max_epochs);

    match snapshot.run_state {
        RunState::Idle => format!("Ready: {} samples", snapshot.dataset.len()),
        RunState::Stepping | RunState::Running => format!(
            "Epoch {}/{} - Step {} - {} errors",
            current, max_epochs, snapshot.history_len, snapshot.total_errors
        ),
        RunState::Converged => format!(
            "Converged after {} steps in epoch {}",
            snapshot.history_len, current
        ),
        RunState::Stopped(StopReason::User) => format!(
            "Stopped at epoch {}/{} - {} errors",
            current, max_epochs, snapshot.total_errors
        ),
        RunState::Stopped(StopReason::EpochLimit) => format!(
            "Reached {} epochs - {} errors remain",
            max_epochs, snapshot.total_errors
        ),
        RunState::Stopped(StopReason::NumericInstability) => {
            "Stopped: weight update was not finite".to_string()
        }
    }
}

fn weights_json(weights: &WeightVector) -> JsonValue {
    object! {
        w1: weights.w1,
        w2: weights.w2,
        bias: weights.bias,
    }
}

fn point_json(point: &Point) -> JsonValue {
    object! { x: point.x, y: point.y }
}

fn state_name(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "idle",
        RunState::Stepping => "stepping",
        RunState::Running => "running",
        RunState::Converged => "converged",
        RunState::Stopped(StopReason::User) => "stopped",
        RunState::Stopped(StopReason::EpochLimit) => "epoch_limit",
        RunState::Stopped(StopReason::NumericInstability) => "numeric_instability",
    }
}

/// Everything a renderer needs, as a JSON document
pub fn snapshot_json(snapshot: &SessionSnapshot) -> JsonValue {
    let meta = &snapshot.dataset.meta;
    let mut data = object! {
        x_axis: meta.x_axis_name.clone(),
        y_axis: meta.y_axis_name.clone(),
        output: meta.output_name.clone(),
        negative_label: meta.negative_display_name.clone(),
        positive_label: meta.positive_display_name.clone(),
        state: state_name(snapshot.run_state),
        epoch: snapshot.epoch,
        steps: snapshot.history_len,
        total_errors: snapshot.total_errors,
        learning_rate: snapshot.config.learning_rate,
        max_epochs: snapshot.config.max_epochs,
        weights: weights_json(&snapshot.weights),
        viewport: object! {
            x_min: snapshot.viewport.x_min(),
            x_max: snapshot.viewport.x_max(),
            y_min: snapshot.viewport.y_min(),
            y_max: snapshot.viewport.y_max(),
        },
        skipped_rows: snapshot.warnings.len(),
    };

    let samples: Vec<JsonValue> = snapshot
        .dataset
        .samples
        .iter()
        .map(|s| object! { x: s.x, y: s.y, label: s.label.value() })
        .collect();
    data["samples"] = samples.into();

    data["boundary"] = match &snapshot.boundary {
        Some((start, end)) => JsonValue::Array(vec![point_json(start), point_json(end)]),
        None => JsonValue::Null,
    };

    let epochs: Vec<JsonValue> = snapshot
        .epoch_errors
        .iter()
        .map(|e| object! { epoch: e.epoch, errors: e.total_errors })
        .collect();
    data["epoch_errors"] = epochs.into();

    data
}

/// Flat CSV row for one step
#[derive(Serialize)]
struct HistoryRow {
    step: usize,
    epoch: usize,
    x: f64,
    y: f64,
    actual: i8,
    predicted: i8,
    misclassified: bool,
    w1_before: f64,
    w2_before: f64,
    bias_before: f64,
    w1_after: f64,
    w2_after: f64,
    bias_after: f64,
    learning_rate: f64,
    total_errors: usize,
}

impl From<&StepRecord> for HistoryRow {
    fn from(record: &StepRecord) -> Self {
        HistoryRow {
            step: record.step_index,
            epoch: record.epoch + 1,
            x: record.sample.x,
            y: record.sample.y,
            actual: record.actual_label.value(),
            predicted: record.predicted_label.value(),
            misclassified: record.was_misclassified,
            w1_before: record.weights_before.w1,
            w2_before: record.weights_before.w2,
            bias_before: record.weights_before.bias,
            w1_after: record.weights_after.w1,
            w2_after: record.weights_after.w2,
            bias_after: record.weights_after.bias,
            learning_rate: record.learning_rate,
            total_errors: record.total_errors,
        }
    }
}

/// Write the step history as CSV with a header row
pub fn write_history<W: Write>(writer: W, history: &[StepRecord]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for record in history {
        writer.serialize(HistoryRow::from(record))?;
    }
    writer.flush()?;

    Ok(())
}
