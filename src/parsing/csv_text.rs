use super::{DatasetMeta, Label, LabeledDataset, Sample};
use crate::error::{ParseIssue, ParseWarning};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

/// Minimum number of fields in a data row (and in a header row)
const MIN_FIELDS: usize = 4;
const X_FIELD: usize = 0;
const Y_FIELD: usize = 1;
const CLASS_FIELD: usize = 2;
const DISPLAY_FIELD: usize = 3;

/// Parse a text blob of `x,y,classification,displayLabel` rows.
/// Malformed rows are skipped and returned as warnings alongside the dataset
pub fn parse(text: &str) -> (LabeledDataset, Vec<ParseWarning>) {
    // Keep the original 1-based line numbers of the non-blank lines
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    let records = split_records(&lines);
    let mut meta = DatasetMeta::default();
    let mut samples = vec![];
    let mut warnings = vec![];
    let mut negative_name: Option<String> = None;
    let mut positive_name: Option<String> = None;

    let mut rows = lines.iter().zip(records).peekable();

    if let Some((_, Ok(first))) = rows.peek() {
        if is_header(first) {
            meta.x_axis_name = first[X_FIELD].to_string();
            meta.y_axis_name = first[Y_FIELD].to_string();
            meta.output_name = first[CLASS_FIELD].to_string();
            rows.next();
        }
    }

    for ((line_number, content), record) in rows {
        let parsed = record.map_err(ParseIssue::Malformed).and_then(|r| parse_row(&r));

        match parsed {
            Ok((sample, display)) => {
                let slot = match sample.label {
                    Label::Negative => &mut negative_name,
                    Label::Positive => &mut positive_name,
                };
                if slot.is_none() {
                    *slot = Some(display);
                }
                samples.push(sample);
            }
            Err(issue) => {
                warn!("Skipping line {}: {}", line_number, issue);
                warnings.push(ParseWarning {
                    line_number: *line_number,
                    content: content.to_string(),
                    issue,
                });
            }
        }
    }

    if let Some(name) = negative_name {
        meta.negative_display_name = name;
    }
    if let Some(name) = positive_name {
        meta.positive_display_name = name;
    }

    debug!(
        "Parsed {} samples ({} skipped rows)",
        samples.len(),
        warnings.len()
    );

    (LabeledDataset::new(samples, meta), warnings)
}

/// Split each line into trimmed fields. No quoting or escaping is recognised,
/// so every line yields exactly one record
fn split_records(lines: &[(usize, &str)]) -> Vec<Result<StringRecord, String>> {
    let joined = lines
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(joined.as_bytes());

    reader
        .records()
        .map(|record| record.map_err(|err| err.to_string()))
        .collect()
}

/// The first row is a header when it is wide enough and does not start with a number
fn is_header(record: &StringRecord) -> bool {
    record.len() >= MIN_FIELDS && record[X_FIELD].parse::<f64>().is_err()
}

/// Parse a data row into a sample and its display label
fn parse_row(record: &StringRecord) -> Result<(Sample, String), ParseIssue> {
    if record.len() < MIN_FIELDS {
        return Err(ParseIssue::TooFewFields {
            found: record.len(),
        });
    }

    let x = parse_field::<f64>(record, X_FIELD).map_err(ParseIssue::InvalidX)?;
    let y = parse_field::<f64>(record, Y_FIELD).map_err(ParseIssue::InvalidY)?;
    if !x.is_finite() || !y.is_finite() {
        return Err(ParseIssue::NonFiniteCoordinate);
    }

    let class = parse_field::<i64>(record, CLASS_FIELD).map_err(ParseIssue::InvalidClassification)?;
    let label = match class {
        -1 => Label::Negative,
        1 => Label::Positive,
        other => return Err(ParseIssue::ClassificationOutOfRange(other)),
    };

    Ok((Sample::new(x, y, label), record[DISPLAY_FIELD].to_string()))
}

/// Parse one field, returning the raw text on failure
fn parse_field<T: std::str::FromStr>(record: &StringRecord, idx: usize) -> Result<T, String> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<T>().map_err(|_| raw.to_string())
}
