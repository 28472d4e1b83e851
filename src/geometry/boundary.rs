use super::{Point, Viewport};
use crate::model::weights::WeightVector;

/// Two intersection points closer than this are the same point (a corner hit twice)
const DEDUP_TOLERANCE: f64 = 1e-3;
/// Slack allowed when testing whether an intersection lies on a viewport edge
const EDGE_TOLERANCE: f64 = 1e-9;

/// Visible segment of `w1*x + w2*y + bias = 0` inside the viewport.
///
/// Candidates are taken from the left, right, top (`y_max`) and bottom (`y_min`)
/// edges in that order. Returns `None` when the weights are degenerate or the
/// line misses the rectangle.
pub fn boundary_line(weights: &WeightVector, viewport: &Viewport) -> Option<(Point, Point)> {
    let WeightVector { w1, w2, bias } = *weights;

    if w1 == 0f64 && w2 == 0f64 {
        return None;
    }

    let mut candidates = Vec::with_capacity(4);

    if w2 == 0f64 {
        let x = -bias / w1;
        candidates.extend(on_vertical_edge(x, viewport.y_max(), viewport));
        candidates.extend(on_vertical_edge(x, viewport.y_min(), viewport));
    } else {
        for x in [viewport.x_min(), viewport.x_max()] {
            let y = -(w1 * x + bias) / w2;
            if let Some(y) = clamp_within(y, viewport.y_min(), viewport.y_max()) {
                candidates.push(Point::new(x, y));
            }
        }

        if w1 != 0f64 {
            for y in [viewport.y_max(), viewport.y_min()] {
                candidates.extend(on_vertical_edge(-(w2 * y + bias) / w1, y, viewport));
            }
        }
    }

    let mut distinct: Vec<Point> = Vec::with_capacity(2);
    for point in candidates {
        if !distinct.iter().any(|p| p.approx_eq(&point, DEDUP_TOLERANCE)) {
            distinct.push(point);
        }
    }

    match distinct[..] {
        [first, second, ..] => Some((first, second)),
        _ => None,
    }
}

/// Intersection with a horizontal edge at height `y`, if `x` is inside the viewport
fn on_vertical_edge(x: f64, y: f64, viewport: &Viewport) -> Option<Point> {
    clamp_within(x, viewport.x_min(), viewport.x_max()).map(|x| Point::new(x, y))
}

fn clamp_within(value: f64, min: f64, max: f64) -> Option<f64> {
    if value.is_finite() && value >= min - EDGE_TOLERANCE && value <= max + EDGE_TOLERANCE {
        Some(value.clamp(min, max))
    } else {
        None
    }
}
