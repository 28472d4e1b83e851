use serde::Serialize;
use thiserror::Error;

use crate::parsing::Sample;

/// Fraction of the data range added on each side by `autoscale`
const PADDING_FRACTION: f64 = 0.2;
/// Smallest padding, keeps a single-valued axis from collapsing
const MIN_PADDING: f64 = 0.1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ViewportError {
    #[error("Viewport bounds must be finite with min < max, got x [{x_min}, {x_max}] y [{y_min}, {y_max}]")]
    InvalidBounds {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    },
    #[error("Zoom scale must be finite and positive, got ({0}, {1})")]
    InvalidScale(f64, f64),
    #[error("Non-finite {0} value")]
    NonFinite(&'static str),
}

/// Visible rectangle in data coordinates. Always finite with `min < max` on both axes
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            x_min: -0.5,
            x_max: 1.5,
            y_min: -0.5,
            y_max: 1.5,
        }
    }
}

impl Viewport {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<Viewport, ViewportError> {
        let finite = [x_min, x_max, y_min, y_max].iter().all(|v| v.is_finite());
        if !finite || x_min >= x_max || y_min >= y_max {
            return Err(ViewportError::InvalidBounds {
                x_min,
                x_max,
                y_min,
                y_max,
            });
        }

        Ok(Viewport {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    pub fn y_min(&self) -> f64 {
        self.y_min
    }

    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }

    /// Rescale about `(center_x, center_y)`. A scale below 1 zooms in
    pub fn zoom(
        &self,
        scale_x: f64,
        scale_y: f64,
        center_x: f64,
        center_y: f64,
    ) -> Result<Viewport, ViewportError> {
        if !(scale_x.is_finite() && scale_y.is_finite() && scale_x > 0f64 && scale_y > 0f64) {
            return Err(ViewportError::InvalidScale(scale_x, scale_y));
        }
        if !(center_x.is_finite() && center_y.is_finite()) {
            return Err(ViewportError::NonFinite("zoom center"));
        }

        Viewport::new(
            center_x + (self.x_min - center_x) * scale_x,
            center_x + (self.x_max - center_x) * scale_x,
            center_y + (self.y_min - center_y) * scale_y,
            center_y + (self.y_max - center_y) * scale_y,
        )
    }

    /// Translate by `(dx, dy)`
    pub fn pan(&self, dx: f64, dy: f64) -> Result<Viewport, ViewportError> {
        if !(dx.is_finite() && dy.is_finite()) {
            return Err(ViewportError::NonFinite("pan offset"));
        }

        Viewport::new(
            self.x_min + dx,
            self.x_max + dx,
            self.y_min + dy,
            self.y_max + dy,
        )
    }
}

/// Padded bounding rectangle of the samples, or `current` when there are none
pub fn autoscale(samples: &[Sample], current: Viewport) -> Viewport {
    let Some(first) = samples.first() else {
        return current;
    };

    let (mut x_min, mut x_max, mut y_min, mut y_max) = (first.x, first.x, first.y, first.y);
    for s in samples.iter().skip(1) {
        x_min = x_min.min(s.x);
        x_max = x_max.max(s.x);
        y_min = y_min.min(s.y);
        y_max = y_max.max(s.y);
    }

    let x_pad = padding(x_min, x_max);
    let y_pad = padding(y_min, y_max);

    // samples are finite, so this only fails on overflow of huge coordinates
    Viewport::new(x_min - x_pad, x_max + x_pad, y_min - y_pad, y_max + y_pad).unwrap_or(current)
}

fn padding(min: f64, max: f64) -> f64 {
    (PADDING_FRACTION * (max - min)).max(MIN_PADDING)
}
