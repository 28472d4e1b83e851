use serde::{Deserialize, Serialize};

pub mod boundary;
pub mod viewport;

pub use boundary::boundary_line;
pub use viewport::{autoscale, Viewport, ViewportError};

/// A point in data coordinates
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    /// Both coordinates within `tolerance` of the other point
    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}
