//! Learning and geometry core of an interactive perceptron trainer.
//!
//! Labeled 2-D samples are parsed from CSV text (`parsing`), a perceptron is
//! trained on them one sample at a time (`model`), and the decision boundary is
//! clipped to a viewport for drawing (`geometry`). `session::Session` ties these
//! together behind a query/command API with a cancelable timed run.

pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod model;
pub mod parsing;
pub mod report;
pub mod session;

pub use config::TrainingConfig;
pub use error::{EngineError, ParseWarning};
pub use session::{Session, SessionEvent, SessionSnapshot};
