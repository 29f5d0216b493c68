use std::io;

use thiserror::Error;

/// Every way the trajectory, curve and rendering code can fail. All of these are reported to the
/// immediate caller; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("starting value must be at least 1, got {0}")]
    InvalidStart(u64),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("3n+1 step overflows u64 for n = {value}")]
    Overflow { value: u64 },

    #[error("batch did not settle after {limit} steps, {unfinished} columns still above 1")]
    IterationLimit { limit: usize, unfinished: usize },

    #[error("column of length {len} never reaches 1")]
    MissingTerminal { len: usize },

    #[error("cannot build a curve from an empty sequence")]
    EmptySequence,

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Two consecutive curve points coincide, so there is no heading to advance along.
    #[error("zero-length heading at point {index}")]
    DegenerateHeading { index: usize },

    #[error("unknown palette {0:?}, expected \"white\" or \"peak\"")]
    UnknownPalette(String),

    #[error("{0} render worker(s) panicked")]
    WorkerPanic(usize),

    #[error("no curve records on input")]
    NoCurves,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
