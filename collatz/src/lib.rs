//! Collatz trajectories, computed in lock-step for a whole batch of seeds and bent into 2D curves
//! by the parity of each step.
//!
//! The pipeline is `sequence::sequence_array` -> `sequence::trim` -> `curve::curve_sequence`, with
//! `render` and `ppm` turning the resulting curves into images.
extern crate crossbeam_channel;
extern crate image;
extern crate num;
extern crate rayon;
extern crate serde;
extern crate serde_json;

#[macro_use]
extern crate serde_derive;

pub mod curve;
pub mod error;
pub mod ppm;
pub mod render;
pub mod sequence;

pub use error::{Error, Result};
