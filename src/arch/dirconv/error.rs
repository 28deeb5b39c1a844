//! Precondition failures reported by the direct-convolution engine.
//!
//! Every variant is raised while validating an invocation, before any buffer is
//! touched, except `Hazard`, which the scoreboard raises mid-sweep.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvError {
  /// A scalar parameter lies outside its resource-determined bounds.
  #[error("parameter '{name}' = {value} out of range [{min}, {max}]")]
  ParamOutOfRange {
    name: &'static str,
    value: usize,
    min: usize,
    max: usize,
  },

  #[error("unsupported kernel size {0}, expected 1, 3 or 5")]
  UnsupportedKernel(usize),

  #[error("group index {group} out of range for {num_groups} group(s)")]
  GroupOutOfRange { group: usize, num_groups: usize },

  /// A parameter must be a multiple of some granule (e.g. xtile_pad of 8).
  #[error("parameter '{name}' = {value} must be a multiple of {align}")]
  Misaligned {
    name: &'static str,
    value: usize,
    align: usize,
  },

  /// Two parameters are individually valid but inconsistent with each other.
  #[error("inconsistent parameters: {0}")]
  Inconsistent(String),

  #[error("{scratch} scratch needs {required} entries, capacity is {capacity}")]
  ScratchOverflow {
    scratch: &'static str,
    required: usize,
    capacity: usize,
  },

  #[error("{buffer} buffer holds {actual} entries, invocation touches {required}")]
  BufferTooSmall {
    buffer: &'static str,
    required: usize,
    actual: usize,
  },

  /// One x/y sweep is shorter than the configured minimum reuse distance.
  #[error("sweep of {sweep} steps is shorter than the minimum reuse distance {required}")]
  ReuseDistance { sweep: usize, required: usize },

  #[error("accumulator slot {slot} revisited after {distance} step(s), minimum is {required}")]
  Hazard {
    slot: usize,
    distance: usize,
    required: usize,
  },
}

impl From<ConvError> for std::io::Error {
  fn from(e: ConvError) -> Self {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
  }
}
