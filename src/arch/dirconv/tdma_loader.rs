//! External buffer -> scratch staging. Raw copies only, no transformation.

use std::ops::Range;

use super::bank::{BiasVector, InputTile, WeightSet};
use super::error::ConvError;
use super::params::Tiling;
use super::vec16::Vec16;

fn slice_of<'a, T>(buffer: &'static str, data: &'a [T], range: Range<usize>) -> Result<&'a [T], ConvError> {
  let len = data.len();
  let end = range.end;
  data.get(range).ok_or(ConvError::BufferTooSmall {
    buffer,
    required: end,
    actual: len,
  })
}

/// Stages one channel burst of input rows per pass.
#[derive(Debug, Clone, Copy)]
pub struct InputTileLoader<'a> {
  input: &'a [Vec16],
}

impl<'a> InputTileLoader<'a> {
  pub fn new(input: &'a [Vec16]) -> Self {
    Self { input }
  }

  pub fn load(&self, tiling: &Tiling, pass: usize, tile: &mut InputTile) -> Result<Range<usize>, ConvError> {
    let start = tiling.input_offset(pass);
    let range = start..start + tiling.input_len();
    tile.sram.write_batch(slice_of("input", self.input, range.clone())?)?;
    log::trace!("input tile pass={} <- [{:#x}, {:#x})", pass, range.start, range.end);
    Ok(range)
  }

  /// Bias of the current group, loaded once per invocation.
  pub fn load_bias(bias: &[f32], tiling: &Tiling) -> Result<BiasVector, ConvError> {
    Ok(BiasVector::new(slice_of("bias", bias, tiling.bias_range())?.to_vec()))
  }
}

/// Stages one burst of filter vectors per lane.
#[derive(Debug, Clone, Copy)]
pub struct WeightStager<'a> {
  weights: &'a [Vec16],
}

impl<'a> WeightStager<'a> {
  pub fn new(weights: &'a [Vec16]) -> Self {
    Self { weights }
  }

  /// Lanes past the last output channel are staged as zeros. Returns the number
  /// of lanes copied from the external buffer.
  pub fn load(&self, tiling: &Tiling, pass: usize, batch: usize, set: &mut WeightSet) -> Result<usize, ConvError> {
    let len = tiling.weight_len();
    let mut staged = 0;
    for (lane, sram) in set.lanes.iter_mut().enumerate() {
      if !tiling.lane_is_valid(batch, lane) {
        sram.fill(len, Vec16::ZERO)?;
        continue;
      }
      let start = tiling.weight_offset(pass, tiling.lane_channel(batch, lane));
      sram.write_batch(slice_of("weights", self.weights, start..start + len)?)?;
      staged += 1;
    }
    log::trace!("weights pass={} batch={} lanes={}", pass, batch, staged);
    Ok(staged)
  }
}
