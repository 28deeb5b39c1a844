//! Output accumulator management: bias seeding, partial-sum reload, store-back.
//!
//! All methods address a batch through its output chunk, the slice of the external
//! output buffer covering that batch's valid lanes (lane `k` at `k * plane`).

use super::bank::{Accumulator, BiasVector};
use super::error::ConvError;
use super::params::Tiling;
use super::vec16::Vec16;

#[derive(Debug, Clone, Copy)]
pub struct OutputTileManager<'t> {
  tiling: &'t Tiling,
}

impl<'t> OutputTileManager<'t> {
  pub fn new(tiling: &'t Tiling) -> Self {
    Self { tiling }
  }

  /// Pass 0: every position of every lane starts at that lane's bias.
  pub fn seed_bias(&self, batch: usize, bias: &BiasVector, acc: &mut Accumulator) -> Result<(), ConvError> {
    for (lane, sram) in acc.lanes.iter_mut().enumerate() {
      let value = bias.get(self.tiling.lane_channel(batch, lane));
      sram.fill(self.tiling.plane, Vec16::splat(value))?;
    }
    Ok(())
  }

  /// Pass > 0: valid lanes resume from the partial sums already stored; the rest
  /// start from zero.
  pub fn reload(&self, batch: usize, chunk: &[Vec16], acc: &mut Accumulator) -> Result<(), ConvError> {
    let plane = self.tiling.plane;
    for (lane, sram) in acc.lanes.iter_mut().enumerate() {
      if self.tiling.lane_is_valid(batch, lane) {
        sram.write_batch(&chunk[lane * plane..(lane + 1) * plane])?;
      } else {
        sram.fill(plane, Vec16::ZERO)?;
      }
    }
    Ok(())
  }

  /// Writes valid lanes back; lanes past the last output channel are discarded.
  /// Returns the number of lanes written.
  pub fn store(&self, batch: usize, acc: &Accumulator, chunk: &mut [Vec16]) -> usize {
    let plane = self.tiling.plane;
    let mut stored = 0;
    for lane in 0..acc.lanes.len() {
      if !self.tiling.lane_is_valid(batch, lane) {
        continue;
      }
      chunk[lane * plane..(lane + 1) * plane].copy_from_slice(acc.lane(lane));
      stored += 1;
    }
    stored
  }
}
