use super::bank::WeightSet;
use super::input_stage::{Taps, TAPS};
use super::params::KernelSize;
use super::scan::ScanCoordinate;
use super::vec16::VEC_WIDTH;

/// Selects the three filter taps of the current kernel row for every lane and
/// broadcasts them across the 16 spatial positions. Filter weights do not depend
/// on position, so every position of a lane receives the same taps.
///
/// Pre-arranged layout of one weight vector: `w[row * 3 + p]` for 3x3 and each 5x5
/// column half, `w[0]` for 1x1.
pub fn wt_set(weights: &WeightSet, kernel: KernelSize, coord: &ScanCoordinate, out: &mut [Taps]) {
  for (lane, taps) in out.iter_mut().enumerate() {
    let wvals = weights.vector(lane, coord.w_off);
    let mut row = [0.0f32; TAPS];
    match kernel {
      // The reduction keeps only the centre product, any tap slot works.
      KernelSize::K1 => row = [wvals[0]; TAPS],
      _ => {
        for (p, t) in row.iter_mut().enumerate() {
          *t = wvals[coord.row_off * TAPS + p];
        }
      },
    }
    *taps = [row; VEC_WIDTH];
  }
}
