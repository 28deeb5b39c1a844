//! Tap extraction: the per-step window of input samples for 16 spatial lanes.

use super::bank::InputTile;
use super::params::KernelSize;
use super::scan::ScanCoordinate;
use super::vec16::VEC_WIDTH;

/// Taps contributing to one spatial position per step.
pub const TAPS: usize = 3;

/// `[position][tap]`
pub type Taps = [[f32; TAPS]; VEC_WIDTH];

const LEFT_HALO: usize = 2;
// The 5x5 right half reaches x+3, one further than the 3x3 window.
const RIGHT_HALO: usize = 3;
const WINDOW: usize = LEFT_HALO + VEC_WIDTH + RIGHT_HALO;

/// Start of the tap slice inside the window, relative to position 0.
fn tap_offset(kernel: KernelSize, half: usize) -> usize {
  match (kernel, half) {
    (KernelSize::K5, 0) => 0,
    (KernelSize::K5, _) => 3,
    _ => 1,
  }
}

/// Extracts the taps for `coord`. Rows outside the image give all-zero taps; the
/// first and last vector of a row see zeros beyond the row edge.
pub fn input_stage(tile: &InputTile, kernel: KernelSize, coord: &ScanCoordinate) -> Taps {
  let mut taps = [[0.0f32; TAPS]; VEC_WIDTH];

  let src_y = (coord.yt_off + coord.row_off) as isize - kernel.half() as isize;
  if src_y < 0 || src_y as usize >= tile.ydim {
    return taps;
  }
  let y = src_y as usize;
  let channel = coord.channel(kernel);
  let xt = coord.xt_off;

  let mut window = [0.0f32; WINDOW];
  window[LEFT_HALO..LEFT_HALO + VEC_WIDTH].copy_from_slice(tile.vector(channel, y, xt).as_array());
  if xt > 0 {
    let prev = tile.vector(channel, y, xt - 1);
    window[..LEFT_HALO].copy_from_slice(&prev.0[VEC_WIDTH - LEFT_HALO..]);
  }
  if xt + 1 < tile.row_vectors {
    let next = tile.vector(channel, y, xt + 1);
    window[LEFT_HALO + VEC_WIDTH..].copy_from_slice(&next.0[..RIGHT_HALO]);
  }

  let toff = tap_offset(kernel, coord.half());
  for (q, lane) in taps.iter_mut().enumerate() {
    lane.copy_from_slice(&window[q + toff..q + toff + TAPS]);
  }
  taps
}
