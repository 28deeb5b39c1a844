//! Conversions between dense tensors and the vector-packed buffers the engine reads.
//!
//! Dense tensors are row-major NCHW activations and OIHW filters. In packed form
//! every image row occupies `row_vectors` vectors, zero-filled past the row end,
//! and every filter channel is pre-arranged into one vector (two for 5x5).

use serde::{Deserialize, Serialize};

use super::params::KernelSize;
use super::vec16::{Vec16, VEC_WIDTH};

/// Logical NCHW extent. `channels` counts all groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape {
  pub images: usize,
  pub channels: usize,
  pub height: usize,
  pub width: usize,
}

impl TensorShape {
  pub fn new(images: usize, channels: usize, height: usize, width: usize) -> Self {
    Self {
      images,
      channels,
      height,
      width,
    }
  }

  pub fn len(&self) -> usize {
    self.images * self.channels * self.height * self.width
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Packed length in vectors for rows of `row_vectors` vectors.
  pub fn packed_len(&self, row_vectors: usize) -> usize {
    self.images * self.channels * self.height * row_vectors
  }
}

/// Packs an NCHW tensor. Samples past `width` in each row are zero.
pub fn pack_input(data: &[f32], shape: TensorShape, row_vectors: usize) -> Vec<Vec16> {
  assert!(shape.width <= row_vectors * VEC_WIDTH, "row of {} samples does not fit", shape.width);
  let mut packed = vec![Vec16::ZERO; shape.packed_len(row_vectors)];
  for (row, dst) in data.chunks(shape.width).zip(packed.chunks_mut(row_vectors)) {
    for (x, &v) in row.iter().enumerate() {
      dst[x / VEC_WIDTH][x % VEC_WIDTH] = v;
    }
  }
  packed
}

/// Inverse of [`pack_input`], dropping the row padding.
pub fn unpack_output(packed: &[Vec16], shape: TensorShape, row_vectors: usize) -> Vec<f32> {
  let mut data = vec![0.0; shape.len()];
  for (dst, row) in data.chunks_mut(shape.width).zip(packed.chunks(row_vectors)) {
    for (x, v) in dst.iter_mut().enumerate() {
      *v = row[x / VEC_WIDTH][x % VEC_WIDTH];
    }
  }
  data
}

/// Pre-arranges OIHW filters of shape `out_channels x in_channels x k x k`, where
/// `in_channels` is per group.
///
/// - 1x1: `[w, 0, ...]`
/// - 3x3: the 9 taps row-major
/// - 5x5: vector 0 holds columns 0..3 of each row at `row * 3 + col`, vector 1
///   holds columns 3..5 at `row * 3 + col - 3`, its third slot per row left zero
pub fn pack_weights(weights: &[f32], out_channels: usize, in_channels: usize, kernel: KernelSize) -> Vec<Vec16> {
  let k = kernel.size();
  let per_channel = kernel.vectors_per_channel();
  let mut packed = vec![Vec16::ZERO; out_channels * in_channels * per_channel];
  for (filter, dst) in weights.chunks(k * k).zip(packed.chunks_mut(per_channel)) {
    match kernel {
      KernelSize::K1 => dst[0][0] = filter[0],
      KernelSize::K3 => dst[0] = Vec16::from_slice(filter),
      KernelSize::K5 => {
        for r in 0..k {
          for c in 0..k {
            let half = c / 3;
            dst[half][r * 3 + c % 3] = filter[r * k + c];
          }
        }
      },
    }
  }
  packed
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pack_input_pads_rows() {
    let shape = TensorShape::new(1, 1, 2, 3);
    let packed = pack_input(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], shape, 1);
    assert_eq!(packed.len(), 2);
    assert_eq!(&packed[1].0[..4], &[4.0, 5.0, 6.0, 0.0]);
    assert_eq!(unpack_output(&packed, shape, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
  }

  #[test]
  fn test_pack_input_spans_vectors() {
    let shape = TensorShape::new(1, 1, 1, 20);
    let data: Vec<f32> = (0..20).map(|i| i as f32).collect();
    let packed = pack_input(&data, shape, 2);
    assert_eq!(packed[1][3], 19.0);
    assert_eq!(packed[1][4], 0.0);
  }

  #[test]
  fn test_pack_weights_k5_halves() {
    let filter: Vec<f32> = (0..25).map(|i| i as f32).collect();
    let packed = pack_weights(&filter, 1, 1, KernelSize::K5);
    assert_eq!(packed.len(), 2);
    // row 2: columns 10 11 12 | 13 14
    assert_eq!(&packed[0].0[6..9], &[10.0, 11.0, 12.0]);
    assert_eq!(&packed[1].0[6..9], &[13.0, 14.0, 0.0]);
    assert_eq!(packed[1][14], 0.0);
  }

  #[test]
  fn test_pack_weights_k1() {
    let packed = pack_weights(&[2.0, 3.0], 2, 1, KernelSize::K1);
    assert_eq!(packed[1][0], 3.0);
    assert_eq!(packed[1][1], 0.0);
  }
}
