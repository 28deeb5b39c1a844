use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Index, IndexMut};

/// Number of scalar samples packed into one addressable unit of the external buffers.
pub const VEC_WIDTH: usize = 16;

/// One 16-wide vector of f32 samples, the addressable unit of input, weight and
/// output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Vec16(pub [f32; VEC_WIDTH]);

impl Vec16 {
  pub const ZERO: Vec16 = Vec16([0.0; VEC_WIDTH]);

  pub fn splat(value: f32) -> Self {
    Vec16([value; VEC_WIDTH])
  }

  pub fn from_slice(values: &[f32]) -> Self {
    let mut v = Self::ZERO;
    let n = values.len().min(VEC_WIDTH);
    v.0[..n].copy_from_slice(&values[..n]);
    v
  }

  pub fn as_array(&self) -> &[f32; VEC_WIDTH] {
    &self.0
  }

  /// Raw bit patterns, for exact comparisons in tests.
  pub fn to_bits(&self) -> [u32; VEC_WIDTH] {
    let mut bits = [0u32; VEC_WIDTH];
    for (b, v) in bits.iter_mut().zip(self.0.iter()) {
      *b = v.to_bits();
    }
    bits
  }
}

impl Index<usize> for Vec16 {
  type Output = f32;

  fn index(&self, idx: usize) -> &f32 {
    &self.0[idx]
  }
}

impl IndexMut<usize> for Vec16 {
  fn index_mut(&mut self, idx: usize) -> &mut f32 {
    &mut self.0[idx]
  }
}

impl AddAssign<&[f32; VEC_WIDTH]> for Vec16 {
  fn add_assign(&mut self, rhs: &[f32; VEC_WIDTH]) {
    for (a, b) in self.0.iter_mut().zip(rhs.iter()) {
      *a += *b;
    }
  }
}
