//! Invocation parameters, resource bounds and all tiling/offset arithmetic.
//!
//! Offsets are expressed in `Vec16` units for input, weight and output buffers and
//! in scalar units for the bias buffer.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::error::ConvError;
use super::vec16::VEC_WIDTH;

/// Tiles are two samples wide, so a row of `xtile_pad` tiles spans `xtile_pad / 8` vectors.
pub const TILES_PER_VECTOR: usize = VEC_WIDTH / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum KernelSize {
  K1,
  K3,
  K5,
}

impl KernelSize {
  pub fn from_size(size: usize) -> Result<Self, ConvError> {
    match size {
      1 => Ok(KernelSize::K1),
      3 => Ok(KernelSize::K3),
      5 => Ok(KernelSize::K5),
      other => Err(ConvError::UnsupportedKernel(other)),
    }
  }

  pub fn size(self) -> usize {
    match self {
      KernelSize::K1 => 1,
      KernelSize::K3 => 3,
      KernelSize::K5 => 5,
    }
  }

  /// Distance from the kernel centre to its edge.
  pub fn half(self) -> usize {
    self.size() >> 1
  }

  /// Kernel rows visited for one weight vector.
  pub fn rows(self) -> usize {
    self.size()
  }

  /// 5x5 filters pack each channel into two vectors, one per column half.
  pub fn vectors_per_channel(self) -> usize {
    match self {
      KernelSize::K5 => 2,
      _ => 1,
    }
  }

  /// Row sweeps per input channel: 1, 3 or 10.
  pub fn effective_rows(self) -> usize {
    match self {
      KernelSize::K1 => 1,
      _ => self.rows() * self.vectors_per_channel(),
    }
  }
}

impl TryFrom<usize> for KernelSize {
  type Error = ConvError;

  fn try_from(size: usize) -> Result<Self, Self::Error> {
    KernelSize::from_size(size)
  }
}

impl From<KernelSize> for usize {
  fn from(k: KernelSize) -> usize {
    k.size()
  }
}

/// Fixed resource ceilings of the engine. Violations are configuration errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchLimits {
  pub max_in_channels: usize,
  pub max_out_channels: usize,
  pub max_burst_channels: usize,
  pub max_read_passes: usize,
  pub max_ydim: usize,
  pub max_xdim: usize,
  pub max_xtile: usize,
  pub min_xtile_pad: usize,
  pub max_xtile_pad: usize,
  pub max_groups: usize,
  pub max_lanes: usize,
  /// Input tile capacity in vectors.
  pub input_capacity: usize,
  /// Accumulator capacity per lane in vectors.
  pub accumulator_capacity: usize,
  /// Weight scratch capacity per lane in vectors.
  pub weight_capacity: usize,
  /// Bias scratch capacity in scalars.
  pub bias_capacity: usize,
}

impl Default for ScratchLimits {
  fn default() -> Self {
    Self {
      max_in_channels: 1024,
      max_out_channels: 1024,
      max_burst_channels: 256,
      max_read_passes: 64,
      max_ydim: 256,
      max_xdim: 256,
      max_xtile: 128,
      min_xtile_pad: 8,
      max_xtile_pad: 128,
      max_groups: 2,
      max_lanes: 64,
      input_capacity: 256 * 16,
      accumulator_capacity: 256 * 16,
      weight_capacity: 512,
      bias_capacity: 1024,
    }
  }
}

/// Scalar parameters of one invocation. Channel counts are per group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvParams {
  pub group: usize,
  pub in_channels: usize,
  pub out_channels: usize,
  pub burst_channels: usize,
  pub read_passes: usize,
  pub ydim: usize,
  pub xdim: usize,
  pub xtile: usize,
  pub xtile_pad: usize,
  pub kernel: KernelSize,
  pub image_offset: usize,
  pub num_groups: usize,
}

impl ConvParams {
  /// Derives `xtile`, `xtile_pad` and `read_passes` for a single-group image of
  /// `ydim x xdim`, processing `burst_channels` input channels per pass.
  pub fn for_image(
    in_channels: usize,
    out_channels: usize,
    burst_channels: usize,
    ydim: usize,
    xdim: usize,
    kernel: KernelSize,
  ) -> Self {
    let xtile = xdim.div_ceil(2);
    let xtile_pad = xtile.div_ceil(TILES_PER_VECTOR).max(1) * TILES_PER_VECTOR;
    Self {
      group: 0,
      in_channels,
      out_channels,
      burst_channels,
      read_passes: in_channels.div_ceil(burst_channels.max(1)),
      ydim,
      xdim,
      xtile,
      xtile_pad,
      kernel,
      image_offset: 0,
      num_groups: 1,
    }
  }

  pub fn with_group(mut self, group: usize, num_groups: usize) -> Self {
    self.group = group;
    self.num_groups = num_groups;
    self
  }

  pub fn with_image_offset(mut self, image_offset: usize) -> Self {
    self.image_offset = image_offset;
    self
  }

  /// Vectors per image row.
  pub fn row_vectors(&self) -> usize {
    self.xtile_pad / TILES_PER_VECTOR
  }

  /// Vectors per channel plane.
  pub fn plane(&self) -> usize {
    self.ydim * self.row_vectors()
  }

  /// Checks every bound before any work begins.
  pub fn validate(&self, limits: &ScratchLimits, lanes: usize, min_reuse_distance: usize) -> Result<Tiling, ConvError> {
    check_range("lanes", lanes, 1, limits.max_lanes)?;
    check_range("num_groups", self.num_groups, 1, limits.max_groups)?;
    if self.group >= self.num_groups {
      return Err(ConvError::GroupOutOfRange {
        group: self.group,
        num_groups: self.num_groups,
      });
    }
    check_range("in_channels", self.in_channels, 1, limits.max_in_channels)?;
    check_range("out_channels", self.out_channels, 1, limits.max_out_channels)?;
    check_range("burst_channels", self.burst_channels, 1, limits.max_burst_channels)?;
    check_range("read_passes", self.read_passes, 1, limits.max_read_passes)?;
    check_range("ydim", self.ydim, 1, limits.max_ydim)?;
    check_range("xdim", self.xdim, 1, limits.max_xdim)?;
    check_range("xtile", self.xtile, 1, limits.max_xtile)?;
    check_range("xtile_pad", self.xtile_pad, limits.min_xtile_pad, limits.max_xtile_pad)?;
    if self.xtile_pad % TILES_PER_VECTOR != 0 {
      return Err(ConvError::Misaligned {
        name: "xtile_pad",
        value: self.xtile_pad,
        align: TILES_PER_VECTOR,
      });
    }
    if self.xtile > self.xtile_pad {
      return Err(ConvError::Inconsistent(format!(
        "xtile {} exceeds xtile_pad {}",
        self.xtile, self.xtile_pad
      )));
    }
    if self.xdim > self.xtile_pad * 2 {
      return Err(ConvError::Inconsistent(format!(
        "xdim {} does not fit in {} padded tiles",
        self.xdim, self.xtile_pad
      )));
    }
    if self.read_passes * self.burst_channels > self.in_channels {
      return Err(ConvError::Inconsistent(format!(
        "{} passes of {} channels exceed {} input channels",
        self.read_passes, self.burst_channels, self.in_channels
      )));
    }

    let tiling = Tiling::new(self, lanes);

    check_capacity("input", tiling.input_len(), limits.input_capacity)?;
    check_capacity("accumulator", tiling.plane, limits.accumulator_capacity)?;
    check_capacity("weight", tiling.weight_len(), limits.weight_capacity)?;
    check_capacity("bias", self.out_channels, limits.bias_capacity)?;

    if tiling.plane < min_reuse_distance {
      return Err(ConvError::ReuseDistance {
        sweep: tiling.plane,
        required: min_reuse_distance,
      });
    }

    Ok(tiling)
  }
}

fn check_range(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConvError> {
  if value < min || value > max {
    return Err(ConvError::ParamOutOfRange { name, value, min, max });
  }
  Ok(())
}

fn check_capacity(scratch: &'static str, required: usize, capacity: usize) -> Result<(), ConvError> {
  if required > capacity {
    return Err(ConvError::ScratchOverflow {
      scratch,
      required,
      capacity,
    });
  }
  Ok(())
}

/// Derived geometry of a validated invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiling {
  pub kernel: KernelSize,
  pub group: usize,
  pub num_groups: usize,
  pub image_offset: usize,
  pub in_channels: usize,
  pub out_channels: usize,
  pub burst_channels: usize,
  pub read_passes: usize,
  pub ydim: usize,
  pub row_vectors: usize,
  pub plane: usize,
  pub lanes: usize,
  pub batches: usize,
}

impl Tiling {
  fn new(params: &ConvParams, lanes: usize) -> Self {
    Self {
      kernel: params.kernel,
      group: params.group,
      num_groups: params.num_groups,
      image_offset: params.image_offset,
      in_channels: params.in_channels,
      out_channels: params.out_channels,
      burst_channels: params.burst_channels,
      read_passes: params.read_passes,
      ydim: params.ydim,
      row_vectors: params.row_vectors(),
      plane: params.plane(),
      lanes,
      batches: params.out_channels.div_ceil(lanes),
    }
  }

  /// First input vector of pass `pass`.
  pub fn input_offset(&self, pass: usize) -> usize {
    ((self.image_offset * self.num_groups + self.group) * self.in_channels + pass * self.burst_channels) * self.plane
  }

  /// Vectors staged per pass.
  pub fn input_len(&self) -> usize {
    self.burst_channels * self.plane
  }

  /// First weight vector of output channel `oc` (index within the group) for pass `pass`.
  pub fn weight_offset(&self, pass: usize, oc: usize) -> usize {
    ((oc + self.out_channels * self.group) * self.in_channels + pass * self.burst_channels)
      * self.kernel.vectors_per_channel()
  }

  /// Weight vectors staged per lane per pass.
  pub fn weight_len(&self) -> usize {
    self.burst_channels * self.kernel.vectors_per_channel()
  }

  /// First output vector of this group's region.
  pub fn output_base(&self) -> usize {
    (self.image_offset * self.num_groups * self.out_channels + self.out_channels * self.group) * self.plane
  }

  /// First output vector of output channel `oc`.
  pub fn output_offset(&self, oc: usize) -> usize {
    self.output_base() + oc * self.plane
  }

  /// The output vectors owned by this invocation.
  pub fn output_region(&self) -> Range<usize> {
    let base = self.output_base();
    base..base + self.out_channels * self.plane
  }

  pub fn bias_range(&self) -> Range<usize> {
    let base = self.out_channels * self.group;
    base..base + self.out_channels
  }

  /// Output channel handled by lane `lane` of batch `batch`.
  pub fn lane_channel(&self, batch: usize, lane: usize) -> usize {
    batch * self.lanes + lane
  }

  pub fn lane_is_valid(&self, batch: usize, lane: usize) -> bool {
    self.lane_channel(batch, lane) < self.out_channels
  }

  /// MAC steps per (pass, batch).
  pub fn mac_iterations(&self) -> usize {
    self.burst_channels * self.ydim * self.kernel.effective_rows() * self.row_vectors
  }

  /// Required lengths of (input, weights, bias, output).
  pub fn required_lengths(&self) -> (usize, usize, usize, usize) {
    let input = self.input_offset(self.read_passes);
    let weights =
      ((self.out_channels * (self.group + 1) - 1) * self.in_channels + self.read_passes * self.burst_channels)
        * self.kernel.vectors_per_channel();
    let bias = self.bias_range().end;
    let output = self.output_region().end;
    (input, weights, bias, output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base_params() -> ConvParams {
    ConvParams::for_image(8, 6, 4, 13, 13, KernelSize::K3)
  }

  #[test]
  fn test_for_image_pads_tiles() {
    let p = base_params();
    assert_eq!(p.xtile, 7);
    assert_eq!(p.xtile_pad, 8);
    assert_eq!(p.row_vectors(), 1);
    assert_eq!(p.read_passes, 2);

    let wide = ConvParams::for_image(1, 1, 1, 4, 40, KernelSize::K1);
    assert_eq!(wide.xtile, 20);
    assert_eq!(wide.xtile_pad, 24);
    assert_eq!(wide.row_vectors(), 3);
  }

  #[test]
  fn test_effective_rows() {
    assert_eq!(KernelSize::K1.effective_rows(), 1);
    assert_eq!(KernelSize::K3.effective_rows(), 3);
    assert_eq!(KernelSize::K5.effective_rows(), 10);
  }

  #[test]
  fn test_kernel_from_size() {
    assert_eq!(KernelSize::from_size(5).unwrap(), KernelSize::K5);
    assert_eq!(KernelSize::from_size(7), Err(ConvError::UnsupportedKernel(7)));
  }

  #[test]
  fn test_offsets_follow_group_layout() {
    let p = base_params().with_group(1, 2).with_image_offset(1);
    let t = p.validate(&ScratchLimits::default(), 4, 1).unwrap();
    // image 1, group 1 -> third channel block of 8 input channels
    assert_eq!(t.input_offset(0), 3 * 8 * 13);
    assert_eq!(t.input_offset(1), (3 * 8 + 4) * 13);
    assert_eq!(t.weight_offset(1, 2), (2 + 6) * 8 + 4);
    assert_eq!(t.output_base(), (1 * 2 * 6 + 6) * 13);
    assert_eq!(t.bias_range(), 6..12);
    assert_eq!(t.batches, 2);
    assert!(t.lane_is_valid(1, 1));
    assert!(!t.lane_is_valid(1, 2));
  }

  #[test]
  fn test_k5_doubles_weights() {
    let p = ConvParams::for_image(4, 1, 4, 8, 8, KernelSize::K5);
    let t = p.validate(&ScratchLimits::default(), 4, 1).unwrap();
    assert_eq!(t.weight_len(), 8);
    assert_eq!(t.weight_offset(0, 0), 0);
    assert_eq!(t.mac_iterations(), 4 * 8 * 10);
  }

  #[test]
  fn test_validate_rejects_bounds() {
    let limits = ScratchLimits::default();

    let mut p = base_params();
    p.group = 1;
    assert!(matches!(p.validate(&limits, 4, 1), Err(ConvError::GroupOutOfRange { .. })));

    let mut p = base_params();
    p.burst_channels = 300;
    assert!(matches!(
      p.validate(&limits, 4, 1),
      Err(ConvError::ParamOutOfRange { name: "burst_channels", .. })
    ));

    let mut p = base_params();
    p.xtile_pad = 12;
    assert!(matches!(p.validate(&limits, 4, 1), Err(ConvError::Misaligned { .. })));

    let mut p = base_params();
    p.read_passes = 3;
    assert!(matches!(p.validate(&limits, 4, 1), Err(ConvError::Inconsistent(_))));

    let big = ConvParams::for_image(256, 4, 256, 64, 64, KernelSize::K3);
    assert!(matches!(
      big.validate(&limits, 4, 1),
      Err(ConvError::ScratchOverflow { scratch: "input", .. })
    ));

    let narrow = ScratchLimits {
      weight_capacity: 100,
      ..ScratchLimits::default()
    };
    let k5 = ConvParams::for_image(64, 4, 64, 2, 8, KernelSize::K5);
    assert!(matches!(
      k5.validate(&narrow, 4, 1),
      Err(ConvError::ScratchOverflow { scratch: "weight", .. })
    ));

    assert!(matches!(
      base_params().validate(&limits, 0, 1),
      Err(ConvError::ParamOutOfRange { name: "lanes", .. })
    ));
  }

  #[test]
  fn test_validate_reuse_distance() {
    let p = ConvParams::for_image(1, 1, 1, 5, 5, KernelSize::K3);
    assert_eq!(
      p.validate(&ScratchLimits::default(), 4, 12),
      Err(ConvError::ReuseDistance { sweep: 5, required: 12 })
    );
    assert!(p.validate(&ScratchLimits::default(), 4, 5).is_ok());
  }

  #[test]
  fn test_required_lengths() {
    let p = base_params();
    let t = p.validate(&ScratchLimits::default(), 4, 1).unwrap();
    let (input, weights, bias, output) = t.required_lengths();
    assert_eq!(input, 8 * 13);
    assert_eq!(weights, 6 * 8);
    assert_eq!(bias, 6);
    assert_eq!(output, 6 * 13);
  }
}
