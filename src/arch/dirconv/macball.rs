use super::bank::Accumulator;
use super::error::ConvError;
use super::input_stage::Taps;
use super::params::KernelSize;
use super::scan::ScanCoordinate;
use super::scoreboard::Scoreboard;
use super::vec16::VEC_WIDTH;

/// Multiplies input taps by weight taps and reduces each position to one product sum.
/// 1x1 keeps only the centre product; the other two slots hold duplicates.
pub fn reduce_taps(kernel: KernelSize, it: &Taps, wt: &Taps) -> [f32; VEC_WIDTH] {
  let mut out = [0.0f32; VEC_WIDTH];
  for (p, o) in out.iter_mut().enumerate() {
    let prod = [it[p][0] * wt[p][0], it[p][1] * wt[p][1], it[p][2] * wt[p][2]];
    *o = match kernel {
      KernelSize::K1 => prod[1],
      _ => prod[0] + prod[1] + prod[2],
    };
  }
  out
}

/// Multiply-accumulate unit shared by all lanes of one batch.
#[derive(Debug, Clone)]
pub struct MacBall {
  kernel: KernelSize,
  row_vectors: usize,
  scoreboard: Option<Scoreboard>,
  steps: u64,
}

impl MacBall {
  pub fn new(kernel: KernelSize, row_vectors: usize) -> Self {
    Self {
      kernel,
      row_vectors,
      scoreboard: None,
      steps: 0,
    }
  }

  /// Enables reuse-distance checking on accumulator slots.
  pub fn with_scoreboard(mut self, distance: usize) -> Self {
    self.scoreboard = Some(Scoreboard::new(distance));
    self
  }

  pub fn steps(&self) -> u64 {
    self.steps
  }

  /// One scan step: every lane adds its reduced products into slot
  /// `yt_off * row_vectors + xt_off` of its accumulator.
  pub fn mac(
    &mut self,
    coord: &ScanCoordinate,
    it: &Taps,
    wt: &[Taps],
    acc: &mut Accumulator,
  ) -> Result<(), ConvError> {
    let slot = coord.slot(self.row_vectors);
    if let Some(sb) = self.scoreboard.as_mut() {
      sb.access(slot)?;
    }
    for (lane, lane_wt) in wt.iter().enumerate() {
      let sum = reduce_taps(self.kernel, it, lane_wt);
      *acc.lanes[lane].slot_mut(slot) += &sum;
    }
    self.steps += 1;
    Ok(())
  }
}
