//! Scan-coordinate enumeration for one (pass, batch) sweep.
//!
//! Order, fastest first: vector within a row (`xt_off`), output row (`yt_off`),
//! kernel row (`row_off`), weight vector (`w_off`). Consecutive accesses to the same
//! accumulator slot are therefore exactly one x/y sweep apart.

use super::params::KernelSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCoordinate {
  /// Weight vector within the burst. For 5x5 this is `2 * channel + half`.
  pub w_off: usize,
  pub row_off: usize,
  pub yt_off: usize,
  pub xt_off: usize,
}

impl ScanCoordinate {
  /// Input channel within the burst.
  pub fn channel(&self, kernel: KernelSize) -> usize {
    match kernel {
      KernelSize::K5 => self.w_off >> 1,
      _ => self.w_off,
    }
  }

  /// Column half of a 5x5 filter (0: x-2..x, 1: x+1..x+3).
  pub fn half(&self) -> usize {
    self.w_off & 0x1
  }

  /// Accumulator slot addressed by this step.
  pub fn slot(&self, row_vectors: usize) -> usize {
    self.yt_off * row_vectors + self.xt_off
  }
}

/// Iterator over every scan coordinate of one sweep.
#[derive(Debug, Clone)]
pub struct Scan {
  kernel: KernelSize,
  ydim: usize,
  row_vectors: usize,
  total: usize,
  issued: usize,
  cur: ScanCoordinate,
}

impl Scan {
  pub fn new(kernel: KernelSize, burst_channels: usize, ydim: usize, row_vectors: usize) -> Self {
    Self {
      kernel,
      ydim,
      row_vectors,
      total: burst_channels * ydim * kernel.effective_rows() * row_vectors,
      issued: 0,
      cur: ScanCoordinate::default(),
    }
  }

  pub fn total(&self) -> usize {
    self.total
  }

  fn advance(&mut self) {
    self.cur.xt_off += 1;
    if self.cur.xt_off < self.row_vectors {
      return;
    }
    self.cur.xt_off = 0;
    if self.cur.yt_off + 1 < self.ydim {
      self.cur.yt_off += 1;
      return;
    }
    self.cur.yt_off = 0;
    if self.kernel == KernelSize::K1 || self.cur.row_off + 1 == self.kernel.rows() {
      self.cur.row_off = 0;
      self.cur.w_off += 1;
    } else {
      self.cur.row_off += 1;
    }
  }
}

impl Iterator for Scan {
  type Item = ScanCoordinate;

  fn next(&mut self) -> Option<ScanCoordinate> {
    if self.issued == self.total {
      return None;
    }
    let out = self.cur;
    self.issued += 1;
    self.advance();
    Some(out)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let left = self.total - self.issued;
    (left, Some(left))
  }
}

impl ExactSizeIterator for Scan {}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_total_steps() {
    assert_eq!(Scan::new(KernelSize::K1, 3, 4, 2).count(), 3 * 4 * 2);
    assert_eq!(Scan::new(KernelSize::K3, 3, 4, 2).count(), 3 * 4 * 3 * 2);
    assert_eq!(Scan::new(KernelSize::K5, 3, 4, 2).count(), 3 * 4 * 10 * 2);
  }

  #[test]
  fn test_order_k3() {
    let coords: Vec<_> = Scan::new(KernelSize::K3, 2, 2, 2).collect();
    let first = ScanCoordinate {
      w_off: 0,
      row_off: 0,
      yt_off: 0,
      xt_off: 0,
    };
    assert_eq!(coords[0], first);
    assert_eq!(coords[1].xt_off, 1);
    assert_eq!(coords[2].yt_off, 1);
    assert_eq!(coords[2].xt_off, 0);
    // one sweep is 4 steps, then the kernel row advances
    assert_eq!(coords[4].row_off, 1);
    assert_eq!(coords[4].w_off, 0);
    // all three rows before the channel advances
    assert_eq!(coords[12].row_off, 0);
    assert_eq!(coords[12].w_off, 1);
    let last = coords.last().unwrap();
    assert_eq!((last.w_off, last.row_off, last.yt_off, last.xt_off), (1, 2, 1, 1));
  }

  #[test]
  fn test_k1_skips_rows() {
    let coords: Vec<_> = Scan::new(KernelSize::K1, 3, 2, 1).collect();
    assert!(coords.iter().all(|c| c.row_off == 0));
    assert_eq!(coords.iter().map(|c| c.w_off).max(), Some(2));
  }

  #[test]
  fn test_k5_halves() {
    let coords: Vec<_> = Scan::new(KernelSize::K5, 2, 1, 1).collect();
    assert_eq!(coords.len(), 20);
    assert_eq!(coords[4].row_off, 4);
    assert_eq!(coords[5].w_off, 1);
    assert_eq!(coords[5].half(), 1);
    assert_eq!(coords[5].channel(KernelSize::K5), 0);
    assert_eq!(coords[10].channel(KernelSize::K5), 1);
    assert_eq!(coords[10].half(), 0);
  }

  #[test]
  fn test_slot_reuse_distance_is_one_sweep() {
    let ydim = 3;
    let row_vectors = 2;
    let mut last_seen: HashMap<usize, usize> = HashMap::new();
    for (i, c) in Scan::new(KernelSize::K3, 2, ydim, row_vectors).enumerate() {
      let slot = c.slot(row_vectors);
      if let Some(prev) = last_seen.insert(slot, i) {
        assert_eq!(i - prev, ydim * row_vectors);
      }
    }
    assert_eq!(last_seen.len(), ydim * row_vectors);
  }
}
