use super::error::ConvError;
use super::vec16::Vec16;

/// Scratchpad SRAM: a contiguous local buffer with a hard capacity in vectors.
#[derive(Debug, Clone)]
pub struct Sram {
  name: &'static str,
  capacity: usize,
  data: Vec<Vec16>,
}

impl Sram {
  pub fn new(name: &'static str, capacity: usize) -> Self {
    Self {
      name,
      capacity,
      data: Vec::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  fn reserve(&mut self, len: usize) -> Result<(), ConvError> {
    if len > self.capacity {
      return Err(ConvError::ScratchOverflow {
        scratch: self.name,
        required: len,
        capacity: self.capacity,
      });
    }
    self.data.clear();
    Ok(())
  }

  /// Raw copy of `src` into the scratchpad, replacing its contents.
  pub fn write_batch(&mut self, src: &[Vec16]) -> Result<(), ConvError> {
    self.reserve(src.len())?;
    self.data.extend_from_slice(src);
    Ok(())
  }

  /// Fills `len` entries with `value`.
  pub fn fill(&mut self, len: usize, value: Vec16) -> Result<(), ConvError> {
    self.reserve(len)?;
    self.data.resize(len, value);
    Ok(())
  }

  /// Out-of-range reads return zero.
  pub fn read(&self, addr: usize) -> Vec16 {
    self.data.get(addr).copied().unwrap_or(Vec16::ZERO)
  }

  pub fn slot_mut(&mut self, addr: usize) -> &mut Vec16 {
    &mut self.data[addr]
  }

  pub fn as_slice(&self) -> &[Vec16] {
    &self.data
  }
}

/// One channel burst of input rows, `burst x ydim x row_vectors` vectors.
#[derive(Debug, Clone)]
pub struct InputTile {
  pub sram: Sram,
  pub ydim: usize,
  pub row_vectors: usize,
}

impl InputTile {
  pub fn new(capacity: usize, ydim: usize, row_vectors: usize) -> Self {
    Self {
      sram: Sram::new("input", capacity),
      ydim,
      row_vectors,
    }
  }

  /// Address of vector `xt` in row `y` of burst channel `channel`.
  pub fn addr(&self, channel: usize, y: usize, xt: usize) -> usize {
    (channel * self.ydim + y) * self.row_vectors + xt
  }

  pub fn vector(&self, channel: usize, y: usize, xt: usize) -> Vec16 {
    self.sram.read(self.addr(channel, y, xt))
  }
}

/// Per-lane filter taps for one (pass, batch) pair.
#[derive(Debug, Clone)]
pub struct WeightSet {
  pub lanes: Vec<Sram>,
}

impl WeightSet {
  pub fn new(lanes: usize, capacity: usize) -> Self {
    Self {
      lanes: (0..lanes).map(|_| Sram::new("weight", capacity)).collect(),
    }
  }

  pub fn vector(&self, lane: usize, w_off: usize) -> Vec16 {
    self.lanes[lane].read(w_off)
  }
}

/// Per-lane partial sums for the whole spatial tile of one batch.
#[derive(Debug, Clone)]
pub struct Accumulator {
  pub lanes: Vec<Sram>,
}

impl Accumulator {
  pub fn new(lanes: usize, capacity: usize) -> Self {
    Self {
      lanes: (0..lanes).map(|_| Sram::new("accumulator", capacity)).collect(),
    }
  }

  pub fn lane(&self, lane: usize) -> &[Vec16] {
    self.lanes[lane].as_slice()
  }
}

/// Bias values of the current group.
#[derive(Debug, Clone, Default)]
pub struct BiasVector {
  values: Vec<f32>,
}

impl BiasVector {
  pub fn new(values: Vec<f32>) -> Self {
    Self { values }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Channels beyond the group see a zero bias.
  pub fn get(&self, oc: usize) -> f32 {
    self.values.get(oc).copied().unwrap_or(0.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sram_write_and_read() {
    let mut sram = Sram::new("input", 4);
    sram
      .write_batch(&[Vec16::splat(1.0), Vec16::splat(2.0)])
      .unwrap();
    assert_eq!(sram.len(), 2);
    assert_eq!(sram.read(1), Vec16::splat(2.0));
    assert_eq!(sram.read(3), Vec16::ZERO); // Out of bounds
  }

  #[test]
  fn test_sram_capacity() {
    let mut sram = Sram::new("weight", 2);
    let err = sram.fill(3, Vec16::ZERO).unwrap_err();
    assert_eq!(
      err,
      ConvError::ScratchOverflow {
        scratch: "weight",
        required: 3,
        capacity: 2
      }
    );
  }

  #[test]
  fn test_sram_refill_replaces_contents() {
    let mut sram = Sram::new("accumulator", 8);
    sram.fill(4, Vec16::splat(3.0)).unwrap();
    sram.fill(2, Vec16::splat(5.0)).unwrap();
    assert_eq!(sram.len(), 2);
    assert_eq!(sram.read(0), Vec16::splat(5.0));
  }

  #[test]
  fn test_input_tile_addr() {
    let tile = InputTile::new(64, 3, 2);
    assert_eq!(tile.addr(0, 0, 0), 0);
    assert_eq!(tile.addr(0, 1, 1), 3);
    assert_eq!(tile.addr(1, 2, 1), 11);
  }

  #[test]
  fn test_bias_beyond_group_is_zero() {
    let bias = BiasVector::new(vec![0.5, 1.5]);
    assert_eq!(bias.get(1), 1.5);
    assert_eq!(bias.get(2), 0.0);
  }
}
