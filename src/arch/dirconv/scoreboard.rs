use std::collections::VecDeque;

use super::error::ConvError;

/// Tracks recent accumulator slot accesses and flags any slot touched again
/// before `distance` scan steps have passed.
#[derive(Debug, Clone)]
pub struct Scoreboard {
  distance: usize,
  step: usize,
  // (step, slot) of the last `distance - 1` accesses
  window: VecDeque<(usize, usize)>,
}

impl Scoreboard {
  pub fn new(distance: usize) -> Self {
    Self {
      distance,
      step: 0,
      window: VecDeque::with_capacity(distance),
    }
  }

  pub fn distance(&self) -> usize {
    self.distance
  }

  /// Records an access to `slot`; errors if the slot is still in flight.
  pub fn access(&mut self, slot: usize) -> Result<(), ConvError> {
    if let Some(&(prev, _)) = self.window.iter().find(|&&(_, s)| s == slot) {
      return Err(ConvError::Hazard {
        slot,
        distance: self.step - prev,
        required: self.distance,
      });
    }
    if self.distance > 1 {
      if self.window.len() == self.distance - 1 {
        self.window.pop_front();
      }
      self.window.push_back((self.step, slot));
    }
    self.step += 1;
    Ok(())
  }

  pub fn reset(&mut self) {
    self.step = 0;
    self.window.clear();
  }
}
