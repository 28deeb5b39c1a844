//! Pass orchestration: channel-burst passes x output-channel batches.
//!
//! Within one invocation every (pass, batch) pair is a closed unit: stage weights,
//! seed or reload the accumulator, sweep the scan coordinates, store back. Batches
//! of the same pass share only the read-only input tile and bias, so they can run
//! in any order or concurrently. Passes must run in order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::bank::{Accumulator, BiasVector, InputTile, WeightSet};
use super::error::ConvError;
use super::input_stage::{input_stage, Taps, TAPS};
use super::macball::MacBall;
use super::params::{ConvParams, ScratchLimits, Tiling};
use super::scan::Scan;
use super::tdma_loader::{InputTileLoader, WeightStager};
use super::tdma_storer::OutputTileManager;
use super::vec16::{Vec16, VEC_WIDTH};
use super::wt_set::wt_set;
use crate::engine_record;
use crate::simulator::sim::records::EngineRecord;

/// Engine-wide settings, shared by every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Output channels computed side by side (OCFACT).
  pub lanes: usize,
  /// Fan the batches of each pass out over the rayon pool.
  pub parallel: bool,
  /// Check every accumulator access against `min_reuse_distance`.
  pub hazard_check: bool,
  pub min_reuse_distance: usize,
  pub limits: ScratchLimits,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lanes: 4,
      parallel: false,
      hazard_check: false,
      min_reuse_distance: 1,
      limits: ScratchLimits::default(),
    }
  }
}

/// The four external buffers of one invocation.
#[derive(Debug)]
pub struct ConvBuffers<'a> {
  pub input: &'a [Vec16],
  pub weights: &'a [Vec16],
  pub bias: &'a [f32],
  pub output: &'a mut [Vec16],
}

impl<'a> ConvBuffers<'a> {
  pub fn new(input: &'a [Vec16], weights: &'a [Vec16], bias: &'a [f32], output: &'a mut [Vec16]) -> Self {
    Self {
      input,
      weights,
      bias,
      output,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
  pub pass: usize,
  pub batch: usize,
  pub mac_steps: u64,
  pub lanes_stored: usize,
  pub records: Vec<EngineRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
  pub passes: usize,
  pub batches: usize,
  pub mac_steps: u64,
  pub lanes_stored: usize,
  pub records: Vec<EngineRecord>,
}

impl RunSummary {
  fn absorb(&mut self, report: BatchReport) {
    self.batches += 1;
    self.mac_steps += report.mac_steps;
    self.lanes_stored += report.lanes_stored;
    self.records.extend(report.records);
  }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
  config: EngineConfig,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Runs every pass of the invocation.
  pub fn run(&self, params: &ConvParams, bufs: ConvBuffers<'_>) -> Result<RunSummary, ConvError> {
    Invocation::new(self, params, bufs)?.finish()
  }

  /// Runs pass `pass` only. Pass 0 seeds the accumulators with bias; later passes
  /// resume from the partial sums already in the output buffer.
  pub fn run_pass(&self, params: &ConvParams, bufs: ConvBuffers<'_>, pass: usize) -> Result<RunSummary, ConvError> {
    if pass >= params.read_passes {
      return Err(ConvError::ParamOutOfRange {
        name: "pass",
        value: pass,
        min: 0,
        max: params.read_passes.saturating_sub(1),
      });
    }
    Invocation::with_passes(self, params, bufs, pass..pass + 1)?.finish()
  }
}

/// Read-only state shared by the batches of one pass.
struct BatchContext<'c> {
  config: &'c EngineConfig,
  tiling: &'c Tiling,
  tile: &'c InputTile,
  bias: &'c BiasVector,
  weights: &'c [Vec16],
  // passes covered by the invocation, for deterministic step numbering
  origin: Range<usize>,
}

impl BatchContext<'_> {
  fn base_step(&self, pass: usize, batch: usize) -> u64 {
    ((pass - self.origin.start) * self.tiling.batches + batch) as u64 * self.tiling.mac_iterations() as u64
  }
}

fn run_batch(ctx: &BatchContext<'_>, pass: usize, batch: usize, chunk: &mut [Vec16]) -> Result<BatchReport, ConvError> {
  let tiling = ctx.tiling;
  let limits = &ctx.config.limits;
  let manager = OutputTileManager::new(tiling);
  let base = ctx.base_step(pass, batch);
  let mut report = BatchReport {
    pass,
    batch,
    ..BatchReport::default()
  };

  let mut acc = Accumulator::new(tiling.lanes, limits.accumulator_capacity);
  if pass == 0 {
    manager.seed_bias(batch, ctx.bias, &mut acc)?;
    engine_record!(report.records, base, "seed_bias", format!("pass={}, batch={}", pass, batch));
  } else {
    manager.reload(batch, chunk, &mut acc)?;
    engine_record!(report.records, base, "reload_output", format!("pass={}, batch={}", pass, batch));
  }

  let mut weights = WeightSet::new(tiling.lanes, limits.weight_capacity);
  let staged = WeightStager::new(ctx.weights).load(tiling, pass, batch, &mut weights)?;
  engine_record!(report.records, base, "load_weights", format!("batch={}, lanes={}", batch, staged));

  let mut mac = MacBall::new(tiling.kernel, tiling.row_vectors);
  if ctx.config.hazard_check {
    mac = mac.with_scoreboard(ctx.config.min_reuse_distance);
  }
  let mut wt: Vec<Taps> = vec![[[0.0; TAPS]; VEC_WIDTH]; tiling.lanes];
  for coord in Scan::new(tiling.kernel, tiling.burst_channels, tiling.ydim, tiling.row_vectors) {
    let it = input_stage(ctx.tile, tiling.kernel, &coord);
    wt_set(&weights, tiling.kernel, &coord, &mut wt);
    mac.mac(&coord, &it, &wt, &mut acc)?;
  }
  report.mac_steps = mac.steps();
  engine_record!(
    report.records,
    base + report.mac_steps,
    "mac_sweep",
    format!("batch={}, steps={}", batch, report.mac_steps)
  );

  report.lanes_stored = manager.store(batch, &acc, chunk);
  engine_record!(
    report.records,
    base + report.mac_steps,
    "store_output",
    format!("batch={}, lanes={}", batch, report.lanes_stored)
  );
  log::debug!(
    "pass={} batch={} steps={} stored={}",
    pass,
    batch,
    report.mac_steps,
    report.lanes_stored
  );
  Ok(report)
}

/// A validated, steppable invocation. Nothing is touched until the first `step`.
pub struct Invocation<'e, 'b> {
  engine: &'e Engine,
  tiling: Tiling,
  bufs: ConvBuffers<'b>,
  passes: Range<usize>,
  tile: InputTile,
  bias: BiasVector,
  loaded_pass: Option<usize>,
  cursor: Option<(usize, usize)>,
  summary: RunSummary,
}

impl<'e, 'b> Invocation<'e, 'b> {
  pub fn new(engine: &'e Engine, params: &ConvParams, bufs: ConvBuffers<'b>) -> Result<Self, ConvError> {
    Self::with_passes(engine, params, bufs, 0..params.read_passes)
  }

  fn with_passes(
    engine: &'e Engine,
    params: &ConvParams,
    bufs: ConvBuffers<'b>,
    passes: Range<usize>,
  ) -> Result<Self, ConvError> {
    let config = &engine.config;
    let tiling = params.validate(&config.limits, config.lanes, config.min_reuse_distance)?;
    check_buffers(&tiling, &bufs)?;

    let bias = InputTileLoader::load_bias(bufs.bias, &tiling)?;
    let tile = InputTile::new(config.limits.input_capacity, tiling.ydim, tiling.row_vectors);

    log::info!(
      "conv k={} group={}/{} image={} in={} out={} burst={}x{} {}x{} lanes={} batches={}",
      tiling.kernel.size(),
      tiling.group,
      tiling.num_groups,
      tiling.image_offset,
      tiling.in_channels,
      tiling.out_channels,
      tiling.read_passes,
      tiling.burst_channels,
      tiling.ydim,
      params.xdim,
      tiling.lanes,
      tiling.batches
    );

    let mut summary = RunSummary::default();
    engine_record!(
      summary.records,
      0,
      "load_bias",
      format!("group={}, count={}", tiling.group, bias.len())
    );

    Ok(Self {
      engine,
      tiling,
      bufs,
      cursor: Some((passes.start, 0)),
      passes,
      tile,
      bias,
      loaded_pass: None,
      summary,
    })
  }

  pub fn tiling(&self) -> &Tiling {
    &self.tiling
  }

  /// Next (pass, batch) to run, `None` once finished.
  pub fn position(&self) -> Option<(usize, usize)> {
    self.cursor
  }

  pub fn is_done(&self) -> bool {
    self.cursor.is_none()
  }

  pub fn records(&self) -> &[EngineRecord] {
    &self.summary.records
  }

  /// Total (pass, batch) units of this invocation.
  pub fn total_units(&self) -> usize {
    self.passes.len() * self.tiling.batches
  }

  fn load_pass(&mut self, pass: usize) -> Result<(), ConvError> {
    let range = InputTileLoader::new(self.bufs.input).load(&self.tiling, pass, &mut self.tile)?;
    let step = (pass - self.passes.start) as u64 * self.tiling.batches as u64 * self.tiling.mac_iterations() as u64;
    engine_record!(
      self.summary.records,
      step,
      "load_input",
      format!("pass={}, addr={:#x}, count={}", pass, range.start, range.len())
    );
    self.loaded_pass = Some(pass);
    self.summary.passes += 1;
    Ok(())
  }

  fn advance(&mut self, pass: usize, batch: usize) {
    self.cursor = if batch + 1 < self.tiling.batches {
      Some((pass, batch + 1))
    } else if pass + 1 < self.passes.end {
      Some((pass + 1, 0))
    } else {
      None
    };
  }

  /// Runs the next (pass, batch) unit.
  pub fn step(&mut self) -> Result<Option<BatchReport>, ConvError> {
    let Some((pass, batch)) = self.cursor else {
      return Ok(None);
    };
    if self.loaded_pass != Some(pass) {
      self.load_pass(pass)?;
    }

    let ctx = BatchContext {
      config: &self.engine.config,
      tiling: &self.tiling,
      tile: &self.tile,
      bias: &self.bias,
      weights: self.bufs.weights,
      origin: self.passes.clone(),
    };
    let range = batch_range(&self.tiling, batch);
    let report = run_batch(&ctx, pass, batch, &mut self.bufs.output[range])?;

    self.summary.absorb(report.clone());
    self.advance(pass, batch);
    Ok(Some(report))
  }

  /// Runs everything left. In parallel mode whole passes fan out over rayon.
  pub fn finish(mut self) -> Result<RunSummary, ConvError> {
    // finish a pass that was entered by single stepping
    while let Some((_, batch)) = self.cursor {
      if batch == 0 && self.engine.config.parallel {
        break;
      }
      self.step()?;
    }

    while let Some((pass, _)) = self.cursor {
      self.load_pass(pass)?;
      let ctx = BatchContext {
        config: &self.engine.config,
        tiling: &self.tiling,
        tile: &self.tile,
        bias: &self.bias,
        weights: self.bufs.weights,
        origin: self.passes.clone(),
      };
      let region = &mut self.bufs.output[self.tiling.output_region()];
      let chunk_len = self.tiling.lanes * self.tiling.plane;
      let reports = region
        .par_chunks_mut(chunk_len)
        .enumerate()
        .map(|(batch, chunk)| run_batch(&ctx, pass, batch, chunk))
        .collect::<Result<Vec<_>, ConvError>>()?;
      for report in reports {
        self.summary.absorb(report);
      }
      self.cursor = if pass + 1 < self.passes.end { Some((pass + 1, 0)) } else { None };
    }

    log::info!(
      "conv done: passes={} batches={} steps={}",
      self.summary.passes,
      self.summary.batches,
      self.summary.mac_steps
    );
    Ok(self.summary)
  }
}

/// Output vectors owned by batch `batch`: its valid lanes, contiguous.
fn batch_range(tiling: &Tiling, batch: usize) -> Range<usize> {
  let region = tiling.output_region();
  let start = tiling.output_offset(tiling.lane_channel(batch, 0));
  let end = tiling.output_offset(tiling.lane_channel(batch + 1, 0)).min(region.end);
  start..end
}

fn check_buffers(tiling: &Tiling, bufs: &ConvBuffers<'_>) -> Result<(), ConvError> {
  let (input, weights, bias, output) = tiling.required_lengths();
  let checks = [
    ("input", input, bufs.input.len()),
    ("weights", weights, bufs.weights.len()),
    ("bias", bias, bufs.bias.len()),
    ("output", output, bufs.output.len()),
  ];
  for (buffer, required, actual) in checks {
    if actual < required {
      return Err(ConvError::BufferTooSmall {
        buffer,
        required,
        actual,
      });
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::dirconv::params::KernelSize;

  fn ones_job() -> (ConvParams, Vec<Vec16>, Vec<Vec16>, Vec<f32>) {
    // 1 -> 1 channel, 5x5 image of ones in one vector per row, 3x3 ones filter
    let params = ConvParams::for_image(1, 1, 1, 5, 5, KernelSize::K3);
    let mut row = [0.0f32; VEC_WIDTH];
    row[..5].fill(1.0);
    let input = vec![Vec16(row); 5];
    let weights = vec![Vec16::from_slice(&[1.0; 9])];
    (params, input, weights, vec![0.0])
  }

  #[test]
  fn test_all_ones_3x3() {
    let (params, input, weights, bias) = ones_job();
    let mut output = vec![Vec16::ZERO; 5];
    let engine = Engine::default();
    let summary = engine
      .run(&params, ConvBuffers::new(&input, &weights, &bias, &mut output))
      .unwrap();
    assert_eq!(summary.passes, 1);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.mac_steps, 5 * 3);
    assert_eq!(summary.lanes_stored, 1);

    let expected = [
      [4.0, 6.0, 6.0, 6.0, 4.0],
      [6.0, 9.0, 9.0, 9.0, 6.0],
      [6.0, 9.0, 9.0, 9.0, 6.0],
      [6.0, 9.0, 9.0, 9.0, 6.0],
      [4.0, 6.0, 6.0, 6.0, 4.0],
    ];
    for (y, row) in expected.iter().enumerate() {
      assert_eq!(&output[y].0[..5], row, "row {}", y);
    }
  }

  #[test]
  fn test_step_by_step_matches_run() {
    let params = ConvParams::for_image(4, 6, 2, 3, 4, KernelSize::K3);
    let input: Vec<Vec16> = (0..12).map(|i| Vec16::splat(i as f32 * 0.25)).collect();
    let weights: Vec<Vec16> = (0..24).map(|i| Vec16::splat(1.0 - i as f32 * 0.05)).collect();
    let bias: Vec<f32> = (0..6).map(|i| i as f32).collect();
    let engine = Engine::new(EngineConfig {
      lanes: 4,
      ..EngineConfig::default()
    });

    let mut whole = vec![Vec16::ZERO; 18];
    engine
      .run(&params, ConvBuffers::new(&input, &weights, &bias, &mut whole))
      .unwrap();

    let mut stepped = vec![Vec16::ZERO; 18];
    let mut inv = Invocation::new(&engine, &params, ConvBuffers::new(&input, &weights, &bias, &mut stepped)).unwrap();
    assert_eq!(inv.total_units(), 4);
    assert_eq!(inv.position(), Some((0, 0)));
    let first = inv.step().unwrap().unwrap();
    assert_eq!((first.pass, first.batch, first.lanes_stored), (0, 0, 4));
    let second = inv.step().unwrap().unwrap();
    assert_eq!((second.pass, second.batch, second.lanes_stored), (0, 1, 2));
    assert_eq!(inv.position(), Some((1, 0)));
    let summary = inv.finish().unwrap();
    assert_eq!(summary.passes, 2);
    assert_eq!(summary.batches, 4);

    let bits = |v: &[Vec16]| v.iter().map(Vec16::to_bits).collect::<Vec<_>>();
    assert_eq!(bits(&whole), bits(&stepped));
  }

  #[test]
  fn test_run_pass_out_of_range() {
    let (params, input, weights, bias) = ones_job();
    let mut output = vec![Vec16::ZERO; 5];
    let err = Engine::default()
      .run_pass(&params, ConvBuffers::new(&input, &weights, &bias, &mut output), 1)
      .unwrap_err();
    assert!(matches!(err, ConvError::ParamOutOfRange { name: "pass", .. }));
  }

  #[test]
  fn test_short_output_rejected_before_work() {
    let (params, input, weights, bias) = ones_job();
    let mut output = vec![Vec16::splat(-1.0); 4];
    let err = Engine::default()
      .run(&params, ConvBuffers::new(&input, &weights, &bias, &mut output))
      .unwrap_err();
    assert_eq!(
      err,
      ConvError::BufferTooSmall {
        buffer: "output",
        required: 5,
        actual: 4
      }
    );
    assert!(output.iter().all(|v| *v == Vec16::splat(-1.0)));
  }

  #[test]
  fn test_records_trace_the_protocol() {
    let (params, input, weights, bias) = ones_job();
    let mut output = vec![Vec16::ZERO; 5];
    let summary = Engine::default()
      .run(&params, ConvBuffers::new(&input, &weights, &bias, &mut output))
      .unwrap();
    let actions: Vec<&str> = summary.records.iter().map(|r| r.action.as_str()).collect();
    assert_eq!(
      actions,
      ["load_bias", "load_input", "seed_bias", "load_weights", "mac_sweep", "store_output"]
    );
    assert_eq!(summary.records.last().unwrap().step, 15);
  }

  #[test]
  fn test_hazard_check_passes_on_valid_sweep() {
    let (params, input, weights, bias) = ones_job();
    let mut output = vec![Vec16::ZERO; 5];
    let engine = Engine::new(EngineConfig {
      hazard_check: true,
      min_reuse_distance: 5,
      ..EngineConfig::default()
    });
    engine
      .run(&params, ConvBuffers::new(&input, &weights, &bias, &mut output))
      .unwrap();
    assert_eq!(output[2][2], 9.0);
  }
}
