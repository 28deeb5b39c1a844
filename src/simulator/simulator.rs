use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::io::Result;
use std::path::Path;

use super::config::config::{validate_config, AppConfig, JobSection};
use super::sim::mode::StepMode;
use super::sim::shell::{Command, Shell};
use super::sim::trace::TraceWriter;
use super::utils::report::{print_records, print_report, JobReport};
use crate::arch::dirconv::layout::{pack_input, pack_weights, unpack_output, TensorShape};
use crate::arch::dirconv::reference::conv2d_reference;
use crate::arch::dirconv::{ConvBuffers, Engine, Invocation, RunSummary, Vec16};

/// Dense tensors of a synthetic job and their packed engine buffers.
#[derive(Debug, Clone)]
pub struct Workload {
  pub input_shape: TensorShape,
  pub output_shape: TensorShape,
  pub row_vectors: usize,
  pub input: Vec<f32>,
  pub weights: Vec<f32>,
  pub bias: Vec<f32>,
  pub packed_input: Vec<Vec16>,
  pub packed_weights: Vec<Vec16>,
}

impl Workload {
  /// Uniform samples in [-1, 1) from a seeded PCG stream.
  pub fn generate(job: &JobSection) -> Self {
    let mut rng = Pcg64::seed_from_u64(job.seed);
    let input_shape = TensorShape::new(job.images, job.in_channels, job.height, job.width);
    let output_shape = TensorShape::new(job.images, job.out_channels, job.height, job.width);
    let k = job.kernel.size();

    let input: Vec<f32> = (0..input_shape.len()).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let weights: Vec<f32> = (0..job.out_channels * job.in_per_group() * k * k)
      .map(|_| rng.gen_range(-1.0f32..1.0))
      .collect();
    let bias: Vec<f32> = (0..job.out_channels).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    let row_vectors = job.params(0, 0).row_vectors();
    Self {
      packed_input: pack_input(&input, input_shape, row_vectors),
      packed_weights: pack_weights(&weights, job.out_channels, job.in_per_group(), job.kernel),
      input_shape,
      output_shape,
      row_vectors,
      input,
      weights,
      bias,
    }
  }

  pub fn output_len(&self) -> usize {
    self.output_shape.packed_len(self.row_vectors)
  }

  pub fn reference(&self, job: &JobSection) -> Vec<f32> {
    conv2d_reference(
      &self.input,
      self.input_shape,
      &self.weights,
      &self.bias,
      job.out_channels,
      job.kernel.size(),
      job.groups,
    )
  }
}

/// Largest absolute error and the number of samples outside `tolerance`, relative
/// to the reference magnitude once it exceeds one.
pub fn compare(actual: &[f32], expected: &[f32], tolerance: f32) -> (f32, usize) {
  let mut max_err = 0.0f32;
  let mut mismatches = 0;
  for (a, e) in actual.iter().zip(expected) {
    let err = (a - e).abs();
    max_err = max_err.max(err);
    if !(err <= tolerance * e.abs().max(1.0)) {
      mismatches += 1;
    }
  }
  (max_err, mismatches)
}

pub struct Simulator {
  config: AppConfig,
  engine: Engine,
  step_mode: StepMode,
}

impl Simulator {
  pub fn new(config: AppConfig) -> Self {
    let engine = Engine::new(config.engine_config());
    let step_mode = StepMode::from_flag(config.simulation.step_mode);
    Self {
      config,
      engine,
      step_mode,
    }
  }

  pub fn from_app_config(config: &AppConfig) -> Result<Self> {
    validate_config(config)?;
    Ok(Self::new(config.clone()))
  }

  /// Runs the configured job: one invocation per (image, group), then verification.
  pub fn run(&mut self) -> Result<JobReport> {
    let job = self.config.job.clone();
    let quiet = self.config.simulation.quiet;
    let workload = Workload::generate(&job);
    let mut output = vec![Vec16::ZERO; workload.output_len()];
    let mut trace = match self.config.simulation.trace_file.as_str() {
      "" => None,
      path => Some(TraceWriter::create(Path::new(path))?),
    };
    let mut shell = match self.step_mode {
      StepMode::Step => {
        println!("Step mode - Press Enter to run one batch, 'c' to continue, 'q' to quit");
        Some(Shell::new()?)
      },
      StepMode::Continuous => None,
    };

    log::info!(
      "job: {} image(s), {} -> {} channels in {} group(s), {}x{}, k={}, lanes={}{}",
      job.images,
      job.in_channels,
      job.out_channels,
      job.groups,
      job.height,
      job.width,
      job.kernel.size(),
      self.engine.config().lanes,
      if self.engine.config().parallel { ", parallel" } else { "" }
    );

    let mut report = JobReport::default();
    'job: for image in 0..job.images {
      for group in 0..job.groups {
        let params = job.params(image, group);
        let bufs = ConvBuffers::new(&workload.packed_input, &workload.packed_weights, &workload.bias, &mut output);
        let mut inv = Invocation::new(&self.engine, &params, bufs)?;

        if let Some(sh) = shell.as_mut() {
          match step_invocation(sh, &mut inv, image, group)? {
            Command::Quit => {
              report.aborted = true;
              break 'job;
            },
            Command::Continue => shell = None,
            _ => {},
          }
        }

        let summary: RunSummary = inv.finish()?;
        if !quiet {
          print_records(&format!("image {} group {}", image, group), &summary.records);
        }
        if let Some(writer) = trace.as_mut() {
          writer.write_records(image, group, &summary.records)?;
        }
        report.absorb(&summary);
      }
    }

    if let Some(writer) = trace {
      let lines = writer.lines();
      writer.finish()?;
      log::info!("trace: {} record(s) written", lines);
    }

    if job.verify && !report.aborted {
      let expected = workload.reference(&job);
      let actual = unpack_output(&output, workload.output_shape, workload.row_vectors);
      let (max_err, mismatches) = compare(&actual, &expected, job.tolerance);
      report.max_abs_error = Some(max_err);
      report.mismatches = mismatches;
      if mismatches > 0 {
        log::warn!("verify: {} of {} samples outside tolerance {}", mismatches, actual.len(), job.tolerance);
      } else {
        log::info!("verify: ok, max |err| = {:.3e}", max_err);
      }
    }

    print_report(&report);
    Ok(report)
  }
}

/// Drives one invocation from the shell until it is done, the user continues, or
/// the user quits. Returns the command that ended the loop.
fn step_invocation(shell: &mut Shell, inv: &mut Invocation<'_, '_>, image: usize, group: usize) -> Result<Command> {
  while !inv.is_done() {
    match shell.read_command()? {
      Command::Step(n) => {
        for _ in 0..n {
          let Some(batch) = inv.step()? else {
            break;
          };
          println!(
            "image {} group {} pass {} batch {}: {} steps, {} lane(s) stored",
            image, group, batch.pass, batch.batch, batch.mac_steps, batch.lanes_stored
          );
        }
      },
      Command::Info => match inv.position() {
        Some((pass, batch)) => println!(
          "image {} group {}: next pass {}/{} batch {}/{}",
          image,
          group,
          pass,
          inv.tiling().read_passes,
          batch,
          inv.tiling().batches
        ),
        None => println!("image {} group {}: done", image, group),
      },
      cmd @ (Command::Continue | Command::Quit) => return Ok(cmd),
    }
  }
  Ok(Command::Step(0))
}
