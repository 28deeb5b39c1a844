use ::config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::arch::dirconv::{ConvParams, EngineConfig, KernelSize, ScratchLimits};

const DEFAULT_CONFIG: &str = include_str!("default.toml");
const ENV_PREFIX: &str = "TILECONV";

/// 引擎配置部分
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
  pub lanes: usize,
  pub parallel: bool,
  pub hazard_check: bool,
  pub min_reuse_distance: usize,
}

impl Default for EngineSection {
  fn default() -> Self {
    let engine = EngineConfig::default();
    Self {
      lanes: engine.lanes,
      parallel: engine.parallel,
      hazard_check: engine.hazard_check,
      min_reuse_distance: engine.min_reuse_distance,
    }
  }
}

/// Synthetic workload run by the driver. Channel counts cover all groups.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobSection {
  pub images: usize,
  pub in_channels: usize,
  pub out_channels: usize,
  pub burst_channels: usize,
  pub height: usize,
  pub width: usize,
  pub kernel: KernelSize,
  pub groups: usize,
  pub seed: u64,
  pub verify: bool,
  pub tolerance: f32,
}

impl Default for JobSection {
  fn default() -> Self {
    Self {
      images: 1,
      in_channels: 16,
      out_channels: 8,
      burst_channels: 8,
      height: 14,
      width: 14,
      kernel: KernelSize::K3,
      groups: 1,
      seed: 42,
      verify: true,
      tolerance: 1e-4,
    }
  }
}

impl JobSection {
  pub fn in_per_group(&self) -> usize {
    self.in_channels / self.groups.max(1)
  }

  pub fn out_per_group(&self) -> usize {
    self.out_channels / self.groups.max(1)
  }

  /// Engine parameters for one (image, group) invocation.
  pub fn params(&self, image: usize, group: usize) -> ConvParams {
    ConvParams::for_image(
      self.in_per_group(),
      self.out_per_group(),
      self.burst_channels,
      self.height,
      self.width,
      self.kernel,
    )
    .with_group(group, self.groups)
    .with_image_offset(image)
  }
}

/// 模拟配置部分
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
  pub quiet: bool,
  pub step_mode: bool,
  /// Empty disables tracing.
  pub trace_file: String,
}

/// 统一的应用配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
  pub engine: EngineSection,
  pub limits: ScratchLimits,
  pub job: JobSection,
  pub simulation: SimulationSection,
}

impl AppConfig {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      lanes: self.engine.lanes,
      parallel: self.engine.parallel,
      hazard_check: self.engine.hazard_check,
      min_reuse_distance: self.engine.min_reuse_distance,
      limits: self.limits.clone(),
    }
  }

  /// Effective configuration as TOML, for `--dump-config`.
  pub fn to_toml(&self) -> io::Result<String> {
    toml::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
  }
}

/// CLI flags that override the layered configuration. `None` / `false` leave the
/// configured value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
  pub quiet: bool,
  pub step: bool,
  pub trace_file: Option<String>,
  pub kernel: Option<usize>,
  pub lanes: Option<usize>,
  pub parallel: bool,
  pub seed: Option<u64>,
  pub no_verify: bool,
}

fn config_error(e: ::config::ConfigError) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, format!("failed to load configuration: {}", e))
}

/// Builds the layered configuration: embedded defaults, then `user_file`, then
/// environment variables (`TILECONV__SECTION__KEY`).
///
/// `env` replaces the process environment when given.
pub fn load_layers(user_file: Option<&Path>, env: Option<Map<String, String>>) -> io::Result<AppConfig> {
  let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
  if let Some(path) = user_file {
    if !path.exists() {
      return Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("configuration file {:?} not found", path),
      ));
    }
    builder = builder.add_source(File::from(path).format(FileFormat::Toml));
  }
  builder = builder.add_source(
    Environment::with_prefix(ENV_PREFIX)
      .separator("__")
      .try_parsing(true)
      .source(env),
  );

  builder
    .build()
    .map_err(config_error)?
    .try_deserialize::<AppConfig>()
    .map_err(config_error)
}

/// 应用CLI参数覆写配置
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &CliOverrides) -> io::Result<()> {
  if cli.quiet {
    config.simulation.quiet = true;
  }
  if cli.step {
    config.simulation.step_mode = true;
  }
  if let Some(file) = &cli.trace_file {
    config.simulation.trace_file = file.clone();
  }
  if let Some(size) = cli.kernel {
    config.job.kernel = KernelSize::from_size(size)?;
  }
  if let Some(lanes) = cli.lanes {
    config.engine.lanes = lanes;
  }
  if cli.parallel {
    config.engine.parallel = true;
  }
  if let Some(seed) = cli.seed {
    config.job.seed = seed;
  }
  if cli.no_verify {
    config.job.verify = false;
  }
  Ok(())
}

fn invalid(msg: String) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// 验证配置
///
/// Engine bounds are checked by building the parameters of every group, so a job
/// that passes here will not be rejected by the engine.
pub fn validate_config(config: &AppConfig) -> io::Result<()> {
  let job = &config.job;
  if job.images == 0 {
    return Err(invalid("job.images must be at least 1".to_string()));
  }
  if job.groups == 0 || job.in_channels % job.groups != 0 || job.out_channels % job.groups != 0 {
    return Err(invalid(format!(
      "job channels {} -> {} do not split into {} group(s)",
      job.in_channels, job.out_channels, job.groups
    )));
  }
  if job.burst_channels == 0 || job.in_per_group() % job.burst_channels != 0 {
    return Err(invalid(format!(
      "job.burst_channels {} must divide {} input channels per group",
      job.burst_channels,
      job.in_per_group()
    )));
  }
  if !(job.tolerance > 0.0) {
    return Err(invalid(format!("job.tolerance {} must be positive", job.tolerance)));
  }

  let engine = config.engine_config();
  for group in 0..job.groups {
    job
      .params(0, group)
      .validate(&engine.limits, engine.lanes, engine.min_reuse_distance)?;
  }
  Ok(())
}

/// 加载并合并配置
///
/// 流程：
/// 1. 默认配置
/// 2. 用户配置文件
/// 3. 环境变量
/// 4. CLI参数覆写
/// 5. 验证配置
pub fn load_config(user_file: Option<&Path>, cli: &CliOverrides) -> io::Result<AppConfig> {
  let mut config = load_layers(user_file, None)?;
  apply_cli_overrides(&mut config, cli)?;
  validate_config(&config)?;
  Ok(config)
}
