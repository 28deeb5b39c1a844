use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tileconv::simulator::config::config::{apply_cli_overrides, load_layers, validate_config, AppConfig, CliOverrides};
use tileconv::simulator::sim::trace::TraceWriter;
use tileconv::simulator::Simulator;
use tileconv::KernelSize;

fn temp_path(name: &str) -> PathBuf {
  std::env::temp_dir().join(format!("tileconv-{}-{}", std::process::id(), name))
}

fn write_user_file(name: &str, content: &str) -> PathBuf {
  let path = temp_path(name);
  fs::write(&path, content).unwrap();
  path
}

fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn user_file_overrides_defaults() {
  let path = write_user_file(
    "user.toml",
    r#"
[engine]
lanes = 8

[job]
kernel = 5
width = 30
"#,
  );
  let config = load_layers(Some(&path), Some(env(&[]))).unwrap();
  assert_eq!(config.engine.lanes, 8);
  assert_eq!(config.job.kernel, KernelSize::K5);
  assert_eq!(config.job.width, 30);
  // untouched keys keep their defaults
  assert_eq!(config.job.height, AppConfig::default().job.height);
  assert_eq!(config.limits, AppConfig::default().limits);
  fs::remove_file(path).unwrap();
}

#[test]
fn environment_overrides_user_file() {
  let path = write_user_file("env.toml", "[engine]\nlanes = 8\nparallel = false\n");
  let vars = env(&[
    ("TILECONV__ENGINE__LANES", "2"),
    ("TILECONV__ENGINE__PARALLEL", "true"),
    ("TILECONV__LIMITS__WEIGHT_CAPACITY", "256"),
    ("OTHER__ENGINE__LANES", "16"),
  ]);
  let config = load_layers(Some(&path), Some(vars)).unwrap();
  assert_eq!(config.engine.lanes, 2);
  assert!(config.engine.parallel);
  assert_eq!(config.limits.weight_capacity, 256);
  fs::remove_file(path).unwrap();
}

#[test]
fn cli_overrides_environment() {
  let vars = env(&[("TILECONV__JOB__SEED", "9"), ("TILECONV__JOB__KERNEL", "1")]);
  let mut config = load_layers(None, Some(vars)).unwrap();
  assert_eq!(config.job.seed, 9);
  assert_eq!(config.job.kernel, KernelSize::K1);

  let cli = CliOverrides {
    seed: Some(77),
    kernel: Some(3),
    quiet: true,
    ..CliOverrides::default()
  };
  apply_cli_overrides(&mut config, &cli).unwrap();
  assert_eq!(config.job.seed, 77);
  assert_eq!(config.job.kernel, KernelSize::K3);
  assert!(config.simulation.quiet);
  validate_config(&config).unwrap();
}

#[test]
fn missing_user_file_is_reported() {
  let err = load_layers(Some(&temp_path("does-not-exist.toml")), Some(env(&[]))).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn bad_kernel_in_file_is_rejected() {
  let path = write_user_file("bad.toml", "[job]\nkernel = 4\n");
  let err = load_layers(Some(&path), Some(env(&[]))).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidData);
  fs::remove_file(path).unwrap();
}

#[test]
fn validation_rejects_engine_bounds() {
  let mut config = AppConfig::default();
  config.limits.max_lanes = 2;
  let err = validate_config(&config).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let mut config = AppConfig::default();
  config.job.groups = 3;
  assert!(validate_config(&config).is_err());
}

#[test]
fn dumped_config_loads_back() {
  let mut config = AppConfig::default();
  config.engine.lanes = 6;
  config.job.kernel = KernelSize::K5;
  let path = write_user_file("dump.toml", &config.to_toml().unwrap());
  let loaded = load_layers(Some(&path), Some(env(&[]))).unwrap();
  assert_eq!(loaded, config);
  fs::remove_file(path).unwrap();
}

#[test]
fn simulator_writes_trace() {
  let path = temp_path("trace.jsonl");
  let mut config = AppConfig::default();
  config.job.in_channels = 4;
  config.job.out_channels = 4;
  config.job.burst_channels = 2;
  config.job.height = 4;
  config.job.width = 6;
  config.simulation.quiet = true;
  config.simulation.trace_file = path.to_string_lossy().to_string();

  let report = Simulator::from_app_config(&config).unwrap().run().unwrap();
  assert!(report.passed());

  let content = fs::read_to_string(&path).unwrap();
  let actions: Vec<String> = content
    .lines()
    .map(|line| {
      let v: serde_json::Value = serde_json::from_str(line).unwrap();
      v["action"].as_str().unwrap().to_string()
    })
    .collect();
  // bias, then per pass one input load and per batch four records
  assert_eq!(actions.len(), 1 + 2 * (1 + 4));
  assert_eq!(actions[0], "load_bias");
  assert_eq!(actions.last().map(String::as_str), Some("store_output"));
  fs::remove_file(path).unwrap();

  // writer is usable on any sink
  let sink = TraceWriter::new(Vec::new());
  assert_eq!(sink.lines(), 0);
}
