use clap::Parser;
use std::path::PathBuf;
use tileconv::simulator::config::{load_config, CliOverrides};
use tileconv::simulator::utils::log::{init_log, set_quiet};
use tileconv::simulator::Simulator;

/// tileconv - tiled direct-convolution engine driver
#[derive(Parser, Debug)]
#[command(name = "tileconv")]
#[command(version = "0.1.0")]
#[command(about = "Runs a synthetic convolution job through the tiled engine", long_about = None)]
struct Args {
  /// Configuration file layered over the built-in defaults
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Enable step mode (interactive, one batch at a time)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (suppress records and info logs)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path (JSON lines)
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Filter size: 1, 3 or 5
  #[arg(short, long, value_name = "K")]
  kernel: Option<usize>,

  /// Output channels computed side by side
  #[arg(short, long)]
  lanes: Option<usize>,

  /// Run the batches of each pass on the rayon pool
  #[arg(short, long)]
  parallel: bool,

  /// Seed of the synthetic workload
  #[arg(long)]
  seed: Option<u64>,

  /// Skip comparison against the reference convolution
  #[arg(long)]
  no_verify: bool,

  /// Print the effective configuration as TOML and exit
  #[arg(long)]
  dump_config: bool,
}

fn main() -> std::io::Result<()> {
  let args = Args::parse();

  let cli = CliOverrides {
    quiet: args.quiet,
    step: args.step,
    trace_file: args.trace_file,
    kernel: args.kernel,
    lanes: args.lanes,
    parallel: args.parallel,
    seed: args.seed,
    no_verify: args.no_verify,
  };
  let config = load_config(args.config.as_deref(), &cli)?;

  if args.dump_config {
    print!("{}", config.to_toml()?);
    return Ok(());
  }

  set_quiet(config.simulation.quiet);
  init_log();

  let mut simulator = Simulator::from_app_config(&config)?;
  let report = simulator.run()?;
  if !report.passed() && !report.aborted {
    return Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      format!("{} sample(s) disagree with the reference", report.mismatches),
    ));
  }
  Ok(())
}
