/// Global logging configuration
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static QUIET: AtomicBool = AtomicBool::new(false);

/// Quiet mode raises the default filter to `warn`. Call before `init_log`.
pub fn set_quiet(quiet: bool) {
  QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
  QUIET.load(Ordering::Relaxed)
}

/// Initialises `env_logger` once. `RUST_LOG` takes precedence over the default
/// filter.
pub fn init_log() {
  INIT.call_once(|| {
    let default = if is_quiet() { "warn" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
      .format_timestamp(None)
      .is_test(cfg!(test))
      .try_init();
  });
}
