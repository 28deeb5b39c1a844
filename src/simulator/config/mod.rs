pub mod config;

pub use self::config::{load_config, AppConfig, CliOverrides};
