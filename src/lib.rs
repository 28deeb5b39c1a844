pub mod arch;
pub mod simulator;

pub use arch::dirconv::{ConvBuffers, ConvError, ConvParams, Engine, EngineConfig, KernelSize, Vec16};
pub use simulator::sim::mode::StepMode;
pub use simulator::utils::log;
