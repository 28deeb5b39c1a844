pub mod bank;
pub mod error;
pub mod input_stage;
pub mod layout;
pub mod macball;
pub mod orchestrator;
pub mod params;
pub mod reference;
pub mod scan;
pub mod scoreboard;
pub mod tdma_loader;
pub mod tdma_storer;
pub mod vec16;
pub mod wt_set;

pub use error::ConvError;
pub use orchestrator::{BatchReport, ConvBuffers, Engine, EngineConfig, Invocation, RunSummary};
pub use params::{ConvParams, KernelSize, ScratchLimits, Tiling};
pub use vec16::{Vec16, VEC_WIDTH};
