pub mod mode;
pub mod records;
pub mod shell;
pub mod trace;

pub use mode::StepMode;
