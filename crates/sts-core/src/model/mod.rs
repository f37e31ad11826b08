//! Plain value types for the samples written to the store.

mod cpu;
mod process;

pub use cpu::CpuSample;
pub use process::{ProcessSample, ProcessStatus};
