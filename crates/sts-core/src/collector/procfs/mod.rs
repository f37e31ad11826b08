//! Readers for the Linux `/proc` filesystem.

pub mod cpu;
pub mod parser;
pub mod process;

pub use cpu::{CpuPercent, CpuReader};
pub use parser::UserResolver;
pub use process::ProcessReader;
