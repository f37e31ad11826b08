//! Mock filesystem implementation for testing.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::stat_line;
