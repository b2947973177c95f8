//! TableSage CLI library: command implementations and terminal output.

pub mod commands;
pub mod output;
pub mod session;

pub use output::OutputFormat;
