//! Process-level setup for the command-line tool.

mod logger;

pub use logger::init_logger_with;
