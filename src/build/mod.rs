mod clean;
mod compdb;
mod core;
mod feedback;
mod watcher;

pub use clean::clean;
pub use compdb::{COMPILE_COMMANDS, write_compile_commands};
pub use core::{BuildReport, CancelToken, Pipeline, default_roots, execute};
pub use feedback::FeedbackAnalyzer;
pub use watcher::watch;
