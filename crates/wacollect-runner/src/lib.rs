//! # wacollect-runner
//!
//! The `wacollect` command line: parses arguments, merges them with an
//! optional YAML config, sets up logging and runs a
//! [`RetrievalDriver`](wacollect_probav::RetrievalDriver) with a progress bar.

mod args;
mod collect;
mod logging;
mod progress;

pub use args::Args;
pub use collect::{prepare, resolve_credentials, run, write_report};
pub use logging::init_logging;
