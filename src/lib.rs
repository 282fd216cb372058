//! Host application for bridge modules: a minimal engine scene and the frame
//! loop that drives a native module attached to it.

pub mod engine;
pub mod run;

pub use run::{Inspection, RunOptions, RunSummary, inspect, run};
