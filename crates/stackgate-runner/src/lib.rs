//! Gate orchestration: launches layers in strict dependency order, probes
//! them healthy, aggregates results, and guarantees reverse-order teardown.

pub mod action;
pub mod cleanup;
pub mod launcher;
pub mod report;
pub mod runner;

pub use action::*;
pub use cleanup::*;
pub use launcher::*;
pub use report::*;
pub use runner::*;
