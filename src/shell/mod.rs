//! Shell Dialects
//!
//! Per-shell specifications and the dialect formatting they dispatch to.

pub mod dialect;
pub mod spec;

pub use spec::{DetectionStrategy, ShellSpecification};
