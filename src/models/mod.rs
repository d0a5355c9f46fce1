//! Core data models
//!
//! Shell types and the dialect families they belong to.

pub mod shell_type;

pub use shell_type::{Dialect, ShellType};
