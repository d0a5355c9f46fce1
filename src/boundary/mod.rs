//! Boundary Detection
//!
//! In-band marker protocol: per-command random tokens, the wrapper that makes
//! the shell print them around a command, and the parser that finds them again
//! in the raw output stream.

pub mod detector;
pub mod parser;
pub mod wrapper;

pub use detector::BoundaryDetector;
pub use parser::{
    CommandOutcome, Completion, ParseEvent, ParserOptions, ParserState, StreamParser,
};
pub use wrapper::{
    command_with_delimiter_sandwich, command_with_prompt, select_strategy, wrap,
    StrategyPreference,
};
