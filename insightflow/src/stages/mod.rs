//! Step execution and response parsing.
//!
//! A step is one agent call; the parser turns its text into a typed document
//! or a [`SchemaParseError`](crate::errors::SchemaParseError).

mod executor;
mod parser;

pub use executor::{StepExecutor, StepResult};
pub use parser::StructuredResponseParser;
