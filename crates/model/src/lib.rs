//! The contract between the ralph loop and a generation engine.
//!
//! A generation engine runs one bounded *round*: it sends the history to a
//! model, executes the tool calls the model asks for, feeds the results back
//! and repeats until its own stop condition fires. The outer loop only
//! needs the result of that round (or a stream of its events), so this
//! crate describes exactly that and nothing more.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that engine implementors should adhere to. Model transports,
//! retry policies and tool semantics all live in the implementors' crates.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod engine;
mod error;
mod generation;
mod message;
mod request;
pub mod tool;

pub use engine::*;
pub use error::*;
pub use generation::*;
pub use message::*;
pub use request::*;
pub use tool::{Tool, ToolSet};
