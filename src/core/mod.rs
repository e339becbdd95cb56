//! Core data models: requests, invocation parameters and the output stream

mod ansi;
mod invocation;
mod output;
mod request;

pub use ansi::strip_ansi;
pub use invocation::*;
pub use output::*;
pub use request::*;
