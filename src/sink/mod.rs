//! Output sinks: destinations that receive command output

mod sinks;
mod surface;

pub use sinks::*;
pub use surface::*;
