//! Upload responses: normalization and execution

mod interpret;
mod parse;

pub use interpret::ResponseInterpreter;
pub use parse::{ParseLimits, ServerResponse};
