//! Button module for polling the push-to-talk input line

mod line;

pub use line::{ButtonLine, SysfsButton};
#[cfg(test)]
pub use line::ScriptedButton;
