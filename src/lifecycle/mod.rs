//! Process lifecycle: logging setup and shutdown signals

pub mod logging;
mod shutdown;

pub use shutdown::ShutdownSignal;
