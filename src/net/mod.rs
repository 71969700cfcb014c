//! Network: remote action endpoint and startup liveness gate

mod endpoint;
mod probe;

pub use endpoint::{ActionEndpoint, HttpEndpoint};
#[cfg(test)]
pub use endpoint::FakeEndpoint;
pub use probe::wait_for_network;
