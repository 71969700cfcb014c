//! The supervised foreground loop tying input, capture and response together

mod controller;

pub use controller::Appliance;
