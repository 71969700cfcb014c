//! Audio hardware setup

pub mod mixer;
