//! Configuration for the compliance core, stored as TOML

pub mod settings;

pub use settings::*;
