//! Domain layer - Grid entities and the controller port
//!
//! This module defines the entities read from the controller and the trait
//! (port) that controller adapters implement.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
