//! Controller Adapters
//!
//! Implementations of the [`ControllerClient`](crate::domain::ports::ControllerClient)
//! port.

pub mod memory;

pub use memory::{GridState, InMemoryController, MemoryControllerConfig, MutationRecord};
