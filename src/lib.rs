//! Storage Grid Reconciler - Declarative resource convergence
//!
//! Converges storage-grid resources (hosts and their initiator ports, host
//! groups, volumes, network shares and the assignments between them) toward
//! a requested present/absent state, issuing only the mutations needed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Reconciler                              │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ Validator  │─►│ Comparator │─►│  Planner   │─►│  Outcome   │  │
//! │  └────────────┘  └────────────┘  └─────┬──────┘  └────────────┘  │
//! ├────────────────────────────────────────┼─────────────────────────┤
//! │                     ControllerClient (port)                      │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────┐  │
//! │  │  InMemoryController          │  │  network adapters        │  │
//! │  │  (tests, CLI simulator)      │  │  (implement the port)    │  │
//! │  └──────────────────────────────┘  └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`reconcile`]: Request types, validation, comparison, planning, outcome
//! - [`controller`]: Controller adapters
//! - [`domain`]: Grid model and the controller port
//! - [`config`]: YAML/JSON document loading
//! - [`error`]: Error types and handling

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod reconcile;

// Re-export commonly used types
pub use controller::{GridState, InMemoryController, MemoryControllerConfig, MutationRecord};

pub use domain::model::{
    AccessMode, AssignedResource, Assignment, DeleteFlags, Host, HostGroup, Pool, Share,
    ShareAttributes, ShareType, SyncPolicy, Volume, VolumeType,
};

pub use domain::ports::{ControllerClient, ControllerClientRef, Lookup};

pub use error::{Error, ErrorKind, Result};

pub use reconcile::{
    DesiredState, InvocationContext, JsonReporter, Mutation, Outcome, Plan, Reconciler,
    ReconcilerConfig, Report, TargetState,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
