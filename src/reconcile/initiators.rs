//! Initiator set arithmetic
//!
//! Computes the incremental ports to add to or remove from a host. Deltas
//! keep the order in which ports appear in the desired list and never
//! contain duplicates.

use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashSet;

/// Which way the delta is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaDirection {
    /// desired − current
    Add,
    /// desired ∩ current
    Remove,
}

/// Ports that still need to be added or removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InitiatorDelta {
    ports: IndexSet<String>,
}

impl InitiatorDelta {
    pub fn compute<D, C>(desired: D, current: C, direction: DeltaDirection) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let current: HashSet<String> = current
            .into_iter()
            .map(|port| port.as_ref().to_string())
            .collect();

        let ports = desired
            .into_iter()
            .map(|port| port.as_ref().trim().to_string())
            .filter(|port| !port.is_empty())
            .filter(|port| match direction {
                DeltaDirection::Add => !current.contains(port),
                DeltaDirection::Remove => current.contains(port),
            })
            .collect();

        Self { ports }
    }

    /// Desired ports the host does not have yet
    pub fn missing<D, C>(desired: D, current: C) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self::compute(desired, current, DeltaDirection::Add)
    }

    /// Desired ports the host currently has
    pub fn present<D, C>(desired: D, current: C) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self::compute(desired, current, DeltaDirection::Remove)
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(String::as_str)
    }
}

/// Unique, trimmed, non-empty ports in first-seen order
pub fn dedup_ports<I>(ports: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    ports
        .into_iter()
        .map(|port| port.as_ref().trim().to_string())
        .filter(|port| !port.is_empty())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}
