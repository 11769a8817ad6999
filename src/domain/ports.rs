//! Domain Ports - The controller capability surface
//!
//! The reconciler only ever talks to the storage grid through
//! [`ControllerClient`]. Adapters implement this trait; the reconciler
//! receives one explicitly on every invocation.

use crate::domain::model::{
    AccessMode, AssignedResource, Assignment, DeleteFlags, Host, HostGroup, Pool, Share, ShareAttributes,
    ShareType, Volume,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Lookup Result
// =============================================================================

/// Outcome of a lookup that reached the controller.
///
/// Transport failures are reported through the surrounding `Result`, so
/// absence is never inferred from an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

// =============================================================================
// Mutation Requests
// =============================================================================

/// Create a host, optionally with its first initiator port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHost {
    pub name: String,
    pub initiator: Option<String>,
    pub description: Option<String>,
    pub flags: u32,
}

/// Create a host group with its full member list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHostGroup {
    pub name: String,
    pub hosts: Vec<String>,
    pub description: Option<String>,
    pub flags: u32,
}

/// Create a normal volume in a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolume {
    pub name: String,
    pub size: String,
    pub pool: String,
    pub description: Option<String>,
    pub flags: u32,
}

/// Snapshot a parent volume `count` times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeSnapshot {
    pub parent: String,
    /// Controller assigns a name when absent
    pub name: Option<String>,
    pub description: Option<String>,
    pub access_mode: Option<AccessMode>,
    pub count: u32,
    pub flags: u32,
}

/// Create a normal network share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShare {
    pub name: String,
    pub pool: String,
    pub description: Option<String>,
    pub attributes: ShareAttributes,
    pub flags: u32,
}

/// Create a subshare or alias of a parent share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareAlias {
    pub name: String,
    pub share_type: ShareType,
    pub parent: String,
    pub sub_path: Option<String>,
    pub inherit_settings: Option<bool>,
    pub description: Option<String>,
    pub public_nfs: bool,
    pub is_active: bool,
    pub flags: u32,
}

/// Snapshot a parent share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareSnapshot {
    pub parent: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub flags: u32,
}

/// Direction of an assignment change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentOp {
    Add,
    Remove,
}

impl AssignmentOp {
    /// Controller modification-type code
    pub fn code(&self) -> u8 {
        match self {
            AssignmentOp::Add => 0,
            AssignmentOp::Remove => 1,
        }
    }
}

/// Which assignments to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentScope {
    /// Every host or group the resource is assigned to
    Resource(AssignedResource),
    /// Every resource assigned to the host or group
    Target(String),
}

impl AssignmentScope {
    pub fn includes(&self, assignment: &Assignment) -> bool {
        match self {
            AssignmentScope::Resource(resource) => &assignment.resource == resource,
            AssignmentScope::Target(target) => &assignment.target == target,
        }
    }
}

/// Add or remove the association between a resource and a host/group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentChange {
    pub resource: AssignedResource,
    pub target: String,
    pub op: AssignmentOp,
    pub flags: u32,
}

// =============================================================================
// Controller Client Port
// =============================================================================

/// Port for the remote storage-grid controller
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Name of the controller, used in log lines
    fn controller_name(&self) -> &str;

    async fn lookup_host(&self, name: &str) -> Result<Lookup<Host>>;

    async fn lookup_host_group(&self, name: &str) -> Result<Lookup<HostGroup>>;

    async fn lookup_volume(&self, name: &str) -> Result<Lookup<Volume>>;

    async fn lookup_pool(&self, name: &str) -> Result<Lookup<Pool>>;

    async fn lookup_share(&self, name: &str) -> Result<Lookup<Share>>;

    /// Look up the association between a resource and a host or host group
    async fn lookup_assignment(
        &self,
        resource: &AssignedResource,
        target: &str,
    ) -> Result<Lookup<Assignment>>;

    /// All assignments of a resource, or all assignments to a host or group
    async fn list_assignments(&self, scope: &AssignmentScope) -> Result<Vec<Assignment>>;

    async fn create_host(&self, request: &CreateHost) -> Result<()>;

    async fn delete_host(&self, name: &str) -> Result<()>;

    async fn add_initiator(&self, host: &str, port: &str, flags: u32) -> Result<()>;

    async fn remove_initiator(&self, host: &str, port: &str) -> Result<()>;

    async fn create_host_group(&self, request: &CreateHostGroup) -> Result<()>;

    async fn delete_host_group(&self, name: &str) -> Result<()>;

    async fn create_volume(&self, request: &CreateVolume) -> Result<()>;

    async fn create_volume_snapshot(&self, request: &CreateVolumeSnapshot) -> Result<()>;

    async fn delete_volume(&self, name: &str, flags: DeleteFlags) -> Result<()>;

    async fn create_share(&self, request: &CreateShare) -> Result<()>;

    async fn create_share_alias(&self, request: &CreateShareAlias) -> Result<()>;

    async fn create_share_snapshot(&self, request: &CreateShareSnapshot) -> Result<()>;

    async fn delete_share(&self, name: &str, flags: DeleteFlags) -> Result<()>;

    async fn set_assignment(&self, change: &AssignmentChange) -> Result<()>;
}

pub type ControllerClientRef = Arc<dyn ControllerClient>;
