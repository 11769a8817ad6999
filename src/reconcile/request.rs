//! Desired-state requests
//!
//! One request describes one resource. Field names follow the camelCase
//! parameter names operators already use in playbooks (`volumeType`,
//! `deleteChildren`, `subPath`, ...), and defaults are applied during
//! deserialization.

use crate::domain::model::{
    AccessMode, AssignedResource, ShareAttributes, ShareType, SyncPolicy, VolumeType,
};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Common
// =============================================================================

/// Requested lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    #[default]
    Present,
    Absent,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetState::Present => write!(f, "present"),
            TargetState::Absent => write!(f, "absent"),
        }
    }
}

/// A desired-state request for one resource family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DesiredState {
    Host(HostRequest),
    Volume(VolumeRequest),
    Share(ShareRequest),
}

impl DesiredState {
    pub fn family(&self) -> &'static str {
        match self {
            DesiredState::Host(request) => match request.target() {
                Some(HostTarget::HostGroup(_)) => "hostgroup",
                _ => "host",
            },
            DesiredState::Volume(_) => "volume",
            DesiredState::Share(_) => "share",
        }
    }

    pub fn state(&self) -> TargetState {
        match self {
            DesiredState::Host(request) => request.state,
            DesiredState::Volume(request) => request.state,
            DesiredState::Share(request) => request.state,
        }
    }

    /// Name of the resource the request is about, when it has one
    pub fn name(&self) -> Option<&str> {
        match self {
            DesiredState::Host(request) => request.target_name(),
            DesiredState::Volume(request) => request.volume_name(),
            DesiredState::Share(request) => request.share_name(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Float(f64),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(text) => text,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
        }
    }
}

/// Accept `1024`, `1024.5` or `"10GiB"` for string-typed parameters
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept a single port or a list of ports
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

// =============================================================================
// Host Family
// =============================================================================

/// Which host-family entity a request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTarget {
    Host(String),
    HostGroup(String),
}

impl HostTarget {
    pub fn name(&self) -> &str {
        match self {
            HostTarget::Host(name) | HostTarget::HostGroup(name) => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostTarget::Host(_) => "host",
            HostTarget::HostGroup(_) => "hostgroup",
        }
    }
}

impl std::fmt::Display for HostTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

/// Host, host group, initiator and assignment request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    pub host: Option<String>,
    pub hostgroup: Option<String>,
    /// Members for host-group creation
    #[serde(default)]
    pub hosts: Vec<String>,
    pub description: Option<String>,
    /// iSCSI IQNs and/or FC WWPNs
    #[serde(default, deserialize_with = "one_or_many")]
    pub initiators: Vec<String>,
    /// Volume to assign to / detach from the target
    pub volume: Option<String>,
    /// Share to assign to / detach from the target
    pub share: Option<String>,
    #[serde(default)]
    pub state: TargetState,
    #[serde(default)]
    pub flags: u32,
}

impl HostRequest {
    /// The single target, or `None` when zero or both selectors are set
    pub fn target(&self) -> Option<HostTarget> {
        match (non_empty(&self.host), non_empty(&self.hostgroup)) {
            (Some(host), None) => Some(HostTarget::Host(host.to_string())),
            (None, Some(group)) => Some(HostTarget::HostGroup(group.to_string())),
            _ => None,
        }
    }

    pub fn target_name(&self) -> Option<&str> {
        non_empty(&self.host).or_else(|| non_empty(&self.hostgroup))
    }

    pub fn assigned_resource(&self) -> Option<AssignedResource> {
        match (non_empty(&self.volume), non_empty(&self.share)) {
            (Some(volume), None) => Some(AssignedResource::Volume(volume.to_string())),
            (None, Some(share)) => Some(AssignedResource::Share(share.to_string())),
            _ => None,
        }
    }

    pub fn has_host(&self) -> bool {
        non_empty(&self.host).is_some()
    }

    pub fn has_hostgroup(&self) -> bool {
        non_empty(&self.hostgroup).is_some()
    }

    pub fn has_volume(&self) -> bool {
        non_empty(&self.volume).is_some()
    }

    pub fn has_share(&self) -> bool {
        non_empty(&self.share).is_some()
    }
}

// =============================================================================
// Volume Family
// =============================================================================

/// Storage volume request (normal, snapshot, clone)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRequest {
    pub volume: Option<String>,
    #[serde(default)]
    pub volume_type: VolumeType,
    pub parent: Option<String>,
    pub pool: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub size: Option<String>,
    pub description: Option<String>,
    pub access_mode: Option<AccessMode>,
    /// Number of snapshots to take
    pub count: Option<u32>,
    #[serde(default)]
    pub state: TargetState,
    #[serde(default)]
    pub delete_children: bool,
    #[serde(default)]
    pub flags: u32,
}

impl VolumeRequest {
    pub fn volume_name(&self) -> Option<&str> {
        non_empty(&self.volume)
    }

    pub fn parent_name(&self) -> Option<&str> {
        non_empty(&self.parent)
    }

    pub fn pool_name(&self) -> Option<&str> {
        non_empty(&self.pool)
    }
}

// =============================================================================
// Share Family
// =============================================================================

/// Network share request (normal, subshare, alias, snapshot)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub share: Option<String>,
    #[serde(default)]
    pub share_type: ShareType,
    pub pool: Option<String>,
    pub owner_user: Option<String>,
    pub owner_group: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quota: Option<String>,
    #[serde(default)]
    pub record_size_kb: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true", rename = "publicNFS", alias = "publicNfs")]
    pub public_nfs: bool,
    #[serde(default = "default_true", rename = "publicSMB", alias = "publicSmb")]
    pub public_smb: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub permissions: Option<String>,
    pub smb_option_list: Option<String>,
    pub user_access_list: Option<String>,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
    pub compression_type: Option<String>,
    pub copies: Option<u32>,
    pub disable_snap_browsing: Option<bool>,
    #[serde(default = "default_true")]
    pub quota_exclude_snapshots: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reserved_space: Option<String>,
    #[serde(default)]
    pub state: TargetState,
    #[serde(default)]
    pub delete_children: bool,
    pub sub_path: Option<String>,
    pub inherit_settings: Option<bool>,
    pub parent: Option<String>,
    #[serde(default)]
    pub flags: u32,
}

impl Default for ShareRequest {
    fn default() -> Self {
        Self {
            share: None,
            share_type: ShareType::Normal,
            pool: None,
            owner_user: None,
            owner_group: None,
            description: None,
            quota: None,
            record_size_kb: 0,
            is_active: true,
            public_nfs: true,
            public_smb: true,
            permissions: None,
            smb_option_list: None,
            user_access_list: None,
            sync_policy: SyncPolicy::Standard,
            compression_type: None,
            copies: None,
            disable_snap_browsing: None,
            quota_exclude_snapshots: true,
            reserved_space: None,
            state: TargetState::Present,
            delete_children: false,
            sub_path: None,
            inherit_settings: None,
            parent: None,
            flags: 0,
        }
    }
}

impl ShareRequest {
    pub fn share_name(&self) -> Option<&str> {
        non_empty(&self.share)
    }

    pub fn parent_name(&self) -> Option<&str> {
        non_empty(&self.parent)
    }

    pub fn pool_name(&self) -> Option<&str> {
        non_empty(&self.pool)
    }

    pub fn sub_path(&self) -> Option<&str> {
        non_empty(&self.sub_path)
    }

    /// Attribute set sent with a normal share creation
    pub fn attributes(&self) -> ShareAttributes {
        ShareAttributes {
            owner_user: self.owner_user.clone(),
            owner_group: self.owner_group.clone(),
            permissions: self.permissions.clone(),
            public_nfs: self.public_nfs,
            public_smb: self.public_smb,
            smb_option_list: self.smb_option_list.clone(),
            user_access_list: self.user_access_list.clone(),
            quota: self.quota.clone().unwrap_or_else(|| "0".to_string()),
            record_size_kb: self.record_size_kb,
            sync_policy: self.sync_policy,
            compression_type: self.compression_type.clone(),
            copies: self.copies.unwrap_or(1),
            disable_snap_browsing: self.disable_snap_browsing,
            quota_exclude_snapshots: self.quota_exclude_snapshots,
            reserved_space: self.reserved_space.clone().unwrap_or_else(|| "0".to_string()),
            is_active: self.is_active,
        }
    }
}
