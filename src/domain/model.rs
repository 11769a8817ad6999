//! Domain Model - Entities owned by the storage-grid controller
//!
//! Every entity is identified by a human-assigned name that is unique within
//! its resource family. The reconciler never persists these; they are read
//! from the controller on each invocation and discarded afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Lifecycle Subtypes
// =============================================================================

/// Volume lifecycle subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    /// Independent, sized volume carved from a pool
    #[default]
    Normal,
    /// Point-in-time child of exactly one parent volume
    Snapshot,
    /// Writable copy of a parent volume
    Clone,
}

impl VolumeType {
    pub fn requires_parent(&self) -> bool {
        !matches!(self, VolumeType::Normal)
    }
}

impl std::fmt::Display for VolumeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeType::Normal => write!(f, "normal"),
            VolumeType::Snapshot => write!(f, "snapshot"),
            VolumeType::Clone => write!(f, "clone"),
        }
    }
}

/// Network share lifecycle subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    #[default]
    Normal,
    /// Share exposing a sub-directory of its parent
    Subshare,
    /// Alternate name for its parent, optionally inheriting its settings
    Alias,
    Snapshot,
}

impl ShareType {
    pub fn requires_parent(&self) -> bool {
        !matches!(self, ShareType::Normal)
    }
}

impl std::fmt::Display for ShareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareType::Normal => write!(f, "normal"),
            ShareType::Subshare => write!(f, "subshare"),
            ShareType::Alias => write!(f, "alias"),
            ShareType::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Access mode of a volume snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    None,
    #[serde(alias = "read-only")]
    ReadOnly,
    #[default]
    #[serde(alias = "read-write")]
    ReadWrite,
}

// =============================================================================
// Typed Encodings
// =============================================================================

/// Write-sync policy of a share
///
/// Unrecognized names fall back to [`SyncPolicy::Standard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncPolicy {
    /// Hybrid of write-through and write-back based on O_SYNC
    #[default]
    Standard,
    /// Always write-through to the intent log
    Always,
    /// Always async writes
    Disabled,
}

impl SyncPolicy {
    /// Controller's tri-state numeric encoding
    pub fn code(&self) -> u8 {
        match self {
            SyncPolicy::Standard => 0,
            SyncPolicy::Always => 1,
            SyncPolicy::Disabled => 2,
        }
    }
}

impl From<&str> for SyncPolicy {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "always" => SyncPolicy::Always,
            "disabled" => SyncPolicy::Disabled,
            _ => SyncPolicy::Standard,
        }
    }
}

impl From<String> for SyncPolicy {
    fn from(s: String) -> Self {
        SyncPolicy::from(s.as_str())
    }
}

impl From<SyncPolicy> for String {
    fn from(policy: SyncPolicy) -> Self {
        policy.to_string()
    }
}

impl std::fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPolicy::Standard => write!(f, "standard"),
            SyncPolicy::Always => write!(f, "always"),
            SyncPolicy::Disabled => write!(f, "disabled"),
        }
    }
}

/// Flag set passed to volume and share deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeleteFlags(u32);

impl DeleteFlags {
    pub const NONE: DeleteFlags = DeleteFlags(0);

    /// Also delete child snapshots, subshares and aliases
    pub const RECURSIVE: DeleteFlags = DeleteFlags(262_144);

    pub const fn from_bits_retain(bits: u32) -> Self {
        DeleteFlags(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: DeleteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Resolve the flags for a delete request.
    ///
    /// `delete_children` replaces the caller-supplied flags with
    /// [`DeleteFlags::RECURSIVE`] instead of merging them.
    pub fn for_request(caller_flags: u32, delete_children: bool) -> Self {
        if delete_children {
            DeleteFlags::RECURSIVE
        } else {
            DeleteFlags::from_bits_retain(caller_flags)
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Host identity with its iSCSI IQN / FC WWPN initiator ports
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub initiators: Vec<String>,
}

/// Named set of hosts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hosts: BTreeSet<String>,
}

/// Storage pool that volumes and shares are provisioned from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
}

/// Block storage volume
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub volume_type: VolumeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Access-control and tuning attributes of a network share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    pub public_nfs: bool,
    pub public_smb: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smb_option_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_access_list: Option<String>,
    pub quota: String,
    pub record_size_kb: u32,
    pub sync_policy: SyncPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_type: Option<String>,
    pub copies: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_snap_browsing: Option<bool>,
    pub quota_exclude_snapshots: bool,
    pub reserved_space: String,
    pub is_active: bool,
}

impl Default for ShareAttributes {
    fn default() -> Self {
        Self {
            owner_user: None,
            owner_group: None,
            permissions: None,
            public_nfs: true,
            public_smb: true,
            smb_option_list: None,
            user_access_list: None,
            quota: "0".to_string(),
            record_size_kb: 0,
            sync_policy: SyncPolicy::Standard,
            compression_type: None,
            copies: 1,
            disable_snap_browsing: None,
            quota_exclude_snapshots: true,
            reserved_space: "0".to_string(),
            is_active: true,
        }
    }
}

/// Network share (NFS/SMB)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub name: String,
    #[serde(default)]
    pub share_type: ShareType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: ShareAttributes,
}

/// Resource side of an assignment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum AssignedResource {
    Volume(String),
    Share(String),
}

impl AssignedResource {
    pub fn name(&self) -> &str {
        match self {
            AssignedResource::Volume(name) | AssignedResource::Share(name) => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssignedResource::Volume(_) => "storage volume",
            AssignedResource::Share(_) => "network share",
        }
    }
}

impl std::fmt::Display for AssignedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

/// Access grant between a host (or host group) and a volume or share
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub resource: AssignedResource,
    /// Host or host-group name
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_policy_encoding() {
        assert_eq!(SyncPolicy::from("standard").code(), 0);
        assert_eq!(SyncPolicy::from("always").code(), 1);
        assert_eq!(SyncPolicy::from("disabled").code(), 2);
        assert_eq!(SyncPolicy::from("writeback").code(), 0);
    }

    #[test]
    fn test_sync_policy_deserialize_fallback() {
        let policy: SyncPolicy = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(policy, SyncPolicy::Standard);
        let policy: SyncPolicy = serde_json::from_str("\"Always\"").unwrap();
        assert_eq!(policy, SyncPolicy::Always);
        assert_eq!(serde_json::to_string(&SyncPolicy::Disabled).unwrap(), "\"disabled\"");
    }

    #[test]
    fn test_delete_flags_replace_caller_flags() {
        assert_eq!(DeleteFlags::for_request(7, true), DeleteFlags::RECURSIVE);
        assert_eq!(DeleteFlags::for_request(7, true).bits(), 262_144);
        assert_eq!(DeleteFlags::for_request(7, false).bits(), 7);
        assert!(!DeleteFlags::for_request(0, false).contains(DeleteFlags::RECURSIVE));
        assert!(DeleteFlags::for_request(0, true).contains(DeleteFlags::RECURSIVE));
    }

    #[test]
    fn test_parent_requirements() {
        assert!(!VolumeType::Normal.requires_parent());
        assert!(VolumeType::Clone.requires_parent());
        assert!(ShareType::Alias.requires_parent());
        assert!(!ShareType::Normal.requires_parent());
    }
}
