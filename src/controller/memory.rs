//! In-Memory Storage Grid Controller
//!
//! A [`ControllerClient`] backed by a [`GridState`] held in memory. It
//! applies the same refusals a real grid controller would (duplicate names,
//! ports already claimed by another host, deleting a host, host group or
//! volume that still has assignments, deleting a parent without the
//! recursive flag) and journals
//! every applied mutation with the flag and code values a controller
//! receives.

use crate::domain::model::{
    AssignedResource, Assignment, DeleteFlags, Host, HostGroup, Pool, Share, ShareType, Volume,
    VolumeType,
};
use crate::domain::ports::{
    AssignmentChange, AssignmentOp, AssignmentScope, ControllerClient, CreateHost, CreateHostGroup, CreateShare,
    CreateShareAlias, CreateShareSnapshot, CreateVolume, CreateVolumeSnapshot, Lookup,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the in-memory controller
#[derive(Debug, Clone)]
pub struct MemoryControllerConfig {
    /// Name reported in log lines
    pub name: String,
}

impl Default for MemoryControllerConfig {
    fn default() -> Self {
        Self {
            name: "grid-sim".to_string(),
        }
    }
}

// =============================================================================
// Grid State
// =============================================================================

/// Serializable snapshot of everything the controller knows about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub host_groups: Vec<HostGroup>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub shares: Vec<Share>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

/// One applied mutation as the controller received it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub operation: String,
    pub resource: String,
    pub flags: u32,
    /// Sync policy code sent with share creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<u8>,
    /// Modification type sent with assignment changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<u8>,
}

impl MutationRecord {
    fn new(operation: &str, resource: &str, flags: u32) -> Self {
        Self {
            operation: operation.to_string(),
            resource: resource.to_string(),
            flags,
            sync_policy: None,
            modification: None,
        }
    }
}

#[derive(Debug, Default)]
struct Grid {
    hosts: BTreeMap<String, Host>,
    host_groups: BTreeMap<String, HostGroup>,
    pools: BTreeMap<String, Pool>,
    volumes: BTreeMap<String, Volume>,
    shares: BTreeMap<String, Share>,
    assignments: BTreeSet<Assignment>,
    journal: Vec<MutationRecord>,
    rejections: HashMap<(String, String), String>,
    lookups: usize,
    offline: bool,
    snapshot_seq: u64,
}

fn refused(reason: impl Into<String>) -> Error {
    Error::Controller(reason.into())
}

impl Grid {
    fn from_state(state: GridState) -> Self {
        Self {
            hosts: state.hosts.into_iter().map(|h| (h.name.clone(), h)).collect(),
            host_groups: state
                .host_groups
                .into_iter()
                .map(|g| (g.name.clone(), g))
                .collect(),
            pools: state.pools.into_iter().map(|p| (p.name.clone(), p)).collect(),
            volumes: state.volumes.into_iter().map(|v| (v.name.clone(), v)).collect(),
            shares: state.shares.into_iter().map(|s| (s.name.clone(), s)).collect(),
            assignments: state.assignments.into_iter().collect(),
            ..Default::default()
        }
    }

    fn to_state(&self) -> GridState {
        GridState {
            hosts: self.hosts.values().cloned().collect(),
            host_groups: self.host_groups.values().cloned().collect(),
            pools: self.pools.values().cloned().collect(),
            volumes: self.volumes.values().cloned().collect(),
            shares: self.shares.values().cloned().collect(),
            assignments: self.assignments.iter().cloned().collect(),
        }
    }

    fn reachable(&self) -> Result<()> {
        if self.offline {
            Err(Error::Transport("controller is unreachable".into()))
        } else {
            Ok(())
        }
    }

    /// Gate for every mutation: transport first, then injected rejections
    fn admit(&self, operation: &str, resource: &str) -> Result<()> {
        self.reachable()?;
        match self
            .rejections
            .get(&(operation.to_string(), resource.to_string()))
        {
            Some(reason) => Err(refused(reason.clone())),
            None => Ok(()),
        }
    }

    fn port_owner(&self, port: &str) -> Option<&str> {
        self.hosts
            .values()
            .find(|h| h.initiators.iter().any(|p| p == port))
            .map(|h| h.name.as_str())
    }

    fn claim_port(&self, port: &str) -> Result<()> {
        match self.port_owner(port) {
            Some(owner) => Err(refused(format!(
                "initiator '{}' is already assigned to host '{}'",
                port, owner
            ))),
            None => Ok(()),
        }
    }

    /// Controller-assigned snapshot name, `{parent}_snap{n}`
    fn next_snapshot_name(&mut self, parent: &str) -> String {
        loop {
            self.snapshot_seq += 1;
            let name = format!("{}_snap{}", parent, self.snapshot_seq);
            if !self.volumes.contains_key(&name) && !self.shares.contains_key(&name) {
                return name;
            }
        }
    }

    fn target_exists(&self, target: &str) -> bool {
        self.hosts.contains_key(target) || self.host_groups.contains_key(target)
    }

    fn resource_exists(&self, resource: &AssignedResource) -> bool {
        match resource {
            AssignedResource::Volume(name) => self.volumes.contains_key(name),
            AssignedResource::Share(name) => self.shares.contains_key(name),
        }
    }

    fn drop_assignments(&mut self, resource: &AssignedResource) {
        self.assignments.retain(|a| &a.resource != resource);
    }

    fn assigned(&self, scope: &AssignmentScope) -> Vec<&Assignment> {
        self.assignments.iter().filter(|a| scope.includes(a)).collect()
    }

    /// The named entry and every transitive child, children first
    fn lineage<T>(
        entries: &BTreeMap<String, T>,
        name: &str,
        parent_of: impl Fn(&T) -> Option<&str>,
    ) -> Vec<String> {
        let mut order = vec![name.to_string()];
        let mut index = 0;
        while index < order.len() {
            let current = order[index].clone();
            order.extend(
                entries
                    .iter()
                    .filter(|(_, entry)| parent_of(*entry) == Some(current.as_str()))
                    .map(|(child, _)| child.clone()),
            );
            index += 1;
        }
        order.reverse();
        order
    }
}

// =============================================================================
// In-Memory Controller
// =============================================================================

/// Storage grid controller simulated in process memory
pub struct InMemoryController {
    config: MemoryControllerConfig,
    grid: Mutex<Grid>,
}

impl InMemoryController {
    pub fn new(config: MemoryControllerConfig, state: GridState) -> Self {
        Self {
            config,
            grid: Mutex::new(Grid::from_state(state)),
        }
    }

    pub fn from_state(state: GridState) -> Self {
        Self::new(MemoryControllerConfig::default(), state)
    }

    /// Current grid contents
    pub fn snapshot(&self) -> GridState {
        self.grid.lock().to_state()
    }

    /// Mutations applied so far, oldest first
    pub fn journal(&self) -> Vec<MutationRecord> {
        self.grid.lock().journal.clone()
    }

    /// Number of lookups served
    pub fn lookup_count(&self) -> usize {
        self.grid.lock().lookups
    }

    /// Make every `operation` on `resource` fail with `reason`
    pub fn reject(&self, operation: &str, resource: &str, reason: &str) {
        self.grid
            .lock()
            .rejections
            .insert((operation.to_string(), resource.to_string()), reason.to_string());
    }

    /// Fail every subsequent call with a transport error
    pub fn go_offline(&self) {
        self.grid.lock().offline = true;
    }

    fn lookup<T>(
        &self,
        family: &str,
        name: &str,
        find: impl FnOnce(&Grid) -> Option<T>,
    ) -> Result<Lookup<T>> {
        let mut grid = self.grid.lock();
        grid.reachable()?;
        grid.lookups += 1;
        let found = find(&*grid);
        debug!(
            "Lookup {} '{}' on {}: {}",
            family,
            name,
            self.config.name,
            if found.is_some() { "found" } else { "not found" }
        );
        Ok(found.into())
    }
}

#[async_trait]
impl ControllerClient for InMemoryController {
    fn controller_name(&self) -> &str {
        &self.config.name
    }

    async fn lookup_host(&self, name: &str) -> Result<Lookup<Host>> {
        self.lookup("host", name, |g| g.hosts.get(name).cloned())
    }

    async fn lookup_host_group(&self, name: &str) -> Result<Lookup<HostGroup>> {
        self.lookup("host group", name, |g| g.host_groups.get(name).cloned())
    }

    async fn lookup_volume(&self, name: &str) -> Result<Lookup<Volume>> {
        self.lookup("volume", name, |g| g.volumes.get(name).cloned())
    }

    async fn lookup_pool(&self, name: &str) -> Result<Lookup<Pool>> {
        self.lookup("pool", name, |g| g.pools.get(name).cloned())
    }

    async fn lookup_share(&self, name: &str) -> Result<Lookup<Share>> {
        self.lookup("share", name, |g| g.shares.get(name).cloned())
    }

    async fn lookup_assignment(
        &self,
        resource: &AssignedResource,
        target: &str,
    ) -> Result<Lookup<Assignment>> {
        let wanted = Assignment {
            resource: resource.clone(),
            target: target.to_string(),
        };
        self.lookup("assignment", target, |g| g.assignments.get(&wanted).cloned())
    }

    async fn list_assignments(&self, scope: &AssignmentScope) -> Result<Vec<Assignment>> {
        let mut grid = self.grid.lock();
        grid.reachable()?;
        grid.lookups += 1;
        let found: Vec<Assignment> = grid.assigned(scope).into_iter().cloned().collect();
        debug!(
            "Listed {} assignment(s) on {}",
            found.len(),
            self.config.name
        );
        Ok(found)
    }

    async fn create_host(&self, request: &CreateHost) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("create_host", &request.name)?;

        if grid.hosts.contains_key(&request.name) {
            return Err(refused(format!("host '{}' already exists", request.name)));
        }
        if let Some(port) = &request.initiator {
            grid.claim_port(port)?;
        }

        info!("Creating host: {}", request.name);
        grid.hosts.insert(
            request.name.clone(),
            Host {
                name: request.name.clone(),
                description: request.description.clone(),
                initiators: request.initiator.iter().cloned().collect(),
            },
        );
        grid.journal
            .push(MutationRecord::new("create_host", &request.name, request.flags));
        Ok(())
    }

    async fn delete_host(&self, name: &str) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("delete_host", name)?;

        if !grid.hosts.contains_key(name) {
            return Err(refused(format!("host '{}' not found", name)));
        }
        let active = grid.assigned(&AssignmentScope::Target(name.to_string())).len();
        if active > 0 {
            return Err(refused(format!(
                "host '{}' still has {} active assignment(s)",
                name, active
            )));
        }

        info!("Deleting host: {}", name);
        grid.hosts.remove(name);
        for group in grid.host_groups.values_mut() {
            group.hosts.remove(name);
        }
        grid.journal.push(MutationRecord::new("delete_host", name, 0));
        Ok(())
    }

    async fn add_initiator(&self, host: &str, port: &str, flags: u32) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("add_initiator", port)?;

        if !grid.hosts.contains_key(host) {
            return Err(refused(format!("host '{}' not found", host)));
        }
        grid.claim_port(port)?;

        info!("Adding initiator {} to host {}", port, host);
        if let Some(entry) = grid.hosts.get_mut(host) {
            entry.initiators.push(port.to_string());
        }
        grid.journal.push(MutationRecord::new("add_initiator", port, flags));
        Ok(())
    }

    async fn remove_initiator(&self, host: &str, port: &str) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("remove_initiator", port)?;

        let entry = grid
            .hosts
            .get_mut(host)
            .ok_or_else(|| refused(format!("host '{}' not found", host)))?;
        let before = entry.initiators.len();
        entry.initiators.retain(|p| p != port);
        if entry.initiators.len() == before {
            return Err(refused(format!(
                "initiator '{}' is not assigned to host '{}'",
                port, host
            )));
        }

        info!("Removed initiator {} from host {}", port, host);
        grid.journal.push(MutationRecord::new("remove_initiator", port, 0));
        Ok(())
    }

    async fn create_host_group(&self, request: &CreateHostGroup) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("create_host_group", &request.name)?;

        if grid.host_groups.contains_key(&request.name) {
            return Err(refused(format!("host group '{}' already exists", request.name)));
        }
        if request.hosts.is_empty() {
            return Err(refused("a host group needs at least one member host"));
        }
        if let Some(missing) = request.hosts.iter().find(|h| !grid.hosts.contains_key(*h)) {
            return Err(refused(format!("member host '{}' not found", missing)));
        }

        info!(
            "Creating host group: {} ({} hosts)",
            request.name,
            request.hosts.len()
        );
        grid.host_groups.insert(
            request.name.clone(),
            HostGroup {
                name: request.name.clone(),
                description: request.description.clone(),
                hosts: request.hosts.iter().cloned().collect(),
            },
        );
        grid.journal.push(MutationRecord::new(
            "create_host_group",
            &request.name,
            request.flags,
        ));
        Ok(())
    }

    async fn delete_host_group(&self, name: &str) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("delete_host_group", name)?;

        if !grid.host_groups.contains_key(name) {
            return Err(refused(format!("host group '{}' not found", name)));
        }
        let active = grid.assigned(&AssignmentScope::Target(name.to_string())).len();
        if active > 0 {
            return Err(refused(format!(
                "host group '{}' still has {} active assignment(s)",
                name, active
            )));
        }

        info!("Deleting host group: {}", name);
        grid.host_groups.remove(name);
        grid.journal.push(MutationRecord::new("delete_host_group", name, 0));
        Ok(())
    }

    async fn create_volume(&self, request: &CreateVolume) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("create_volume", &request.name)?;

        if grid.volumes.contains_key(&request.name) {
            return Err(refused(format!("storage volume '{}' already exists", request.name)));
        }
        if !grid.pools.contains_key(&request.pool) {
            return Err(refused(format!("storage pool '{}' not found", request.pool)));
        }

        info!(
            "Creating storage volume: {} ({} in pool {})",
            request.name, request.size, request.pool
        );
        grid.volumes.insert(
            request.name.clone(),
            Volume {
                name: request.name.clone(),
                volume_type: VolumeType::Normal,
                size: Some(request.size.clone()),
                pool: Some(request.pool.clone()),
                description: request.description.clone(),
                ..Default::default()
            },
        );
        grid.journal
            .push(MutationRecord::new("create_volume", &request.name, request.flags));
        Ok(())
    }

    async fn create_volume_snapshot(&self, request: &CreateVolumeSnapshot) -> Result<()> {
        let mut grid = self.grid.lock();
        let label = request.name.as_deref().unwrap_or(&request.parent);
        grid.admit("create_volume_snapshot", label)?;

        let parent = grid
            .volumes
            .get(&request.parent)
            .cloned()
            .ok_or_else(|| refused(format!("storage volume '{}' not found", request.parent)))?;

        let count = request.count.max(1);
        let names: Vec<String> = match (&request.name, count) {
            (Some(name), 1) => vec![name.clone()],
            // The first copy keeps the requested name so a re-run finds it
            (Some(name), n) => std::iter::once(name.clone())
                .chain((2..=n).map(|i| format!("{}_{}", name, i)))
                .collect(),
            (None, n) => (0..n)
                .map(|_| grid.next_snapshot_name(&request.parent))
                .collect(),
        };
        if let Some(taken) = names.iter().find(|n| grid.volumes.contains_key(*n)) {
            return Err(refused(format!("storage volume '{}' already exists", taken)));
        }

        for name in names {
            info!("Creating snapshot {} of storage volume {}", name, parent.name);
            grid.volumes.insert(
                name.clone(),
                Volume {
                    name: name.clone(),
                    volume_type: VolumeType::Snapshot,
                    size: parent.size.clone(),
                    pool: parent.pool.clone(),
                    parent: Some(parent.name.clone()),
                    access_mode: request.access_mode,
                    description: request.description.clone(),
                },
            );
            grid.journal.push(MutationRecord::new(
                "create_volume_snapshot",
                &name,
                request.flags,
            ));
        }
        Ok(())
    }

    async fn delete_volume(&self, name: &str, flags: DeleteFlags) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("delete_volume", name)?;

        if !grid.volumes.contains_key(name) {
            return Err(refused(format!("storage volume '{}' not found", name)));
        }
        let doomed = Grid::lineage(&grid.volumes, name, |v| v.parent.as_deref());
        if doomed.len() > 1 && !flags.contains(DeleteFlags::RECURSIVE) {
            return Err(refused(format!(
                "storage volume '{}' has {} dependent snapshot(s); recursive delete required",
                name,
                doomed.len() - 1
            )));
        }
        if let Some(assigned) = doomed.iter().find(|victim| {
            !grid
                .assigned(&AssignmentScope::Resource(AssignedResource::Volume(
                    (*victim).clone(),
                )))
                .is_empty()
        }) {
            return Err(refused(format!(
                "storage volume '{}' is still assigned; detach it before deleting",
                assigned
            )));
        }

        for victim in &doomed {
            info!("Deleting storage volume: {}", victim);
            grid.volumes.remove(victim);
        }
        grid.journal
            .push(MutationRecord::new("delete_volume", name, flags.bits()));
        Ok(())
    }

    async fn create_share(&self, request: &CreateShare) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("create_share", &request.name)?;

        if grid.shares.contains_key(&request.name) {
            return Err(refused(format!("network share '{}' already exists", request.name)));
        }
        if !grid.pools.contains_key(&request.pool) {
            return Err(refused(format!("storage pool '{}' not found", request.pool)));
        }

        info!("Creating network share: {} in pool {}", request.name, request.pool);
        grid.shares.insert(
            request.name.clone(),
            Share {
                name: request.name.clone(),
                share_type: ShareType::Normal,
                pool: Some(request.pool.clone()),
                description: request.description.clone(),
                attributes: request.attributes.clone(),
                ..Default::default()
            },
        );
        let mut record = MutationRecord::new("create_share", &request.name, request.flags);
        record.sync_policy = Some(request.attributes.sync_policy.code());
        grid.journal.push(record);
        Ok(())
    }

    async fn create_share_alias(&self, request: &CreateShareAlias) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("create_share_alias", &request.name)?;

        if grid.shares.contains_key(&request.name) {
            return Err(refused(format!("network share '{}' already exists", request.name)));
        }
        let parent = grid
            .shares
            .get(&request.parent)
            .cloned()
            .ok_or_else(|| refused(format!("network share '{}' not found", request.parent)))?;

        let mut attributes = if request.inherit_settings.unwrap_or(true) {
            parent.attributes.clone()
        } else {
            Default::default()
        };
        attributes.public_nfs = request.public_nfs;
        attributes.is_active = request.is_active;

        info!(
            "Creating {} {} of network share {}",
            request.share_type, request.name, parent.name
        );
        grid.shares.insert(
            request.name.clone(),
            Share {
                name: request.name.clone(),
                share_type: request.share_type,
                pool: parent.pool.clone(),
                parent: Some(parent.name.clone()),
                sub_path: request.sub_path.clone(),
                description: request.description.clone(),
                attributes,
            },
        );
        grid.journal.push(MutationRecord::new(
            "create_share_alias",
            &request.name,
            request.flags,
        ));
        Ok(())
    }

    async fn create_share_snapshot(&self, request: &CreateShareSnapshot) -> Result<()> {
        let mut grid = self.grid.lock();
        let label = request.name.as_deref().unwrap_or(&request.parent);
        grid.admit("create_share_snapshot", label)?;

        let parent = grid
            .shares
            .get(&request.parent)
            .cloned()
            .ok_or_else(|| refused(format!("network share '{}' not found", request.parent)))?;
        let name = match &request.name {
            Some(name) if grid.shares.contains_key(name) => {
                return Err(refused(format!("network share '{}' already exists", name)))
            }
            Some(name) => name.clone(),
            None => grid.next_snapshot_name(&parent.name),
        };

        let mut attributes = parent.attributes.clone();
        attributes.is_active = request.is_active;

        info!("Creating snapshot {} of network share {}", name, parent.name);
        grid.shares.insert(
            name.clone(),
            Share {
                name: name.clone(),
                share_type: ShareType::Snapshot,
                pool: parent.pool.clone(),
                parent: Some(parent.name.clone()),
                sub_path: None,
                description: request.description.clone(),
                attributes,
            },
        );
        grid.journal.push(MutationRecord::new(
            "create_share_snapshot",
            &name,
            request.flags,
        ));
        Ok(())
    }

    async fn delete_share(&self, name: &str, flags: DeleteFlags) -> Result<()> {
        let mut grid = self.grid.lock();
        grid.admit("delete_share", name)?;

        if !grid.shares.contains_key(name) {
            return Err(refused(format!("network share '{}' not found", name)));
        }
        let doomed = Grid::lineage(&grid.shares, name, |s| s.parent.as_deref());
        if doomed.len() > 1 && !flags.contains(DeleteFlags::RECURSIVE) {
            return Err(refused(format!(
                "network share '{}' has {} dependent share(s); recursive delete required",
                name,
                doomed.len() - 1
            )));
        }

        for victim in &doomed {
            info!("Deleting network share: {}", victim);
            grid.shares.remove(victim);
            grid.drop_assignments(&AssignedResource::Share(victim.clone()));
        }
        grid.journal
            .push(MutationRecord::new("delete_share", name, flags.bits()));
        Ok(())
    }

    async fn set_assignment(&self, change: &AssignmentChange) -> Result<()> {
        let mut grid = self.grid.lock();
        let operation = match change.op {
            AssignmentOp::Add => "assign",
            AssignmentOp::Remove => "unassign",
        };
        grid.admit(operation, change.resource.name())?;

        if !grid.resource_exists(&change.resource) {
            return Err(refused(format!("{} not found", change.resource)));
        }
        if !grid.target_exists(&change.target) {
            return Err(refused(format!("host or host group '{}' not found", change.target)));
        }

        let assignment = Assignment {
            resource: change.resource.clone(),
            target: change.target.clone(),
        };
        let applied = match change.op {
            AssignmentOp::Add => grid.assignments.insert(assignment),
            AssignmentOp::Remove => grid.assignments.remove(&assignment),
        };
        if !applied {
            return Err(refused(format!(
                "{} is {} assigned to '{}'",
                change.resource,
                if change.op == AssignmentOp::Add { "already" } else { "not" },
                change.target
            )));
        }

        info!("Updated assignment of {} for {}", change.resource, change.target);
        let mut record = MutationRecord::new(operation, change.resource.name(), change.flags);
        record.modification = Some(change.op.code());
        grid.journal.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ShareAttributes;
    use assert_matches::assert_matches;

    fn grid() -> InMemoryController {
        InMemoryController::from_state(GridState {
            hosts: vec![Host {
                name: "h1".into(),
                initiators: vec!["iqnA".into()],
                ..Default::default()
            }],
            pools: vec![Pool { name: "p1".into() }],
            volumes: vec![Volume {
                name: "v1".into(),
                size: Some("10GiB".into()),
                pool: Some("p1".into()),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_port_is_unique_across_hosts() {
        let controller = grid();
        let result = controller
            .create_host(&CreateHost {
                name: "h2".into(),
                initiator: Some("iqnA".into()),
                description: None,
                flags: 0,
            })
            .await;
        assert_matches!(result, Err(Error::Controller(msg)) if msg.contains("'h1'"));
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_host_with_assignment_cannot_be_deleted() {
        let controller = grid();
        controller
            .set_assignment(&AssignmentChange {
                resource: AssignedResource::Volume("v1".into()),
                target: "h1".into(),
                op: AssignmentOp::Add,
                flags: 0,
            })
            .await
            .unwrap();

        assert_matches!(controller.delete_host("h1").await, Err(Error::Controller(_)));
        assert_eq!(controller.journal()[0].modification, Some(0));
    }

    #[tokio::test]
    async fn test_snapshot_naming_and_recursive_delete() {
        let controller = grid();
        controller
            .create_volume_snapshot(&CreateVolumeSnapshot {
                parent: "v1".into(),
                name: Some("nightly".into()),
                description: None,
                access_mode: None,
                count: 2,
                flags: 0,
            })
            .await
            .unwrap();

        let names: Vec<_> = controller.snapshot().volumes.into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["nightly", "nightly_2", "v1"]);

        assert_matches!(
            controller.delete_volume("v1", DeleteFlags::NONE).await,
            Err(Error::Controller(msg)) if msg.contains("recursive")
        );
        controller.delete_volume("v1", DeleteFlags::RECURSIVE).await.unwrap();
        assert!(controller.snapshot().volumes.is_empty());
        assert_eq!(controller.journal().last().map(|r| r.flags), Some(262_144));
    }

    #[tokio::test]
    async fn test_assigned_volume_and_group_cannot_be_deleted() {
        let controller = grid();
        controller
            .create_host_group(&CreateHostGroup {
                name: "g1".into(),
                hosts: vec!["h1".into()],
                description: None,
                flags: 0,
            })
            .await
            .unwrap();
        controller
            .set_assignment(&AssignmentChange {
                resource: AssignedResource::Volume("v1".into()),
                target: "g1".into(),
                op: AssignmentOp::Add,
                flags: 0,
            })
            .await
            .unwrap();

        assert_matches!(
            controller.delete_volume("v1", DeleteFlags::RECURSIVE).await,
            Err(Error::Controller(msg)) if msg.contains("still assigned")
        );
        assert_matches!(
            controller.delete_host_group("g1").await,
            Err(Error::Controller(msg)) if msg.contains("active assignment")
        );
        assert_eq!(controller.snapshot().assignments.len(), 1);
        assert_eq!(controller.journal().len(), 2);

        let by_group = controller
            .list_assignments(&AssignmentScope::Target("g1".into()))
            .await
            .unwrap();
        assert_eq!(by_group.len(), 1);
        let by_host = controller
            .list_assignments(&AssignmentScope::Target("h1".into()))
            .await
            .unwrap();
        assert!(by_host.is_empty());

        controller
            .set_assignment(&AssignmentChange {
                resource: AssignedResource::Volume("v1".into()),
                target: "g1".into(),
                op: AssignmentOp::Remove,
                flags: 0,
            })
            .await
            .unwrap();
        controller.delete_host_group("g1").await.unwrap();
        assert!(controller.snapshot().host_groups.is_empty());
        assert_eq!(controller.snapshot().hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_assigned_snapshot_blocks_recursive_delete() {
        let controller = grid();
        controller
            .create_volume_snapshot(&CreateVolumeSnapshot {
                parent: "v1".into(),
                name: Some("snap".into()),
                description: None,
                access_mode: None,
                count: 1,
                flags: 0,
            })
            .await
            .unwrap();
        controller
            .set_assignment(&AssignmentChange {
                resource: AssignedResource::Volume("snap".into()),
                target: "h1".into(),
                op: AssignmentOp::Add,
                flags: 0,
            })
            .await
            .unwrap();

        assert_matches!(
            controller.delete_volume("v1", DeleteFlags::RECURSIVE).await,
            Err(Error::Controller(msg)) if msg.contains("'snap'")
        );
        assert_eq!(controller.snapshot().volumes.len(), 2);
    }

    #[tokio::test]
    async fn test_unnamed_share_snapshot_gets_name() {
        let controller = grid();
        controller
            .create_share(&CreateShare {
                name: "s1".into(),
                pool: "p1".into(),
                description: None,
                attributes: ShareAttributes::default(),
                flags: 0,
            })
            .await
            .unwrap();
        controller
            .create_share_snapshot(&CreateShareSnapshot {
                parent: "s1".into(),
                name: None,
                description: None,
                is_active: true,
                flags: 0,
            })
            .await
            .unwrap();

        let shares = controller.snapshot().shares;
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[1].name, "s1_snap1");
        assert_eq!(shares[1].parent.as_deref(), Some("s1"));
        assert_eq!(controller.journal()[0].sync_policy, Some(0));
    }

    #[tokio::test]
    async fn test_injected_rejection_and_offline() {
        let controller = grid();
        controller.reject("delete_volume", "v1", "volume is busy");
        assert_matches!(
            controller.delete_volume("v1", DeleteFlags::NONE).await,
            Err(Error::Controller(msg)) if msg == "volume is busy"
        );

        controller.go_offline();
        assert_matches!(controller.lookup_pool("p1").await, Err(Error::Transport(_)));
        assert_eq!(controller.lookup_count(), 0);
    }

    #[test]
    fn test_grid_state_yaml() {
        let state: GridState = serde_yaml::from_str(
            r#"
hosts:
  - name: h1
    initiators: [iqnA]
hostGroups:
  - name: g1
    hosts: [h1]
pools:
  - name: p1
assignments:
  - resource: { kind: volume, name: v1 }
    target: g1
"#,
        )
        .unwrap();
        assert_eq!(state.host_groups[0].hosts.len(), 1);
        assert_eq!(state.assignments[0].resource, AssignedResource::Volume("v1".into()));
    }
}
