//! Convergence Planner
//!
//! Maps (resource family, requested state, comparison) to an ordered list
//! of controller mutations, and executes that list. Planning is pure; only
//! [`Plan::execute`] talks to the controller.
//!
//! ```text
//!   Absent  + present  -> create (host: first initiator, then the rest)
//!   Partial + present  -> add missing initiators
//!   Exact   + present  -> no-op
//!   Absent  + absent   -> no-op
//!   Present + absent   -> delete / remove intersection / detach
//! ```

use crate::domain::model::{DeleteFlags, ShareType, VolumeType};
use crate::domain::ports::{
    AssignmentChange, AssignmentOp, ControllerClient, CreateHost, CreateHostGroup, CreateShare,
    CreateShareAlias, CreateShareSnapshot, CreateVolume, CreateVolumeSnapshot,
};
use crate::error::{Error, Result};
use crate::reconcile::comparator::Comparison;
use crate::reconcile::initiators::dedup_ports;
use crate::reconcile::request::{HostRequest, HostTarget, ShareRequest, TargetState, VolumeRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

// =============================================================================
// Mutations
// =============================================================================

/// One controller call in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Mutation {
    CreateHost(CreateHost),
    #[serde(rename_all = "camelCase")]
    DeleteHost { name: String },
    #[serde(rename_all = "camelCase")]
    AddInitiator { host: String, port: String, flags: u32 },
    #[serde(rename_all = "camelCase")]
    RemoveInitiator { host: String, port: String },
    CreateHostGroup(CreateHostGroup),
    #[serde(rename_all = "camelCase")]
    DeleteHostGroup { name: String },
    CreateVolume(CreateVolume),
    CreateVolumeSnapshot(CreateVolumeSnapshot),
    #[serde(rename_all = "camelCase")]
    DeleteVolume { name: String, flags: DeleteFlags },
    CreateShare(CreateShare),
    CreateShareAlias(CreateShareAlias),
    CreateShareSnapshot(CreateShareSnapshot),
    #[serde(rename_all = "camelCase")]
    DeleteShare { name: String, flags: DeleteFlags },
    SetAssignment(AssignmentChange),
}

impl Mutation {
    /// Resource named in failure messages
    pub fn resource(&self) -> String {
        match self {
            Mutation::CreateHost(req) => req.name.clone(),
            Mutation::DeleteHost { name }
            | Mutation::DeleteHostGroup { name }
            | Mutation::DeleteVolume { name, .. }
            | Mutation::DeleteShare { name, .. } => name.clone(),
            Mutation::AddInitiator { port, .. } | Mutation::RemoveInitiator { port, .. } => {
                port.clone()
            }
            Mutation::CreateHostGroup(req) => req.name.clone(),
            Mutation::CreateVolume(req) => req.name.clone(),
            Mutation::CreateVolumeSnapshot(req) => {
                req.name.clone().unwrap_or_else(|| req.parent.clone())
            }
            Mutation::CreateShare(req) => req.name.clone(),
            Mutation::CreateShareAlias(req) => req.name.clone(),
            Mutation::CreateShareSnapshot(req) => {
                req.name.clone().unwrap_or_else(|| req.parent.clone())
            }
            Mutation::SetAssignment(change) => change.resource.name().to_string(),
        }
    }

    /// Human-readable operation, phrased to follow "Failed to"
    pub fn operation(&self) -> String {
        match self {
            Mutation::CreateHost(_) => "create new host entry".into(),
            Mutation::DeleteHost { .. } => "remove host entry".into(),
            Mutation::AddInitiator { host, .. } => {
                format!("create new initiator entry on host '{}' for port", host)
            }
            Mutation::RemoveInitiator { host, .. } => {
                format!("remove initiator entry from host '{}' for port", host)
            }
            Mutation::CreateHostGroup(_) => "create host group".into(),
            Mutation::DeleteHostGroup { .. } => "delete host group".into(),
            Mutation::CreateVolume(_) => "create storage volume".into(),
            Mutation::CreateVolumeSnapshot(req) => {
                format!("snapshot storage volume '{}' as", req.parent)
            }
            Mutation::DeleteVolume { .. } => "delete storage volume".into(),
            Mutation::CreateShare(_) => "create network share".into(),
            Mutation::CreateShareAlias(req) => {
                format!("create {} of network share '{}' named", req.share_type, req.parent)
            }
            Mutation::CreateShareSnapshot(req) => {
                format!("snapshot network share '{}' as", req.parent)
            }
            Mutation::DeleteShare { .. } => "delete network share".into(),
            Mutation::SetAssignment(change) => match change.op {
                AssignmentOp::Add => format!(
                    "create assignment entry for '{}' on {}",
                    change.target,
                    change.resource.kind()
                ),
                AssignmentOp::Remove => format!(
                    "remove assignment entry for '{}' from {}",
                    change.target,
                    change.resource.kind()
                ),
            },
        }
    }

    async fn apply<C>(&self, client: &C) -> Result<()>
    where
        C: ControllerClient + ?Sized,
    {
        match self {
            Mutation::CreateHost(req) => client.create_host(req).await,
            Mutation::DeleteHost { name } => client.delete_host(name).await,
            Mutation::AddInitiator { host, port, flags } => {
                client.add_initiator(host, port, *flags).await
            }
            Mutation::RemoveInitiator { host, port } => client.remove_initiator(host, port).await,
            Mutation::CreateHostGroup(req) => client.create_host_group(req).await,
            Mutation::DeleteHostGroup { name } => client.delete_host_group(name).await,
            Mutation::CreateVolume(req) => client.create_volume(req).await,
            Mutation::CreateVolumeSnapshot(req) => client.create_volume_snapshot(req).await,
            Mutation::DeleteVolume { name, flags } => client.delete_volume(name, *flags).await,
            Mutation::CreateShare(req) => client.create_share(req).await,
            Mutation::CreateShareAlias(req) => client.create_share_alias(req).await,
            Mutation::CreateShareSnapshot(req) => client.create_share_snapshot(req).await,
            Mutation::DeleteShare { name, flags } => client.delete_share(name, *flags).await,
            Mutation::SetAssignment(change) => client.set_assignment(change).await,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Ordered mutations that converge one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<Mutation>,
}

impl Plan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(step: Mutation) -> Self {
        Self { steps: vec![step] }
    }

    pub fn push(&mut self, step: Mutation) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[Mutation] {
        &self.steps
    }

    /// Run every step in order.
    ///
    /// The first rejected step aborts the plan; steps that already ran are
    /// left in place.
    pub async fn execute<C>(&self, client: &C) -> Result<()>
    where
        C: ControllerClient + ?Sized,
    {
        for (index, step) in self.steps.iter().enumerate() {
            info!(
                "[{}/{}] {} '{}' on {}",
                index + 1,
                self.steps.len(),
                step.operation(),
                step.resource(),
                client.controller_name()
            );

            if let Err(e) = step.apply(client).await {
                if index > 0 {
                    warn!(
                        "Plan aborted after {} of {} steps; earlier steps were not rolled back",
                        index,
                        self.steps.len()
                    );
                }
                return Err(Error::mutation(step.resource(), step.operation(), e));
            }
        }
        Ok(())
    }
}

impl FromIterator<Mutation> for Plan {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Host Family
// =============================================================================

/// Plan a host, host-group, initiator or assignment request.
///
/// `assignment` is the comparison of the (resource, target) association and
/// is only consulted when the request names a volume or share.
pub fn plan_host(
    request: &HostRequest,
    target: &HostTarget,
    existing: &Comparison,
    assignment: Option<&Comparison>,
) -> Result<Plan> {
    if let Some(resource) = request.assigned_resource() {
        if existing.is_absent() {
            return Err(Error::PreconditionNotMet(match request.state {
                TargetState::Present => format!(
                    "cannot attach {} to {} because it does not exist",
                    resource, target
                ),
                TargetState::Absent => format!(
                    "cannot remove assignment of {} from {} because it does not exist",
                    resource, target
                ),
            }));
        }

        let op = match (request.state, assignment) {
            (TargetState::Present, Some(Comparison::Absent)) => AssignmentOp::Add,
            (TargetState::Absent, Some(found)) if found.is_present() => AssignmentOp::Remove,
            _ => {
                debug!("Assignment of {} to {} already converged", resource, target);
                return Ok(Plan::empty());
            }
        };

        return Ok(Plan::single(Mutation::SetAssignment(AssignmentChange {
            resource,
            target: target.name().to_string(),
            op,
            flags: request.flags,
        })));
    }

    match target {
        HostTarget::Host(name) => plan_host_entry(request, name, existing),
        HostTarget::HostGroup(name) => plan_host_group(request, name, existing),
    }
}

fn plan_host_entry(request: &HostRequest, name: &str, existing: &Comparison) -> Result<Plan> {
    match (request.state, existing) {
        (TargetState::Present, Comparison::Absent) => {
            let ports = dedup_ports(&request.initiators);
            let mut ports = ports.into_iter();

            let mut plan = Plan::single(Mutation::CreateHost(CreateHost {
                name: name.to_string(),
                initiator: ports.next(),
                description: request.description.clone(),
                flags: request.flags,
            }));
            for port in ports {
                plan.push(Mutation::AddInitiator {
                    host: name.to_string(),
                    port,
                    flags: request.flags,
                });
            }
            Ok(plan)
        }
        (TargetState::Present, Comparison::PresentPartialMatch(delta)) => Ok(delta
            .iter()
            .map(|port| Mutation::AddInitiator {
                host: name.to_string(),
                port: port.to_string(),
                flags: request.flags,
            })
            .collect()),
        (TargetState::Present, Comparison::PresentExactMatch) => Ok(Plan::empty()),
        (TargetState::Absent, Comparison::Absent) => {
            if request.initiators.is_empty() {
                Ok(Plan::empty())
            } else {
                Err(Error::PreconditionNotMet(format!(
                    "cannot remove initiators from host entry '{}' because it does not exist",
                    name
                )))
            }
        }
        (TargetState::Absent, Comparison::PresentPartialMatch(delta)) => Ok(delta
            .iter()
            .map(|port| Mutation::RemoveInitiator {
                host: name.to_string(),
                port: port.to_string(),
            })
            .collect()),
        (TargetState::Absent, Comparison::PresentExactMatch) => {
            if request.initiators.is_empty() {
                Ok(Plan::single(Mutation::DeleteHost {
                    name: name.to_string(),
                }))
            } else {
                Ok(Plan::empty())
            }
        }
    }
}

fn plan_host_group(request: &HostRequest, name: &str, existing: &Comparison) -> Result<Plan> {
    match (request.state, existing.is_present()) {
        (TargetState::Present, false) => {
            let hosts = dedup_ports(&request.hosts);
            if hosts.is_empty() {
                return Err(Error::Validation(format!(
                    "host group '{}' does not exist and cannot be created without 'hosts'",
                    name
                )));
            }
            Ok(Plan::single(Mutation::CreateHostGroup(CreateHostGroup {
                name: name.to_string(),
                hosts,
                description: request.description.clone(),
                flags: request.flags,
            })))
        }
        (TargetState::Present, true) => {
            if !request.hosts.is_empty() {
                warn!(
                    "Host group '{}' already exists; membership is not modified by this request",
                    name
                );
            }
            Ok(Plan::empty())
        }
        (TargetState::Absent, false) => Ok(Plan::empty()),
        (TargetState::Absent, true) => Ok(Plan::single(Mutation::DeleteHostGroup {
            name: name.to_string(),
        })),
    }
}

// =============================================================================
// Volume Family
// =============================================================================

/// Plan a storage volume request
pub fn plan_volume(request: &VolumeRequest, existing: &Comparison) -> Result<Plan> {
    match (request.state, existing.is_present()) {
        (TargetState::Present, true) | (TargetState::Absent, false) => Ok(Plan::empty()),
        (TargetState::Present, false) => match request.volume_type {
            VolumeType::Normal => {
                let (name, size, pool) = match (
                    request.volume_name(),
                    request.size.as_deref(),
                    request.pool_name(),
                ) {
                    (Some(name), Some(size), Some(pool)) => (name, size, pool),
                    _ => {
                        return Err(Error::Validation(
                            "a normal volume needs 'volume', 'size' and 'pool'".into(),
                        ))
                    }
                };
                Ok(Plan::single(Mutation::CreateVolume(CreateVolume {
                    name: name.to_string(),
                    size: size.trim().to_string(),
                    pool: pool.to_string(),
                    description: request.description.clone(),
                    flags: request.flags,
                })))
            }
            VolumeType::Snapshot => {
                let parent = request.parent_name().ok_or_else(|| {
                    Error::Validation("to create a 'snapshot', 'parent' parameter must be specified".into())
                })?;
                Ok(Plan::single(Mutation::CreateVolumeSnapshot(CreateVolumeSnapshot {
                    parent: parent.to_string(),
                    name: request.volume_name().map(str::to_string),
                    description: request.description.clone(),
                    access_mode: request.access_mode,
                    count: request.count.unwrap_or(1),
                    flags: request.flags,
                })))
            }
            VolumeType::Clone => Err(Error::Unsupported(format!(
                "cloning storage volume '{}' is not implemented",
                request.parent_name().unwrap_or_default()
            ))),
        },
        (TargetState::Absent, true) => {
            let name = request
                .volume_name()
                .ok_or_else(|| Error::Validation("'volume' parameter must be specified".into()))?;
            Ok(Plan::single(Mutation::DeleteVolume {
                name: name.to_string(),
                flags: DeleteFlags::for_request(request.flags, request.delete_children),
            }))
        }
    }
}

// =============================================================================
// Share Family
// =============================================================================

/// Plan a network share request
pub fn plan_share(request: &ShareRequest, existing: &Comparison) -> Result<Plan> {
    match (request.state, existing.is_present()) {
        (TargetState::Present, true) | (TargetState::Absent, false) => Ok(Plan::empty()),
        (TargetState::Present, false) => {
            let name = request.share_name();
            let parent = request.parent_name();
            let step = match (request.share_type, name, parent) {
                (ShareType::Normal, Some(name), _) => {
                    let pool = request.pool_name().ok_or_else(|| {
                        Error::Validation(
                            "to create a normal share, 'pool' parameter must be specified".into(),
                        )
                    })?;
                    Mutation::CreateShare(CreateShare {
                        name: name.to_string(),
                        pool: pool.to_string(),
                        description: request.description.clone(),
                        attributes: request.attributes(),
                        flags: request.flags,
                    })
                }
                (share_type @ (ShareType::Subshare | ShareType::Alias), Some(name), Some(parent)) => {
                    Mutation::CreateShareAlias(CreateShareAlias {
                        name: name.to_string(),
                        share_type,
                        parent: parent.to_string(),
                        sub_path: request.sub_path().map(str::to_string),
                        inherit_settings: request.inherit_settings,
                        description: request.description.clone(),
                        public_nfs: request.public_nfs,
                        is_active: request.is_active,
                        flags: request.flags,
                    })
                }
                (ShareType::Snapshot, name, Some(parent)) => {
                    Mutation::CreateShareSnapshot(CreateShareSnapshot {
                        parent: parent.to_string(),
                        name: name.map(str::to_string),
                        description: request.description.clone(),
                        is_active: request.is_active,
                        flags: request.flags,
                    })
                }
                (share_type, _, _) => {
                    return Err(Error::Validation(format!(
                        "incomplete request for a '{}' share",
                        share_type
                    )))
                }
            };
            Ok(Plan::single(step))
        }
        (TargetState::Absent, true) => {
            let name = request
                .share_name()
                .ok_or_else(|| Error::Validation("'share' parameter must be specified".into()))?;
            Ok(Plan::single(Mutation::DeleteShare {
                name: name.to_string(),
                flags: DeleteFlags::for_request(request.flags, request.delete_children),
            }))
        }
    }
}
