//! Declarative Reconciliation
//!
//! Converges one storage-grid resource toward a desired state:
//!
//! ```text
//!   request ─► validate ─► lookup target ─► classify ─► preconditions
//!                                                           │
//!   outcome ◄── execute (unless check mode) ◄── plan ◄──────┘
//! ```
//!
//! Every lookup and mutation is awaited in order; nothing runs
//! concurrently within an invocation.

pub mod comparator;
pub mod initiators;
pub mod outcome;
pub mod planner;
pub mod request;
pub mod validator;

pub use comparator::Comparison;
pub use initiators::{DeltaDirection, InitiatorDelta};
pub use outcome::{InvocationContext, JsonReporter, Outcome, Report};
pub use planner::{Mutation, Plan};
pub use request::{DesiredState, HostRequest, HostTarget, ShareRequest, TargetState, VolumeRequest};

use crate::domain::model::AssignedResource;
use crate::domain::ports::{AssignmentScope, ControllerClientRef};
use crate::error::{Error, Result};
use comparator::{classify_existence, compare_host};
use tracing::{debug, error, info, warn};

// =============================================================================
// Reconciler Configuration
// =============================================================================

/// Configuration for the reconciler
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// Plan without executing any mutation
    pub check_mode: bool,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Drives one desired-state request against a controller
pub struct Reconciler {
    config: ReconcilerConfig,
    client: ControllerClientRef,
}

impl Reconciler {
    pub fn new(client: ControllerClientRef, config: ReconcilerConfig) -> Self {
        Self { config, client }
    }

    /// Validate, look up and plan without mutating anything
    pub async fn plan(&self, desired: &DesiredState) -> Result<Plan> {
        validator::validate(desired)?;

        debug!(
            "Planning {} '{}' (state={}) against {}",
            desired.family(),
            desired.name().unwrap_or("<controller-assigned>"),
            desired.state(),
            self.client.controller_name()
        );

        match desired {
            DesiredState::Host(request) => self.plan_host(request).await,
            DesiredState::Volume(request) => self.plan_volume(request).await,
            DesiredState::Share(request) => self.plan_share(request).await,
        }
    }

    /// Plan and, unless in check mode, execute.
    ///
    /// Unsupported operations report `Unchanged`; every other error is
    /// returned to the caller.
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<Report> {
        let check_mode = self.config.check_mode;

        let plan = match self.plan(desired).await {
            Ok(plan) => plan,
            Err(Error::Unsupported(reason)) => {
                warn!("Skipping unsupported operation: {}", reason);
                return Ok(Report::unchanged(check_mode));
            }
            Err(e) => return Err(e),
        };

        if plan.is_empty() {
            debug!("{} already converged", desired.family());
            return Ok(Report::unchanged(check_mode));
        }

        if check_mode {
            info!("Check mode: {} mutation(s) would be applied", plan.len());
        } else {
            plan.execute(self.client.as_ref()).await?;
            info!("Applied {} mutation(s)", plan.len());
        }

        Ok(Report {
            outcome: Outcome::Changed,
            plan,
            check_mode,
        })
    }

    /// Reconcile and hand the single outcome to `ctx`
    pub async fn run<X>(&self, desired: &DesiredState, ctx: X) -> Outcome
    where
        X: InvocationContext,
    {
        let report = match self.reconcile(desired).await {
            Ok(report) => report,
            Err(e) => {
                if e.is_pre_mutation() {
                    warn!("Refused {} request: {}", desired.family(), e);
                } else {
                    error!("Reconciliation of {} failed: {}", desired.family(), e);
                }
                Report::failed(e.to_string(), Plan::empty(), self.config.check_mode)
            }
        };

        let outcome = report.outcome.clone();
        ctx.complete(report);
        outcome
    }

    // =========================================================================
    // Per-family lookups
    // =========================================================================

    async fn plan_host(&self, request: &HostRequest) -> Result<Plan> {
        let client = self.client.as_ref();
        let target = request.target().ok_or_else(|| {
            Error::Validation("exactly one of 'host' or 'hostgroup' must be specified".into())
        })?;

        let existing = match &target {
            HostTarget::Host(name) => {
                let lookup = client.lookup_host(name).await?;
                compare_host(&request.initiators, &lookup, request.state)
            }
            HostTarget::HostGroup(name) => classify_existence(&client.lookup_host_group(name).await?),
        };
        debug!("{} classified as {:?}", target, existing);

        let assignment = match request.assigned_resource() {
            Some(resource) if existing.is_present() => {
                validator::require_assigned_resource(client, &resource, request.state).await?;
                let lookup = client.lookup_assignment(&resource, target.name()).await?;
                Some(classify_existence(&lookup))
            }
            Some(_) => None,
            None => {
                if let HostTarget::HostGroup(name) = &target {
                    if request.state == TargetState::Absent && existing.is_present() {
                        let scope = AssignmentScope::Target(name.clone());
                        validator::require_unassigned(client, &scope, &target.to_string()).await?;
                    }
                }
                None
            }
        };

        planner::plan_host(request, &target, &existing, assignment.as_ref())
    }

    async fn plan_volume(&self, request: &VolumeRequest) -> Result<Plan> {
        let client = self.client.as_ref();

        // Unnamed snapshots get their name from the controller
        let existing = match request.volume_name() {
            Some(name) => classify_existence(&client.lookup_volume(name).await?),
            None => Comparison::Absent,
        };

        match (request.state, request.volume_name()) {
            (TargetState::Present, _) if existing.is_absent() => {
                validator::check_volume_preconditions(client, request).await?;
            }
            (TargetState::Absent, Some(name)) if existing.is_present() => {
                let scope = AssignmentScope::Resource(AssignedResource::Volume(name.to_string()));
                validator::require_unassigned(client, &scope, &format!("storage volume '{}'", name))
                    .await?;
            }
            _ => {}
        }

        planner::plan_volume(request, &existing)
    }

    async fn plan_share(&self, request: &ShareRequest) -> Result<Plan> {
        let client = self.client.as_ref();

        let existing = match request.share_name() {
            Some(name) => classify_existence(&client.lookup_share(name).await?),
            None => Comparison::Absent,
        };

        if request.state == TargetState::Present && existing.is_absent() {
            validator::check_share_preconditions(client, request).await?;
        }

        planner::plan_share(request, &existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{GridState, InMemoryController};
    use crate::domain::model::{Assignment, Host, HostGroup, Pool, Volume, VolumeType};
    use crate::error::ErrorKind;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn seeded() -> GridState {
        GridState {
            hosts: vec![Host {
                name: "h1".into(),
                initiators: vec!["A".into(), "B".into(), "C".into()],
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
        }
    }

    fn setup(state: GridState, check_mode: bool) -> (Arc<InMemoryController>, Reconciler) {
        let controller = Arc::new(InMemoryController::from_state(state));
        let reconciler = Reconciler::new(controller.clone(), ReconcilerConfig { check_mode });
        (controller, reconciler)
    }

    fn parse(yaml: &str) -> DesiredState {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_new_host_with_initiators() {
        let (controller, reconciler) = setup(GridState::default(), false);
        let desired = parse("kind: host\nhost: bar\ninitiators: [iqnA, iqnB]\n");

        let report = reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(report.outcome, Outcome::Changed);

        let ops: Vec<_> = controller.journal().into_iter().map(|r| r.operation).collect();
        assert_eq!(ops, vec!["create_host", "add_initiator"]);
        assert_eq!(controller.snapshot().hosts[0].initiators, vec!["iqnA", "iqnB"]);

        // Second run converges to unchanged
        let report = reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(report.outcome, Outcome::Unchanged);
        assert_eq!(controller.journal().len(), 2);
    }

    #[tokio::test]
    async fn test_add_only_missing_initiators() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: host\nhost: h1\ninitiators: [B, C, D]\n");

        reconciler.reconcile(&desired).await.unwrap();
        let journal = controller.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].resource, "D");
    }

    #[tokio::test]
    async fn test_remove_intersection_only() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: host\nhost: h1\ninitiators: [B, X]\nstate: absent\n");

        reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(controller.snapshot().hosts[0].initiators, vec!["A", "C"]);
        assert_eq!(controller.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_host_is_noop() {
        let (controller, reconciler) = setup(GridState::default(), false);
        let report = reconciler
            .reconcile(&parse("kind: host\nhost: ghost\nstate: absent\n"))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Unchanged);
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_lookups() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: host\nhost: h1\nhostgroup: g1\n");

        let err = reconciler.reconcile(&desired).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(controller.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_parent_mutates_nothing() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: volume\nvolume: s1\nvolumeType: snapshot\nparent: nope\n");

        let err = reconciler.reconcile(&desired).await.unwrap_err();
        assert_matches!(err, Error::PreconditionNotMet(_));
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_recursive_delete_sends_recursive_flag() {
        let mut state = seeded();
        state.volumes.push(Volume {
            name: "v1_snap".into(),
            volume_type: VolumeType::Snapshot,
            parent: Some("v1".into()),
            ..Default::default()
        });
        let (controller, reconciler) = setup(state, false);
        let desired = parse("kind: volume\nvolume: v1\nstate: absent\ndeleteChildren: true\n");

        reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(controller.journal()[0].flags, 262_144);
        assert!(controller.snapshot().volumes.is_empty());
    }

    #[tokio::test]
    async fn test_clone_is_reported_unchanged() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: volume\nvolume: v2\nvolumeType: clone\nparent: v1\n");

        let report = reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(report.outcome, Outcome::Unchanged);
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_check_mode_never_mutates() {
        let (controller, reconciler) = setup(seeded(), true);
        let desired = parse("kind: volume\nvolume: v2\nsize: 1GiB\npool: p1\n");

        let report = reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(report.outcome, Outcome::Changed);
        assert!(report.check_mode);
        assert_eq!(report.plan.len(), 1);
        assert!(controller.journal().is_empty());
        assert_eq!(controller.snapshot().volumes.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_earlier_steps() {
        let (controller, reconciler) = setup(GridState::default(), false);
        controller.reject("add_initiator", "iqnC", "port rejected");
        let desired = parse("kind: host\nhost: h2\ninitiators: [iqnA, iqnB, iqnC, iqnD]\n");

        let err = reconciler.reconcile(&desired).await.unwrap_err();
        assert_matches!(err, Error::RemoteMutationFailure { ref resource, .. } if resource == "iqnC");
        assert_eq!(
            err.to_string(),
            "Failed to create new initiator entry on host 'h2' for port 'iqnC', error was 'port rejected'"
        );
        assert_eq!(controller.snapshot().hosts[0].initiators, vec!["iqnA", "iqnB"]);
        assert_eq!(controller.journal().len(), 2);
    }

    #[tokio::test]
    async fn test_first_step_failure_stops_plan() {
        let (controller, reconciler) = setup(GridState::default(), false);
        controller.reject("create_host", "h2", "denied");
        let desired = parse("kind: host\nhost: h2\ninitiators: [iqnA, iqnB]\n");

        assert!(reconciler.reconcile(&desired).await.is_err());
        assert!(controller.journal().is_empty());
        assert!(controller.snapshot().hosts.is_empty());
    }

    #[tokio::test]
    async fn test_assignment_lifecycle() {
        let (controller, reconciler) = setup(seeded(), false);
        let attach = parse("kind: host\nhost: h1\nvolume: v1\n");

        assert_eq!(reconciler.reconcile(&attach).await.unwrap().outcome, Outcome::Changed);
        assert_eq!(
            controller.snapshot().assignments,
            vec![Assignment {
                resource: AssignedResource::Volume("v1".into()),
                target: "h1".into(),
            }]
        );
        assert_eq!(reconciler.reconcile(&attach).await.unwrap().outcome, Outcome::Unchanged);

        // Deleting a host with an active assignment is refused by the controller
        let delete = parse("kind: host\nhost: h1\nstate: absent\n");
        let err = reconciler.reconcile(&delete).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteMutationFailure);

        let detach = parse("kind: host\nhost: h1\nvolume: v1\nstate: absent\n");
        assert_eq!(reconciler.reconcile(&detach).await.unwrap().outcome, Outcome::Changed);
        assert!(controller.snapshot().assignments.is_empty());
        assert_eq!(controller.snapshot().hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_assignment_to_missing_target() {
        let (controller, reconciler) = setup(seeded(), false);
        let err = reconciler
            .reconcile(&parse("kind: host\nhostgroup: g9\nvolume: v1\n"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::PreconditionNotMet(_));
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_share_with_sync_policy_encoding() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: share\nshare: s1\npool: p1\nsyncPolicy: sometimes\n");

        reconciler.reconcile(&desired).await.unwrap();
        assert_eq!(controller.journal()[0].sync_policy, Some(0));

        let alias = parse("kind: share\nshare: s1-ro\nshareType: alias\nparent: s1\n");
        reconciler.reconcile(&alias).await.unwrap();
        assert_eq!(controller.snapshot().shares.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_absence() {
        let (controller, reconciler) = setup(seeded(), false);
        controller.go_offline();

        let err = reconciler
            .reconcile(&parse("kind: volume\nvolume: v1\nstate: absent\n"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_assigned_volume_delete_is_refused() {
        let mut state = seeded();
        state.assignments.push(Assignment {
            resource: AssignedResource::Volume("v1".into()),
            target: "h1".into(),
        });
        let (controller, reconciler) = setup(state, false);

        let err = reconciler
            .reconcile(&parse("kind: volume
volume: v1
state: absent
deleteChildren: true
"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::PreconditionNotMet(ref msg) if msg.contains("'h1'"));
        assert!(controller.journal().is_empty());
        assert_eq!(controller.snapshot().volumes.len(), 1);
        assert_eq!(controller.snapshot().assignments.len(), 1);
    }

    #[tokio::test]
    async fn test_assigned_host_group_delete_is_refused() {
        let mut state = seeded();
        state.host_groups.push(HostGroup {
            name: "g1".into(),
            hosts: ["h1".to_string()].into_iter().collect(),
            ..Default::default()
        });
        state.assignments.push(Assignment {
            resource: AssignedResource::Volume("v1".into()),
            target: "g1".into(),
        });
        let (controller, reconciler) = setup(state, false);
        let delete = parse("kind: host
hostgroup: g1
state: absent
");

        let err = reconciler.reconcile(&delete).await.unwrap_err();
        assert_matches!(err, Error::PreconditionNotMet(ref msg) if msg.contains("volume 'v1'"));
        assert!(controller.journal().is_empty());
        assert_eq!(controller.snapshot().host_groups.len(), 1);
        assert_eq!(controller.snapshot().assignments.len(), 1);

        // Detaching first lets the delete through
        let detach = parse("kind: host
hostgroup: g1
volume: v1
state: absent
");
        reconciler.reconcile(&detach).await.unwrap();
        assert_eq!(reconciler.reconcile(&delete).await.unwrap().outcome, Outcome::Changed);
        assert!(controller.snapshot().host_groups.is_empty());
    }

    #[tokio::test]
    async fn test_named_snapshot_batch_converges() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: volume
volume: nightly
volumeType: snapshot
parent: v1
count: 2
");

        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Changed);
        assert_eq!(controller.journal().len(), 2);

        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Unchanged);
        assert_eq!(controller.journal().len(), 2);
        assert_eq!(controller.snapshot().volumes.len(), 3);
    }

    #[tokio::test]
    async fn test_volume_create_converges() {
        let mut state = seeded();
        state.volumes.clear();
        let (controller, reconciler) = setup(state, false);
        let desired = parse("kind: volume
volume: v1
size: 1024
pool: p1
");

        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Changed);
        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Unchanged);
        assert_eq!(controller.journal().len(), 1);
        assert_eq!(controller.snapshot().volumes[0].size.as_deref(), Some("1024"));
    }

    #[tokio::test]
    async fn test_share_create_converges() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: share
share: s1
pool: p1
");

        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Changed);
        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Unchanged);
        assert_eq!(controller.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_share_is_noop() {
        let (controller, reconciler) = setup(seeded(), false);
        let report = reconciler
            .reconcile(&parse("kind: share
share: s1
state: absent
deleteChildren: false
"))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Unchanged);
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_host_group_create_converges() {
        let (controller, reconciler) = setup(seeded(), false);
        let desired = parse("kind: host
hostgroup: g1
hosts: [h1]
");

        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Changed);
        assert_eq!(reconciler.reconcile(&desired).await.unwrap().outcome, Outcome::Unchanged);
        assert_eq!(controller.journal().len(), 1);
        assert_eq!(controller.snapshot().host_groups[0].hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_initiator_fails_before_lookups() {
        let (controller, reconciler) = setup(seeded(), false);
        let err = reconciler
            .reconcile(&parse("kind: host
host: h1
initiators: [A, '']
"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(controller.lookup_count(), 0);
        assert!(controller.journal().is_empty());
    }

    #[tokio::test]
    async fn test_run_completes_context_once() {
        let (_, reconciler) = setup(GridState::default(), false);
        let mut reports = Vec::new();
        let outcome = reconciler
            .run(&parse("kind: volume\nvolume: v1\nsize: 1GiB\npool: p9\n"), |report: Report| {
                reports.push(report)
            })
            .await;

        assert!(outcome.failed());
        assert_eq!(reports.len(), 1);
        assert!(reports[0].outcome.message().unwrap_or_default().contains("p9"));
    }
}
