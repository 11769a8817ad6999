//! Precondition Validator
//!
//! Structural checks are pure and run before any lookup. Precondition checks
//! resolve parents, pools and assigned resources through the controller and
//! only run once the comparator has decided a mutation is needed.

use crate::domain::model::{AssignedResource, ShareType, VolumeType};
use crate::domain::ports::{AssignmentScope, ControllerClient};
use crate::error::{Error, Result};
use crate::reconcile::request::{
    DesiredState, HostRequest, ShareRequest, TargetState, VolumeRequest,
};
use tracing::debug;

// =============================================================================
// Structural Validation
// =============================================================================

/// Validate the shape of a request without touching the controller
pub fn validate(desired: &DesiredState) -> Result<()> {
    match desired {
        DesiredState::Host(request) => validate_host_request(request),
        DesiredState::Volume(request) => validate_volume_request(request),
        DesiredState::Share(request) => validate_share_request(request),
    }
}

pub fn validate_host_request(request: &HostRequest) -> Result<()> {
    match (request.has_host(), request.has_hostgroup()) {
        (true, true) => {
            return Err(Error::Validation(
                "cannot perform operation that has both 'host' and 'hostgroup' as the target".into(),
            ))
        }
        (false, false) => {
            return Err(Error::Validation(
                "cannot perform operation unless at least one of 'host' or 'hostgroup' is specified"
                    .into(),
            ))
        }
        _ => {}
    }

    if request.has_volume() && !request.initiators.is_empty() {
        return Err(Error::Validation(
            "you cannot specify both 'volume' and 'initiators' arguments together".into(),
        ));
    }

    if request.has_share() && !request.initiators.is_empty() {
        return Err(Error::Validation(
            "you cannot specify both 'share' and 'initiators' arguments together".into(),
        ));
    }

    if request.has_volume() && request.has_share() {
        return Err(Error::Validation(
            "an assignment targets exactly one of 'volume' or 'share'".into(),
        ));
    }

    if request.has_hostgroup() && !request.initiators.is_empty() {
        return Err(Error::Validation(
            "'initiators' can only be managed on a 'host' target".into(),
        ));
    }

    if request.has_host() && !request.hosts.is_empty() {
        return Err(Error::Validation(
            "'hosts' can only be given for a 'hostgroup' target".into(),
        ));
    }

    if request.initiators.iter().any(|port| port.trim().is_empty()) {
        return Err(Error::Validation(
            "'initiators' must not contain blank entries".into(),
        ));
    }

    Ok(())
}

pub fn validate_volume_request(request: &VolumeRequest) -> Result<()> {
    let volume_type = request.volume_type;
    let creating = request.state == TargetState::Present;

    if request.volume_name().is_none() && !(creating && volume_type == VolumeType::Snapshot) {
        return Err(Error::Validation(format!(
            "to create/delete a '{}', the 'volume' parameter must be specified",
            volume_type
        )));
    }

    if creating {
        if volume_type.requires_parent() && request.parent_name().is_none() {
            return Err(Error::Validation(format!(
                "to create a '{}', 'parent' parameter must be specified",
                volume_type
            )));
        }

        if volume_type == VolumeType::Normal {
            if request.size.is_none() {
                return Err(Error::Validation(
                    "to create a normal volume you must provide a 'size' parameter".into(),
                ));
            }
            if request.pool_name().is_none() {
                return Err(Error::Validation(
                    "to create a normal volume, 'pool' parameter must be specified".into(),
                ));
            }
        }
    }

    if let Some(size) = &request.size {
        let bytes = parse_capacity(size).map_err(|e| invalid_field("size", e))?;
        if bytes == 0 {
            return Err(Error::Validation("'size' must be greater than zero".into()));
        }
    }

    if request.count == Some(0) {
        return Err(Error::Validation("'count' must be at least 1".into()));
    }

    Ok(())
}

pub fn validate_share_request(request: &ShareRequest) -> Result<()> {
    let share_type = request.share_type;
    let creating = request.state == TargetState::Present;

    if request.share_name().is_none() && !(creating && share_type == ShareType::Snapshot) {
        return Err(Error::Validation(format!(
            "to create/delete a '{}', the 'share' parameter must be specified",
            share_type
        )));
    }

    if creating {
        if share_type.requires_parent() && request.parent_name().is_none() {
            return Err(Error::Validation(format!(
                "to create a '{}', 'parent' parameter must be specified",
                share_type
            )));
        }

        if share_type == ShareType::Subshare && request.sub_path().is_none() {
            return Err(Error::Validation(
                "to create a subshare, 'subPath' parameter must be specified".into(),
            ));
        }

        if share_type == ShareType::Normal && request.pool_name().is_none() {
            return Err(Error::Validation(
                "to create a normal share, 'pool' parameter must be specified".into(),
            ));
        }
    }

    if let Some(quota) = &request.quota {
        parse_capacity(quota).map_err(|e| invalid_field("quota", e))?;
    }

    if let Some(reserved) = &request.reserved_space {
        parse_capacity(reserved).map_err(|e| invalid_field("reservedSpace", e))?;
    }

    if request.record_size_kb != 0 && !request.record_size_kb.is_power_of_two() {
        return Err(Error::Validation(format!(
            "'recordSizeKb' must be a power of 2, got {}",
            request.record_size_kb
        )));
    }

    if let Some(permissions) = &request.permissions {
        validate_permissions(permissions)?;
    }

    if request.copies == Some(0) {
        return Err(Error::Validation("'copies' must be at least 1".into()));
    }

    Ok(())
}

fn invalid_field(field: &str, err: Error) -> Error {
    match err {
        Error::CapacityParse(reason) => {
            Error::Validation(format!("'{}' is not a valid capacity: {}", field, reason))
        }
        other => other,
    }
}

/// Accept octal (`750`, `0750`) or symbolic (`rwxr-x---`) permissions
fn validate_permissions(permissions: &str) -> Result<()> {
    let p = permissions.trim();

    let octal = (3..=4).contains(&p.len()) && p.chars().all(|c| ('0'..='7').contains(&c));

    let symbolic = p.len() == 9
        && p.chars().enumerate().all(|(i, c)| {
            c == '-'
                || match i % 3 {
                    0 => c == 'r',
                    1 => c == 'w',
                    _ => matches!(c, 'x' | 's' | 'S' | 't' | 'T'),
                }
        });

    if octal || symbolic {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "'permissions' must be octal (750) or symbolic (rwxr-x---), got '{}'",
            permissions
        )))
    }
}

/// Parse a capacity string (e.g. "1024", "10GiB", "1.5T") into bytes
pub fn parse_capacity(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::CapacityParse("empty capacity string".into()));
    }

    // Find where the number ends and unit begins
    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit_str = s[num_end..].trim();

    let num: f64 = num_str
        .parse()
        .map_err(|_| Error::CapacityParse(format!("invalid number: {}", num_str)))?;

    let multiplier: u64 = match unit_str.to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KI" | "KIB" => 1024,
        "M" | "MB" | "MI" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GI" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TI" | "TIB" => 1024 * 1024 * 1024 * 1024,
        "P" | "PB" | "PI" | "PIB" => 1024 * 1024 * 1024 * 1024 * 1024,
        _ => {
            return Err(Error::CapacityParse(format!(
                "unknown unit: {}",
                unit_str
            )))
        }
    };

    Ok((num * multiplier as f64) as u64)
}

// =============================================================================
// Precondition Lookups
// =============================================================================

/// Resolve the parent and pool a volume creation depends on
pub async fn check_volume_preconditions<C>(client: &C, request: &VolumeRequest) -> Result<()>
where
    C: ControllerClient + ?Sized,
{
    let volume_type = request.volume_type;

    if volume_type.requires_parent() {
        let parent = request.parent_name().ok_or_else(|| {
            Error::Validation(format!(
                "to create a '{}', 'parent' parameter must be specified",
                volume_type
            ))
        })?;

        debug!("Resolving parent volume '{}'", parent);
        if !client.lookup_volume(parent).await?.is_found() {
            return Err(Error::PreconditionNotMet(format!(
                "to create a '{}', 'parent' parameter must be a valid storage volume; '{}' does not exist",
                volume_type, parent
            )));
        }
    }

    if let Some(pool) = request.pool_name() {
        require_pool(client, pool, "volume").await?;
    }

    Ok(())
}

/// Resolve the parent and pool a share creation depends on
pub async fn check_share_preconditions<C>(client: &C, request: &ShareRequest) -> Result<()>
where
    C: ControllerClient + ?Sized,
{
    let share_type = request.share_type;

    if let Some(parent) = request.parent_name() {
        debug!("Resolving parent share '{}'", parent);
        if !client.lookup_share(parent).await?.is_found() {
            return Err(Error::PreconditionNotMet(format!(
                "to create a(n) '{}', 'parent' parameter must be a valid network share; '{}' does not exist",
                share_type, parent
            )));
        }
    } else if share_type.requires_parent() {
        return Err(Error::Validation(format!(
            "to create a '{}', 'parent' parameter must be specified",
            share_type
        )));
    }

    if let Some(pool) = request.pool_name() {
        require_pool(client, pool, "share").await?;
    }

    Ok(())
}

async fn require_pool<C>(client: &C, pool: &str, family: &str) -> Result<()>
where
    C: ControllerClient + ?Sized,
{
    debug!("Resolving storage pool '{}'", pool);
    if client.lookup_pool(pool).await?.is_found() {
        Ok(())
    } else {
        Err(Error::PreconditionNotMet(format!(
            "to create a normal {}, 'pool' parameter must be a valid storage pool; '{}' does not exist",
            family, pool
        )))
    }
}

/// The volume or share named in an assignment request must exist
pub async fn require_assigned_resource<C>(
    client: &C,
    resource: &AssignedResource,
    state: TargetState,
) -> Result<()>
where
    C: ControllerClient + ?Sized,
{
    debug!("Resolving {}", resource);
    let exists = match resource {
        AssignedResource::Volume(name) => client.lookup_volume(name).await?.is_found(),
        AssignedResource::Share(name) => client.lookup_share(name).await?.is_found(),
    };

    if exists {
        return Ok(());
    }

    Err(Error::PreconditionNotMet(match state {
        TargetState::Present => format!(
            "to assign a {} to a host/hostgroup, the target '{}' must exist",
            resource.kind(),
            resource.name()
        ),
        TargetState::Absent => format!(
            "failed to detach assignment because {} does not exist",
            resource
        ),
    }))
}

/// Deleting a volume or host group must not implicitly detach anything
pub async fn require_unassigned<C>(client: &C, scope: &AssignmentScope, subject: &str) -> Result<()>
where
    C: ControllerClient + ?Sized,
{
    debug!("Listing assignments of {}", subject);
    let assignments = client.list_assignments(scope).await?;
    if assignments.is_empty() {
        return Ok(());
    }

    let listed: Vec<String> = assignments
        .iter()
        .map(|a| match scope {
            AssignmentScope::Resource(_) => format!("'{}'", a.target),
            AssignmentScope::Target(_) => a.resource.to_string(),
        })
        .collect();
    Err(Error::PreconditionNotMet(format!(
        "cannot remove {} while it is assigned ({}); detach the assignment(s) first",
        subject,
        listed.join(", ")
    )))
}
