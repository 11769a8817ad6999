//! State Comparator
//!
//! Classifies current controller state against a desired-state request.
//! Singletons are compared on existence only; attributes of an existing
//! resource are never diffed. Initiator lists are compared as sets.

use crate::domain::model::Host;
use crate::domain::ports::Lookup;
use crate::reconcile::initiators::{DeltaDirection, InitiatorDelta};
use crate::reconcile::request::TargetState;

/// Classification of current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Resource does not exist on the controller
    Absent,
    /// Resource exists and nothing finer needs to change
    PresentExactMatch,
    /// Resource exists; only these initiators need to change
    PresentPartialMatch(InitiatorDelta),
}

impl Comparison {
    pub fn is_absent(&self) -> bool {
        matches!(self, Comparison::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }
}

/// Existence-only classification of a singleton resource
pub fn classify_existence<T>(lookup: &Lookup<T>) -> Comparison {
    match lookup {
        Lookup::Found(_) => Comparison::PresentExactMatch,
        Lookup::NotFound => Comparison::Absent,
    }
}

/// Classify a host's initiator list.
///
/// `Add` looks for desired ports the host lacks, `Remove` for desired ports
/// the host still has. An empty delta is an exact match.
pub fn classify_initiators(
    desired: &[String],
    host: &Host,
    direction: DeltaDirection,
) -> Comparison {
    let delta = InitiatorDelta::compute(desired, &host.initiators, direction);
    if delta.is_empty() {
        Comparison::PresentExactMatch
    } else {
        Comparison::PresentPartialMatch(delta)
    }
}

/// Classify a host lookup for a request that may carry initiators
pub fn compare_host(desired: &[String], lookup: &Lookup<Host>, state: TargetState) -> Comparison {
    match lookup {
        Lookup::NotFound => Comparison::Absent,
        Lookup::Found(_) if desired.is_empty() => Comparison::PresentExactMatch,
        Lookup::Found(host) => {
            let direction = match state {
                TargetState::Present => DeltaDirection::Add,
                TargetState::Absent => DeltaDirection::Remove,
            };
            classify_initiators(desired, host, direction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn host_with(ports: &[&str]) -> Host {
        Host {
            name: "h1".into(),
            description: None,
            initiators: ports.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn ports(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_existence_only() {
        assert_eq!(classify_existence(&Lookup::Found(())), Comparison::PresentExactMatch);
        assert_eq!(classify_existence::<()>(&Lookup::NotFound), Comparison::Absent);
    }

    #[test]
    fn test_initiators_to_add() {
        let host = Lookup::Found(host_with(&["A", "B", "C"]));
        let result = compare_host(&ports(&["B", "C", "D"]), &host, TargetState::Present);
        assert_matches!(result, Comparison::PresentPartialMatch(delta) => {
            assert_eq!(delta.iter().collect::<Vec<_>>(), vec!["D"]);
        });
    }

    #[test]
    fn test_initiators_to_remove() {
        let host = Lookup::Found(host_with(&["A", "B", "C"]));
        let result = compare_host(&ports(&["B", "X"]), &host, TargetState::Absent);
        assert_matches!(result, Comparison::PresentPartialMatch(delta) => {
            assert_eq!(delta.iter().collect::<Vec<_>>(), vec!["B"]);
        });
    }

    #[test]
    fn test_initiators_converged() {
        let host = Lookup::Found(host_with(&["A", "B"]));
        assert_eq!(
            compare_host(&ports(&["A", "B"]), &host, TargetState::Present),
            Comparison::PresentExactMatch
        );
        assert_eq!(
            compare_host(&ports(&["X"]), &host, TargetState::Absent),
            Comparison::PresentExactMatch
        );
    }

    #[test]
    fn test_missing_host() {
        assert_eq!(
            compare_host(&ports(&["A"]), &Lookup::NotFound, TargetState::Present),
            Comparison::Absent
        );
        assert!(compare_host(&[], &Lookup::NotFound, TargetState::Absent).is_absent());
    }
}
