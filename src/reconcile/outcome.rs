//! Outcome reporting
//!
//! Every invocation ends with exactly one [`Outcome`], handed to the
//! [`InvocationContext`] that started it.

use crate::reconcile::planner::Plan;
use serde::Serialize;
use std::io::Write;
use tracing::error;

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Current state already matched; nothing was sent
    Unchanged,
    /// At least one mutation succeeded (or would have, in check mode)
    Changed,
    /// Validation, precondition, transport or mutation failure
    Failed { message: String },
}

impl Outcome {
    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Changed)
    }

    pub fn failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Wire shape understood by the invocation host
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportJson<'a> {
    changed: bool,
    failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a str>,
    check_mode: bool,
    plan: &'a Plan,
}

impl Serialize for Outcome {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("changed", &self.changed())?;
        map.serialize_entry("failed", &self.failed())?;
        if let Some(message) = self.message() {
            map.serialize_entry("msg", message)?;
        }
        map.end()
    }
}

/// Outcome plus the plan that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub outcome: Outcome,
    /// Executed steps, or the proposed steps in check mode
    pub plan: Plan,
    pub check_mode: bool,
}

impl Report {
    pub fn unchanged(check_mode: bool) -> Self {
        Self {
            outcome: Outcome::Unchanged,
            plan: Plan::empty(),
            check_mode,
        }
    }

    pub fn failed(message: impl Into<String>, plan: Plan, check_mode: bool) -> Self {
        Self {
            outcome: Outcome::Failed {
                message: message.into(),
            },
            plan,
            check_mode,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let json = ReportJson {
            changed: self.outcome.changed(),
            failed: self.outcome.failed(),
            msg: self.outcome.message(),
            check_mode: self.check_mode,
            plan: &self.plan,
        };
        // Plan and outcome only hold strings, integers and booleans
        serde_json::to_value(json).unwrap_or(serde_json::Value::Null)
    }
}

// =============================================================================
// Invocation Context
// =============================================================================

/// Receiver of the single outcome of an invocation.
///
/// `complete` takes `self` by value, so a context cannot be completed twice.
pub trait InvocationContext {
    fn complete(self, report: Report);
}

impl<F> InvocationContext for F
where
    F: FnOnce(Report),
{
    fn complete(self, report: Report) {
        self(report)
    }
}

/// Writes the report as one JSON document
pub struct JsonReporter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl<W: Write> InvocationContext for JsonReporter<W> {
    fn complete(mut self, report: Report) {
        let json = report.to_json();
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };

        let written = rendered
            .map_err(std::io::Error::from)
            .and_then(|text| writeln!(self.writer, "{}", text))
            .and_then(|_| self.writer.flush());
        if let Err(e) = written {
            error!("Failed to write outcome: {}", e);
        }
    }
}
