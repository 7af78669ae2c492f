// Core data structures shared by the dispatcher and the liveness sweeper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Liveness classification held per target in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LivenessState {
    Unprobed = -1,
    Dead = 0,
    Alive = 1,
    NeedsRecheck = 2,
}

impl LivenessState {
    /// Numeric code used in logs and summaries
    pub fn code(&self) -> i8 {
        *self as i8
    }

    /// Create from numeric code
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(Self::Unprobed),
            0 => Some(Self::Dead),
            1 => Some(Self::Alive),
            2 => Some(Self::NeedsRecheck),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprobed => "unprobed",
            Self::Dead => "dead",
            Self::Alive => "alive",
            Self::NeedsRecheck => "needs-recheck",
        }
    }
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::Unprobed
    }
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The target answered with this HTTP status code
    Status(u16),
    /// No response at all (connect error, timeout, TLS failure on both schemes)
    Unreachable,
}

impl ProbeStatus {
    /// Unreachable or a 5xx answer
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Unreachable => true,
            Self::Status(code) => *code >= 500,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "{code}"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Result of probing a target: the (possibly normalized) target and its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target: String,
    pub status: ProbeStatus,
}

impl ProbeOutcome {
    pub fn new(target: impl Into<String>, status: ProbeStatus) -> Self {
        Self {
            target: target.into(),
            status,
        }
    }

    pub fn unreachable(target: impl Into<String>) -> Self {
        Self::new(target, ProbeStatus::Unreachable)
    }
}

/// Vulnerability check definition
///
/// The dispatcher treats a `Poc` as opaque; only `id` is inspected (a task
/// with an empty id is never executed). `request` and `matcher` are consumed
/// by the bundled HTTP executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poc {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub request: PocRequest,

    #[serde(default)]
    pub matcher: PocMatcher,
}

impl Poc {
    /// Minimal PoC with only an id, mostly useful for tests and custom executors
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Request part of a PoC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PocRequest {
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default = "default_path")]
    pub path: String,
}

fn default_method() -> String {
    String::from("GET")
}

fn default_path() -> String {
    String::from("/")
}

impl Default for PocRequest {
    fn default() -> Self {
        Self {
            method: default_method(),
            path: default_path(),
        }
    }
}

/// Match conditions; all present conditions must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PocMatcher {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub contains: Option<String>,
}

impl PocMatcher {
    /// A matcher with no conditions never matches
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.contains.is_none()
    }

    pub fn matches(&self, status: u16, body: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let status_ok = self.status.map_or(true, |expected| expected == status);
        let body_ok = self
            .contains
            .as_deref()
            .map_or(true, |needle| body.contains(needle));
        status_ok && body_ok
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One (target, check) execution unit
#[derive(Debug, Clone)]
pub struct Task {
    pub target: String,
    pub poc: Poc,
}

impl Task {
    pub fn new(target: impl Into<String>, poc: Poc) -> Self {
        Self {
            target: target.into(),
            poc,
        }
    }

    /// Both the target and the check id are non-empty
    pub fn is_well_formed(&self) -> bool {
        !self.target.is_empty() && !self.poc.id.is_empty()
    }
}

/// A finding recorded by a check executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target: String,
    pub poc_id: String,
    pub poc_name: String,
    pub severity: Severity,
    pub url: String,
    pub status: u16,
    pub matched_at: DateTime<Utc>,
}

impl CheckResult {
    /// One JSON document terminated by a newline
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
