//! Shared data model: validation kinds, issues, annotations and per-kind results.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A check performed by the remote validation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    Dtd,
    Schematron,
}

impl ValidationKind {
    pub const ALL: [ValidationKind; 2] = [ValidationKind::Dtd, ValidationKind::Schematron];

    pub fn endpoint(self) -> Endpoint {
        match self {
            ValidationKind::Dtd => Endpoint::Dtd,
            ValidationKind::Schematron => Endpoint::Schematron,
        }
    }

    /// Panel title
    pub fn title(self) -> &'static str {
        match self {
            ValidationKind::Dtd => "JATS DTD",
            ValidationKind::Schematron => "JATS4R Schematron",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint().path())
    }
}

impl FromStr for ValidationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dtd" => Ok(ValidationKind::Dtd),
            "schematron" => Ok(ValidationKind::Schematron),
            other => Err(format!("unknown validation kind: {}", other)),
        }
    }
}

/// Service endpoints, relative to the configured base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Dtd,
    Schematron,
    Format,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Dtd => "dtd",
            Endpoint::Schematron => "schematron",
            Endpoint::Format => "format",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];

    pub fn singular(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Severity::Error => "errors",
            Severity::Warning => "warnings",
            Severity::Info => "infos",
        }
    }
}

/// Zero-based editor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub ch: u32,
}

impl Position {
    pub fn new(line: u32, ch: u32) -> Self {
        Self { line, ch }
    }
}

/// A single normalized finding. `line` and `column` are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    pub severity: Severity,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Issue {
    pub fn annotation(&self) -> Annotation {
        let at = Position::new(self.line, self.column);
        Annotation {
            message: self.message.clone(),
            severity: self.severity,
            from: at,
            to: at,
        }
    }
}

/// Editor-facing point marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub message: String,
    pub severity: Severity,
    pub from: Position,
    pub to: Position,
}

/// Lifecycle of one validation kind within a cycle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum KindStatus {
    #[default]
    NotStarted,
    Running,
    Ready,
    Errored { message: String },
}

impl KindStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, KindStatus::Ready | KindStatus::Errored { .. })
    }
}

/// Result of one validation kind for the current document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub kind: ValidationKind,
    pub status: KindStatus,
    pub issues: Vec<Issue>,
    /// Passed Schematron checks; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<usize>,
}

impl ValidationResult {
    pub fn not_started(kind: ValidationKind) -> Self {
        Self {
            kind,
            status: KindStatus::NotStarted,
            issues: Vec::new(),
            passed: None,
        }
    }

    pub fn running(kind: ValidationKind) -> Self {
        Self {
            status: KindStatus::Running,
            ..Self::not_started(kind)
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// True when the kind finished without errors or warnings
    pub fn passed_validation(&self) -> bool {
        self.status == KindStatus::Ready
            && self.count(Severity::Error) == 0
            && self.count(Severity::Warning) == 0
    }
}

/// One unit of work sent to the service. Immutable once created.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub kind: ValidationKind,
    /// Document version this request validates
    pub version: u64,
    /// Per-kind dispatch counter
    pub generation: u64,
    pub document: Arc<str>,
    /// Schematron ruleset selector
    pub schematron: Option<String>,
    pub cancel: CancellationToken,
}
