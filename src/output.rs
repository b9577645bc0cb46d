//! Sidebar model and report rendering
//!
//! [`SidebarView`] is derived from a published snapshot and is what both the
//! human and JSON renderers consume.

use atty;
use serde::Serialize;
use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::model::{Issue, KindStatus, Severity, ValidationKind, ValidationResult};
use crate::session::ValidationSnapshot;

pub const PENDING_TEXT: &str = "Validating XML…";
pub const PASSED_TEXT: &str = "Validation passed";
pub const FORMATTING_TEXT: &str = "Formatting XML…";

/// One clickable sidebar entry. `line` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEntry {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueGroup {
    pub severity: Severity,
    /// e.g. `2 errors`, `1 warning`
    pub label: String,
    pub entries: Vec<IssueEntry>,
}

impl IssueGroup {
    fn collect(severity: Severity, issues: &[Issue]) -> Option<Self> {
        let entries: Vec<IssueEntry> = issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .map(|issue| IssueEntry {
                message: issue.message.clone(),
                line: issue.line,
                column: issue.column,
            })
            .collect();

        if entries.is_empty() {
            return None;
        }
        Some(Self {
            severity,
            label: count_label(entries.len(), severity),
            entries,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PanelState {
    /// No cycle has run for the current document
    Idle,
    Pending,
    Failed { message: String },
    Results { groups: Vec<IssueGroup> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub kind: ValidationKind,
    pub title: String,
    #[serde(flatten)]
    pub state: PanelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<usize>,
}

impl PanelView {
    pub fn from_result(result: &ValidationResult) -> Self {
        let state = match &result.status {
            KindStatus::NotStarted => PanelState::Idle,
            KindStatus::Running => PanelState::Pending,
            KindStatus::Errored { message } => PanelState::Failed {
                message: message.clone(),
            },
            KindStatus::Ready => PanelState::Results {
                groups: Severity::ALL
                    .into_iter()
                    .filter_map(|severity| IssueGroup::collect(severity, &result.issues))
                    .collect(),
            },
        };

        Self {
            kind: result.kind,
            title: result.kind.title().to_string(),
            state,
            passed: result.passed,
        }
    }

    /// Ready with no errors and no warnings
    pub fn validation_passed(&self) -> bool {
        match &self.state {
            PanelState::Results { groups } => groups
                .iter()
                .all(|g| !matches!(g.severity, Severity::Error | Severity::Warning)),
            _ => false,
        }
    }

    pub fn group(&self, severity: Severity) -> Option<&IssueGroup> {
        match &self.state {
            PanelState::Results { groups } => groups.iter().find(|g| g.severity == severity),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, PanelState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidebarView {
    pub version: u64,
    /// Error panel text, shown above the kind panels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub formatting: bool,
    pub panels: Vec<PanelView>,
}

impl SidebarView {
    pub fn from_snapshot(
        snapshot: &ValidationSnapshot,
        error: Option<&str>,
        formatting: bool,
    ) -> Self {
        Self {
            version: snapshot.version,
            error: error.map(str::to_string),
            formatting,
            panels: snapshot.results.iter().map(PanelView::from_result).collect(),
        }
    }

    pub fn panel(&self, kind: ValidationKind) -> Option<&PanelView> {
        self.panels.iter().find(|p| p.kind == kind)
    }

    /// True when any kind failed or reported errors
    pub fn has_failures(&self) -> bool {
        self.error.is_some()
            || self
                .panels
                .iter()
                .any(|p| p.is_failed() || p.group(Severity::Error).is_some())
    }
}

pub fn count_label(count: usize, severity: Severity) -> String {
    let noun = if count == 1 {
        severity.singular()
    } else {
        severity.plural()
    };
    format!("{} {}", count, noun)
}

/// Renders a [`SidebarView`] for the terminal
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(&self, view: &SidebarView, elapsed: Option<Duration>) -> String {
        match self.format {
            OutputFormat::Json => match serde_json::to_string_pretty(view) {
                Ok(json) => format!("{}\n", json),
                Err(e) => format!("{{\"error\":\"{}\"}}\n", e),
            },
            OutputFormat::Human => self.render_human(view, elapsed),
        }
    }

    fn render_human(&self, view: &SidebarView, elapsed: Option<Duration>) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            for panel in &view.panels {
                if let PanelState::Failed { message } = &panel.state {
                    output.push_str(&format!("{}: {}\n", panel.title, message));
                } else if let Some(errors) = panel.group(Severity::Error) {
                    output.push_str(&format!("{}: {}\n", panel.title, errors.label));
                }
            }
            if let Some(error) = &view.error {
                output.push_str(&format!("{}\n", error));
            }
            return output;
        }

        if view.formatting {
            output.push_str(&format!("{}\n", FORMATTING_TEXT));
        }
        if let Some(error) = &view.error {
            output.push_str(&format!("{}\n\n", self.colorize(error, "31")));
        }

        for panel in &view.panels {
            output.push_str(&self.format_panel(panel));
            output.push('\n');
        }

        if self.verbosity >= VerbosityLevel::Verbose
            && let Some(elapsed) = elapsed
        {
            output.push_str(&format!("Completed in {}\n", format_duration(elapsed)));
        }

        output
    }

    pub fn format_panel(&self, panel: &PanelView) -> String {
        let mut output = format!("{}\n", self.colorize(&panel.title, "1"));

        match &panel.state {
            PanelState::Idle => {}
            PanelState::Pending => output.push_str(&format!("  {}\n", PENDING_TEXT)),
            PanelState::Failed { message } => {
                output.push_str(&format!("  {}\n", self.colorize(message, "31")));
            }
            PanelState::Results { groups } => {
                if panel.validation_passed() {
                    output.push_str(&format!("  {}\n", self.colorize(PASSED_TEXT, "32")));
                }
                for group in groups {
                    let color = match group.severity {
                        Severity::Error => "31",
                        Severity::Warning => "33",
                        Severity::Info => "36",
                    };
                    output.push_str(&format!("  {}\n", self.colorize(&group.label, color)));
                    for entry in &group.entries {
                        output.push_str(&format!("    line {}: {}\n", entry.line + 1, entry.message));
                    }
                }
            }
        }

        if let Some(passed) = panel.passed
            && matches!(panel.state, PanelState::Results { .. })
        {
            output.push_str(&format!("  {} passed\n", passed));
        }

        output
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
