//! Mapping of raw service responses into [`Issue`]s.
//!
//! The DTD and Schematron endpoints return differently shaped JSON, so the
//! response is decoded into the tagged [`RawResult`] and each variant has its
//! own normalizer. Service line numbers are 1-based; emitted issues are
//! 0-based to match the editor.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::model::{Annotation, Issue, Severity, ValidationKind};

/// Cached regex for a leading `LABEL: ` in Schematron descriptions
static MESSAGE_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_message_prefix_regex() -> &'static Regex {
    MESSAGE_PREFIX_REGEX.get_or_init(|| {
        Regex::new(r"^\w+:\s+").expect("Failed to compile message prefix regex")
    })
}

/// Response body of `POST /dtd`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DtdResponse {
    #[serde(default)]
    pub errors: Vec<DtdError>,
    #[serde(default)]
    pub warnings: Vec<DtdWarning>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtdError {
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtdWarning {
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
}

/// Response body of `POST /schematron`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchematronResponse {
    #[serde(default)]
    pub results: SchematronResults,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchematronResults {
    #[serde(default)]
    pub errors: Vec<SchematronItem>,
    #[serde(default)]
    pub warnings: Vec<SchematronItem>,
    #[serde(default)]
    pub infos: Vec<SchematronItem>,
    #[serde(default)]
    pub passed: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchematronItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

/// Decoded service response, tagged by the kind that produced it
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Dtd(DtdResponse),
    Schematron(SchematronResponse),
}

impl RawResult {
    /// Decode a JSON body returned for `kind`
    pub fn from_json(kind: ValidationKind, body: &[u8]) -> serde_json::Result<Self> {
        Ok(match kind {
            ValidationKind::Dtd => RawResult::Dtd(serde_json::from_slice(body)?),
            ValidationKind::Schematron => RawResult::Schematron(serde_json::from_slice(body)?),
        })
    }

    pub fn kind(&self) -> ValidationKind {
        match self {
            RawResult::Dtd(_) => ValidationKind::Dtd,
            RawResult::Schematron(_) => ValidationKind::Schematron,
        }
    }
}

/// Normalized output of one response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub issues: Vec<Issue>,
    /// Passed check count, Schematron only
    pub passed: Option<usize>,
}

pub fn normalize(raw: &RawResult) -> Normalized {
    match raw {
        RawResult::Dtd(response) => Normalized {
            issues: normalize_dtd(response),
            passed: None,
        },
        RawResult::Schematron(response) => Normalized {
            issues: normalize_schematron(response),
            passed: Some(response.results.passed.len()),
        },
    }
}

/// Errors first, then warnings. DTD warnings stay `warning`.
pub fn normalize_dtd(response: &DtdResponse) -> Vec<Issue> {
    let errors = response.errors.iter().map(|e| Issue {
        message: e.message.clone(),
        severity: Severity::Error,
        line: to_editor_line(e.line),
        column: e.column.unwrap_or(0),
        name: None,
    });
    let warnings = response.warnings.iter().map(|w| Issue {
        message: w.message.clone(),
        severity: Severity::Warning,
        line: to_editor_line(w.line),
        column: 0,
        name: w.name.clone(),
    });
    errors.chain(warnings).collect()
}

/// Severity comes from the group an item is listed in; `type` is ignored.
pub fn normalize_schematron(response: &SchematronResponse) -> Vec<Issue> {
    let results = &response.results;
    let groups = [
        (&results.errors, Severity::Error),
        (&results.warnings, Severity::Warning),
        (&results.infos, Severity::Info),
    ];

    groups
        .into_iter()
        .flat_map(|(items, severity)| {
            items.iter().map(move |item| Issue {
                message: item
                    .message
                    .clone()
                    .unwrap_or_else(|| strip_message_prefix(&item.description)),
                severity,
                line: to_editor_line(item.line),
                column: item.column.unwrap_or(0),
                name: None,
            })
        })
        .collect()
}

/// Remove a leading `WORD: ` label such as `ERROR: `
pub fn strip_message_prefix(message: &str) -> String {
    get_message_prefix_regex().replace(message, "").into_owned()
}

pub fn annotations(issues: &[Issue]) -> Vec<Annotation> {
    issues.iter().map(Issue::annotation).collect()
}

fn to_editor_line(service_line: Option<u32>) -> u32 {
    service_line.unwrap_or(1).saturating_sub(1)
}
