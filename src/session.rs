//! Validation session state machine.
//!
//! `ValidationSession` performs no I/O. It is driven by three events (a
//! document change, an elapsed debounce timer, a request completion) and an
//! explicit revalidate action, and answers each with a list of [`Effect`]s for
//! the driver to carry out. Staleness is decided by comparing counters:
//!
//! - the document `version` is bumped on every change; a debounce timer or a
//!   completion carrying an older version is ignored;
//! - each kind has a `generation` bumped on every dispatch; a completion with
//!   an older generation is ignored even when its version still matches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::model::{Annotation, KindStatus, ValidationKind, ValidationRequest, ValidationResult};
use crate::normalizer::{self, RawResult};

/// How the kinds of one cycle are sent to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// All kinds at once
    #[default]
    Concurrent,
    /// One kind at a time, in configured order
    Sequential,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concurrent" => Ok(DispatchMode::Concurrent),
            "sequential" => Ok(DispatchMode::Sequential),
            other => Err(format!("unknown dispatch mode: {}", other)),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Concurrent => f.write_str("concurrent"),
            DispatchMode::Sequential => f.write_str("sequential"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Kinds validated each cycle, in dispatch and merge order
    pub kinds: Vec<ValidationKind>,
    pub dispatch: DispatchMode,
    /// Schematron ruleset selector sent with Schematron requests
    pub schematron: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kinds: ValidationKind::ALL.to_vec(),
            dispatch: DispatchMode::Concurrent,
            schematron: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing to validate
    #[default]
    Idle,
    /// Waiting for input to settle
    Debouncing,
    Running,
    /// Every kind resolved successfully
    Ready,
    /// Every kind resolved, at least one failed
    Errored,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ready | Phase::Errored)
    }
}

/// Work requested from the driver
#[derive(Debug, Clone)]
pub enum Effect {
    /// (Re)start the debounce timer for `version`
    ArmDebounce { version: u64 },
    /// Send a request to the service
    Dispatch(ValidationRequest),
    /// Replace the editor annotations with this merged list
    Publish(Vec<Annotation>),
}

/// Resolution of a dispatched request
#[derive(Debug)]
pub struct Completion {
    pub kind: ValidationKind,
    pub version: u64,
    pub generation: u64,
    pub outcome: Result<RawResult, ValidationError>,
}

impl Completion {
    pub fn of(request: &ValidationRequest, outcome: Result<RawResult, ValidationError>) -> Self {
        Self {
            kind: request.kind,
            version: request.version,
            generation: request.generation,
            outcome,
        }
    }
}

/// Published view of a session
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValidationSnapshot {
    pub version: u64,
    pub phase: Phase,
    pub results: Vec<ValidationResult>,
    pub annotations: Vec<Annotation>,
    /// Incremented every time `annotations` is replaced
    pub published: u64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ValidationSnapshot {
    pub fn result(&self, kind: ValidationKind) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.kind == kind)
    }
}

#[derive(Debug)]
struct KindSlot {
    result: ValidationResult,
    generation: u64,
    in_flight: Option<CancellationToken>,
    queued: bool,
}

impl KindSlot {
    fn new(kind: ValidationKind) -> Self {
        Self {
            result: ValidationResult::not_started(kind),
            generation: 0,
            in_flight: None,
            queued: false,
        }
    }
}

#[derive(Debug)]
pub struct ValidationSession {
    config: SessionConfig,
    version: u64,
    document: Arc<str>,
    phase: Phase,
    slots: BTreeMap<ValidationKind, KindSlot>,
    annotations: Vec<Annotation>,
    published: u64,
    completed_at: Option<DateTime<Utc>>,
}

impl ValidationSession {
    pub fn new(config: SessionConfig) -> Self {
        let slots = config
            .kinds
            .iter()
            .map(|&kind| (kind, KindSlot::new(kind)))
            .collect();

        Self {
            config,
            version: 0,
            document: Arc::from(""),
            phase: Phase::Idle,
            slots,
            annotations: Vec::new(),
            published: 0,
            completed_at: None,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn result(&self, kind: ValidationKind) -> Option<&ValidationResult> {
        self.slots.get(&kind).map(|slot| &slot.result)
    }

    /// New document snapshot. Invalidates everything in flight.
    pub fn document_changed(&mut self, text: impl Into<Arc<str>>) -> Vec<Effect> {
        self.version += 1;
        self.document = text.into();
        self.cancel_in_flight();

        if self.document.is_empty() {
            debug!(version = self.version, "document cleared");
            self.phase = Phase::Idle;
            for (kind, slot) in self.slots.iter_mut() {
                slot.result = ValidationResult::not_started(*kind);
            }
            return vec![self.publish(Vec::new())];
        }

        self.phase = Phase::Debouncing;
        vec![Effect::ArmDebounce {
            version: self.version,
        }]
    }

    /// Debounce timer for `version` fired
    pub fn debounce_elapsed(&mut self, version: u64) -> Vec<Effect> {
        if version != self.version || self.phase != Phase::Debouncing {
            debug!(
                version,
                current = self.version,
                "ignoring superseded debounce timer"
            );
            return Vec::new();
        }
        self.start_cycle()
    }

    /// Start a new cycle for the current document without waiting
    pub fn revalidate(&mut self) -> Vec<Effect> {
        if self.document.is_empty() {
            return Vec::new();
        }
        self.cancel_in_flight();
        self.start_cycle()
    }

    pub fn request_completed(&mut self, completion: Completion) -> Vec<Effect> {
        let Completion {
            kind,
            version,
            generation,
            outcome,
        } = completion;

        let current_version = self.version;
        let Some(slot) = self.slots.get_mut(&kind) else {
            return Vec::new();
        };

        if version != current_version || generation != slot.generation || slot.in_flight.is_none()
        {
            debug!(%kind, version, generation, "discarding stale result");
            return Vec::new();
        }
        if matches!(outcome, Err(ValidationError::Cancelled)) {
            return Vec::new();
        }

        slot.in_flight = None;
        match outcome {
            Ok(raw) if raw.kind() == kind => {
                let normalized = normalizer::normalize(&raw);
                debug!(%kind, issues = normalized.issues.len(), "validation result ready");
                slot.result.status = KindStatus::Ready;
                slot.result.issues = normalized.issues;
                slot.result.passed = normalized.passed;
            }
            Ok(raw) => {
                warn!(%kind, received = %raw.kind(), "response for the wrong validation kind");
                slot.result.status = KindStatus::Errored {
                    message: crate::error::GENERIC_PANEL_MESSAGE.to_string(),
                };
            }
            Err(error) => {
                warn!(%kind, %error, "validation request failed");
                slot.result.status = KindStatus::Errored {
                    message: error.panel_message(),
                };
            }
        }

        let mut effects = Vec::new();
        if self.config.dispatch == DispatchMode::Sequential
            && let Some(next) = self.next_queued()
        {
            effects.push(self.dispatch(next));
        }

        if self.slots.values().all(|slot| slot.result.status.is_terminal()) {
            effects.push(self.finish_cycle());
        }
        effects
    }

    /// Cancel all outstanding requests; used on shutdown
    pub fn cancel_all(&mut self) {
        self.cancel_in_flight();
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        ValidationSnapshot {
            version: self.version,
            phase: self.phase,
            results: self.slots.values().map(|slot| slot.result.clone()).collect(),
            annotations: self.annotations.clone(),
            published: self.published,
            completed_at: self.completed_at,
        }
    }

    fn start_cycle(&mut self) -> Vec<Effect> {
        info!(version = self.version, bytes = self.document.len(), "validating document");
        self.phase = Phase::Running;
        for (kind, slot) in self.slots.iter_mut() {
            slot.result = ValidationResult::running(*kind);
            slot.queued = true;
        }

        let kinds: Vec<ValidationKind> = match self.config.dispatch {
            DispatchMode::Concurrent => self.config.kinds.clone(),
            DispatchMode::Sequential => self.next_queued().into_iter().collect(),
        };
        kinds.into_iter().map(|kind| self.dispatch(kind)).collect()
    }

    fn dispatch(&mut self, kind: ValidationKind) -> Effect {
        let version = self.version;
        let document = Arc::clone(&self.document);
        let schematron = match kind {
            ValidationKind::Schematron => self.config.schematron.clone(),
            ValidationKind::Dtd => None,
        };

        let slot = self
            .slots
            .entry(kind)
            .or_insert_with(|| KindSlot::new(kind));
        if let Some(previous) = slot.in_flight.take() {
            previous.cancel();
        }
        slot.generation += 1;
        slot.queued = false;
        let cancel = CancellationToken::new();
        slot.in_flight = Some(cancel.clone());

        Effect::Dispatch(ValidationRequest {
            kind,
            version,
            generation: slot.generation,
            document,
            schematron,
            cancel,
        })
    }

    fn next_queued(&self) -> Option<ValidationKind> {
        self.config
            .kinds
            .iter()
            .copied()
            .find(|kind| self.slots.get(kind).is_some_and(|slot| slot.queued))
    }

    fn finish_cycle(&mut self) -> Effect {
        let failed = self
            .slots
            .values()
            .any(|slot| matches!(slot.result.status, KindStatus::Errored { .. }));
        self.phase = if failed { Phase::Errored } else { Phase::Ready };
        self.completed_at = Some(Utc::now());

        let merged = self
            .config
            .kinds
            .iter()
            .filter_map(|kind| self.slots.get(kind))
            .filter(|slot| slot.result.status == KindStatus::Ready)
            .flat_map(|slot| normalizer::annotations(&slot.result.issues))
            .collect();

        info!(version = self.version, phase = ?self.phase, "validation cycle complete");
        self.publish(merged)
    }

    fn publish(&mut self, annotations: Vec<Annotation>) -> Effect {
        self.annotations = annotations;
        self.published += 1;
        Effect::Publish(self.annotations.clone())
    }

    fn cancel_in_flight(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(cancel) = slot.in_flight.take() {
                cancel.cancel();
            }
            slot.queued = false;
            if slot.result.status == KindStatus::Running {
                slot.result.status = KindStatus::NotStarted;
            }
        }
    }
}
