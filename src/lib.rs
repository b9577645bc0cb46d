//! # jats-validator Library
//!
//! Async client for a remote JATS validation service: a debounced, cancellable
//! orchestrator runs DTD and Schematron checks against the document in an
//! editor and turns the service's answers into line annotations.

pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod error_reporter;
pub mod http_client;
pub mod model;
pub mod normalizer;
pub mod orchestrator;
pub mod output;
pub mod session;
pub mod watch;
pub mod workbench;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use editor::{EditorAdapter, EditorWidget, TextBuffer};
pub use error::{ConfigError, Result, ValidationError};
pub use error_reporter::ErrorReporter;
pub use http_client::{HttpClientConfig, HttpValidationClient, ValidationClient};
pub use model::{
    Annotation, Issue, KindStatus, Position, Severity, ValidationKind, ValidationRequest,
    ValidationResult,
};
pub use normalizer::RawResult;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle};
pub use output::{Output, SidebarView};
pub use session::{DispatchMode, Phase, SessionConfig, ValidationSession, ValidationSnapshot};
pub use workbench::{Workbench, WorkbenchConfig};
