//! Async driver for [`ValidationSession`].
//!
//! The session is owned by a single task. Document changes and revalidate
//! commands arrive over a channel, dispatched requests run on their own tasks
//! and report back over a second channel, and the debounce timer is a single
//! deadline re-armed on every change. After each event the task publishes a
//! [`ValidationSnapshot`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::http_client::ValidationClient;
use crate::session::{Completion, Effect, SessionConfig, ValidationSession, ValidationSnapshot};

/// Default quiet period before a change is validated
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub debounce: Duration,
    pub session: SessionConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug)]
enum Command {
    DocumentChanged(Arc<str>),
    Revalidate,
}

/// Cheap, cloneable handle to a running orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ValidationSnapshot>,
}

impl OrchestratorHandle {
    pub fn document_changed(&self, text: impl Into<Arc<str>>) {
        self.send(Command::DocumentChanged(text.into()));
    }

    pub fn revalidate(&self) {
        self.send(Command::Revalidate);
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// False once the orchestrator task has stopped
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("orchestrator is no longer running");
        }
    }
}

pub struct Orchestrator {
    session: ValidationSession,
    client: Arc<dyn ValidationClient>,
    debounce: Duration,
    deadline: Option<(Instant, u64)>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<ValidationSnapshot>,
}

impl Orchestrator {
    /// Spawn the orchestrator task. It stops when every handle is dropped.
    pub fn spawn(
        client: Arc<dyn ValidationClient>,
        config: OrchestratorConfig,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let session = ValidationSession::new(config.session);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(session.snapshot());

        let orchestrator = Self {
            session,
            client,
            debounce: config.debounce,
            deadline: None,
            commands,
            completions_tx,
            completions,
            snapshots,
        };

        let task = tokio::spawn(orchestrator.run());
        let handle = OrchestratorHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let effects = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::DocumentChanged(text)) => self.session.document_changed(text),
                    Some(Command::Revalidate) => self.session.revalidate(),
                    None => break,
                },
                Some(completion) = self.completions.recv() => {
                    self.session.request_completed(completion)
                }
                _ = wait_until(deadline) => match self.deadline.take() {
                    Some((_, version)) => self.session.debounce_elapsed(version),
                    None => Vec::new(),
                },
            };

            self.apply(effects);
            let next = self.session.snapshot();
            self.snapshots.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
        }

        debug!("orchestrator stopping");
        self.session.cancel_all();
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ArmDebounce { version } => {
                    self.deadline = Some((Instant::now() + self.debounce, version));
                }
                Effect::Dispatch(request) => {
                    let client = Arc::clone(&self.client);
                    let completions = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let outcome = client.submit(&request).await;
                        // The receiver is gone only when the orchestrator stopped.
                        let _ = completions.send(Completion::of(&request, outcome));
                    });
                }
                Effect::Publish(annotations) => {
                    debug!(count = annotations.len(), "publishing annotations");
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<(Instant, u64)>) {
    match deadline {
        Some((at, _)) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
