//! Application controller.
//!
//! A [`Workbench`] owns the editor adapter and the orchestrator handle. Text
//! changes flow from the adapter to the orchestrator through a forwarding task;
//! published snapshots come back through [`Workbench::apply`], which pushes new
//! annotations into the editor.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::editor::{EditorAdapter, EditorWidget};
use crate::error::{Result, ValidationError};
use crate::http_client::ValidationClient;
use crate::model::{Severity, ValidationKind};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle};
use crate::output::SidebarView;
use crate::session::{Phase, ValidationSnapshot};

#[derive(Debug, Clone, Default)]
pub struct WorkbenchConfig {
    /// Send loaded files through the `format` endpoint first
    pub format_on_load: bool,
    pub orchestrator: OrchestratorConfig,
}

pub struct Workbench<W: EditorWidget> {
    editor: EditorAdapter<W>,
    handle: OrchestratorHandle,
    client: Arc<dyn ValidationClient>,
    format_on_load: bool,
    error: Option<String>,
    formatting: bool,
    applied: u64,
    snapshot: ValidationSnapshot,
    forwarder: JoinHandle<()>,
    orchestrator: JoinHandle<()>,
}

impl<W: EditorWidget> Workbench<W> {
    /// Spawn the orchestrator and wire `widget` to it. Must be called inside a
    /// tokio runtime.
    pub fn start(widget: W, client: Arc<dyn ValidationClient>, config: WorkbenchConfig) -> Self {
        let (handle, orchestrator) = Orchestrator::spawn(Arc::clone(&client), config.orchestrator);

        let mut editor = EditorAdapter::new(widget);
        let mut changes = editor.subscribe();
        let forward_to = handle.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                forward_to.document_changed(change.text);
            }
        });

        let snapshot = handle.snapshot();
        Self {
            editor,
            handle,
            client,
            format_on_load: config.format_on_load,
            error: None,
            formatting: false,
            applied: snapshot.published,
            snapshot,
            forwarder,
            orchestrator,
        }
    }

    /// Replace the editor content. Returns false when the text is unchanged.
    pub fn load_text(&mut self, text: &str) -> bool {
        self.error = None;
        self.editor.set_text(text)
    }

    /// Load an `.xml` file, reformatting it first when configured to.
    /// A failed reformat leaves the editor unchanged and fills the error panel.
    pub async fn load_file(&mut self, path: &Path) -> Result<()> {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if !extension.eq_ignore_ascii_case("xml") {
            return Err(ValidationError::InvalidFileExtension {
                path: path.to_path_buf(),
                expected: "xml".to_string(),
                actual: extension.to_string(),
            });
        }

        let content = tokio::fs::read_to_string(path).await?;
        info!(path = %path.display(), bytes = content.len(), "loaded document");

        if self.format_on_load && !content.is_empty() {
            let formatted = self.format_text(&content).await.inspect_err(|error| {
                warn!(%error, "formatting on load failed; editor left unchanged");
            })?;
            self.editor.set_text(&formatted);
            return Ok(());
        }

        self.load_text(&content);
        Ok(())
    }

    /// Fetch the document from an external URL
    pub async fn load_url(&mut self, url: &str) -> Result<()> {
        let content = self.client.fetch_document(url).await?;
        info!(%url, bytes = content.len(), "fetched document");
        self.load_text(&content);
        Ok(())
    }

    /// Reformat the current content through the service.
    ///
    /// On failure the editor keeps its previous content and the error panel
    /// shows the failure.
    pub async fn reformat(&mut self) -> Result<()> {
        let previous = self.editor.text();
        if previous.is_empty() {
            return Ok(());
        }

        let formatted = self.format_text(&previous).await?;
        if self.editor.text() != previous {
            debug!("document changed while formatting; discarding formatted text");
            return Ok(());
        }
        self.editor.set_text(&formatted);
        Ok(())
    }

    /// Run `text` through the `format` endpoint, keeping the error panel and
    /// the `formatting` flag current
    async fn format_text(&mut self, text: &str) -> Result<String> {
        self.formatting = true;
        let outcome = self.client.format(text, &CancellationToken::new()).await;
        self.formatting = false;

        match outcome {
            Ok(formatted) => {
                self.error = None;
                Ok(formatted)
            }
            Err(error) => {
                if !error.is_cancelled() {
                    self.error = Some(error.panel_message());
                }
                Err(error)
            }
        }
    }

    pub fn revalidate(&mut self) {
        self.handle.revalidate();
    }

    /// Take a published snapshot. Returns true when it carried new annotations.
    pub fn apply(&mut self, snapshot: &ValidationSnapshot) -> bool {
        let fresh = snapshot.published != self.applied;
        if fresh {
            debug!(
                version = snapshot.version,
                count = snapshot.annotations.len(),
                "updating editor annotations"
            );
            self.editor.set_annotations(snapshot.annotations.clone());
            self.applied = snapshot.published;
        }
        self.snapshot = snapshot.clone();
        fresh
    }

    /// Wait for the next completed cycle (or a cleared document) and apply it.
    /// Returns `None` when the orchestrator has stopped.
    pub async fn settled(&mut self) -> Option<ValidationSnapshot> {
        let applied = self.applied;
        let mut snapshots = self.handle.subscribe();
        let snapshot = snapshots
            .wait_for(|s| {
                s.published != applied && (s.phase.is_terminal() || s.phase == Phase::Idle)
            })
            .await
            .ok()?
            .clone();
        self.apply(&snapshot);
        Some(snapshot)
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationSnapshot> {
        self.handle.subscribe()
    }

    pub fn sidebar(&self) -> SidebarView {
        SidebarView::from_snapshot(&self.snapshot, self.error.as_deref(), self.formatting)
    }

    /// Jump to the `index`-th issue of `severity` reported by `kind`.
    /// Returns the requested scroll offset, or `None` when there is no such issue.
    pub fn select_issue(
        &mut self,
        kind: ValidationKind,
        severity: Severity,
        index: usize,
    ) -> Option<f64> {
        let line = self
            .snapshot
            .result(kind)?
            .issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .nth(index)?
            .line;
        Some(self.jump_to_line(line))
    }

    pub fn jump_to_line(&mut self, line: u32) -> f64 {
        self.editor.scroll_to_line(line)
    }

    pub fn editor(&self) -> &EditorAdapter<W> {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EditorAdapter<W> {
        &mut self.editor
    }

    pub fn snapshot(&self) -> &ValidationSnapshot {
        &self.snapshot
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_formatting(&self) -> bool {
        self.formatting
    }

    /// Stop the forwarding and orchestrator tasks
    pub async fn shutdown(self) {
        let Workbench {
            handle,
            forwarder,
            orchestrator,
            ..
        } = self;
        forwarder.abort();
        drop(handle);
        let _ = forwarder.await;
        let _ = orchestrator.await;
    }
}
