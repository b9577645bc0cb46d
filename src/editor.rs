//! Editor adapter.
//!
//! The text-editing widget is an external capability described by
//! [`EditorWidget`]. [`EditorAdapter`] wraps one, owns the current annotation
//! list, emits change notifications to subscribers and implements "scroll to
//! issue". [`TextBuffer`] is an in-memory widget.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::model::{Annotation, Position};

/// Height of the visible viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub client_height: f64,
}

/// Vertical extent of a position, in the widget's local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineCoords {
    pub top: f64,
    pub bottom: f64,
}

/// Capabilities required from a text-editing widget
pub trait EditorWidget: Send {
    fn value(&self) -> String;
    fn set_value(&mut self, text: &str);
    /// Redraw line markers from `annotations`
    fn relint(&mut self, annotations: &[Annotation]);
    fn set_selection(&mut self, position: Position);
    fn scroll_metrics(&self) -> ScrollMetrics;
    fn line_coords(&self, position: Position) -> LineCoords;
    fn scroll_to(&mut self, y: f64);
}

/// Emitted whenever the document text changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub text: Arc<str>,
}

pub struct EditorAdapter<W: EditorWidget> {
    widget: W,
    annotations: Vec<Annotation>,
    subscribers: Vec<mpsc::UnboundedSender<DocumentChange>>,
}

impl<W: EditorWidget> EditorAdapter<W> {
    pub fn new(widget: W) -> Self {
        Self {
            widget,
            annotations: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.widget.value()
    }

    /// Replace the document. Returns false, without notifying, when unchanged.
    pub fn set_text(&mut self, text: &str) -> bool {
        if self.widget.value() == text {
            return false;
        }
        self.widget.set_value(text);
        self.notify_changed();
        true
    }

    /// Announce an edit made directly through [`Self::widget_mut`]
    pub fn notify_changed(&mut self) {
        let change = DocumentChange {
            text: Arc::from(self.widget.value()),
        };
        self.subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DocumentChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn set_annotations(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
        self.widget.relint(&self.annotations);
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Put the cursor at the start of `line` and center it in the viewport.
    /// Returns the requested scroll offset, never negative.
    pub fn scroll_to_line(&mut self, line: u32) -> f64 {
        let position = Position::new(line, 0);
        self.widget.set_selection(position);

        let height = self.widget.scroll_metrics().client_height;
        let coords = self.widget.line_coords(position);
        let y = ((coords.top + coords.bottom - height) / 2.0).max(0.0);
        self.widget.scroll_to(y);
        y
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }
}

pub const DEFAULT_LINE_HEIGHT: f64 = 18.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 720.0;

/// In-memory editor widget with fixed-height lines
#[derive(Debug, Clone)]
pub struct TextBuffer {
    text: String,
    line_height: f64,
    viewport_height: f64,
    selection: Position,
    scroll_top: f64,
    markers: Vec<Annotation>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::with_viewport(DEFAULT_LINE_HEIGHT, DEFAULT_VIEWPORT_HEIGHT)
    }

    pub fn with_viewport(line_height: f64, viewport_height: f64) -> Self {
        Self {
            text: String::new(),
            line_height,
            viewport_height,
            selection: Position::default(),
            scroll_top: 0.0,
            markers: Vec::new(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count().max(1)
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.text.lines().nth(index)
    }

    pub fn selection(&self) -> Position {
        self.selection
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn markers(&self) -> &[Annotation] {
        &self.markers
    }

    pub fn markers_on_line(&self, line: u32) -> impl Iterator<Item = &Annotation> {
        self.markers.iter().filter(move |m| m.from.line == line)
    }

    fn max_scroll(&self) -> f64 {
        (self.line_count() as f64 * self.line_height - self.viewport_height).max(0.0)
    }
}

impl EditorWidget for TextBuffer {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, text: &str) {
        self.text = text.to_string();
        self.selection = Position::default();
        self.scroll_top = 0.0;
    }

    fn relint(&mut self, annotations: &[Annotation]) {
        self.markers = annotations.to_vec();
    }

    fn set_selection(&mut self, position: Position) {
        self.selection = position;
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            client_height: self.viewport_height,
        }
    }

    fn line_coords(&self, position: Position) -> LineCoords {
        let top = position.line as f64 * self.line_height;
        LineCoords {
            top,
            bottom: top + self.line_height,
        }
    }

    fn scroll_to(&mut self, y: f64) {
        self.scroll_top = y.clamp(0.0, self.max_scroll());
    }
}
