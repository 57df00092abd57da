//! Logger capability handed to stages and graphs at construction.
//!
//! Components never reach for global state to decide where their events go.
//! They hold a [`Logger`], emit events with its span as parent, and derive
//! child loggers for the components they own:
//!
//! ```ignore
//! let log = Logger::new("graph", "main");
//! let node_log = log.child("node", "scale0");
//! tracing::debug!(parent: node_log.span(), width = 640, "configured");
//! ```

use tracing::Span;

/// Explicit logging context.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Create a root logger for a component instance.
    pub fn new(component: &'static str, name: &str) -> Self {
        Self {
            span: tracing::debug_span!(parent: None, "stage", component, name = %name),
        }
    }

    /// Create a logger that discards every event.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Derive a logger for an owned sub-component.
    pub fn child(&self, component: &'static str, name: &str) -> Self {
        if self.span.is_none() {
            return Self::disabled();
        }
        Self {
            span: tracing::debug_span!(parent: &self.span, "stage", component, name = %name),
        }
    }

    /// Get the span events should use as parent.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Check if this logger discards events.
    pub fn is_disabled(&self) -> bool {
        self.span.is_none()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}
