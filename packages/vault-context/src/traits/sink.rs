//! Output surface the resolved generation is written to.

use async_trait::async_trait;

use crate::error::Result;

/// The editor (or anything else) receiving generated text.
///
/// Appends arrive strictly in order, never concurrently.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Append text at the tracked insertion point.
    async fn append(&self, text: &str) -> Result<()>;

    /// Show a transient notice near the editing surface.
    async fn notify(&self, message: &str);

    /// Show or remove the "generating…" placeholder.
    async fn set_placeholder(&self, _visible: bool) {}
}
