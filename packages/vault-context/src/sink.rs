//! In-memory output sink with a tracked append position.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::error::Result;
use crate::traits::sink::OutputSink;

#[derive(Debug, Default)]
struct BufferState {
    text: String,
    cursor: usize,
    notices: Vec<String>,
    placeholder: bool,
}

/// A document buffer that only ever inserts at its append position.
///
/// Text before the position is committed and never rewritten; each append
/// lands at the position and advances it past the inserted text.
#[derive(Debug, Default)]
pub struct BufferSink {
    state: Mutex<BufferState>,
}

impl BufferSink {
    /// Buffer appending at the end of `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self::at(text, cursor)
    }

    /// Buffer appending at byte offset `cursor`, clamped to a char boundary.
    pub fn at(text: impl Into<String>, cursor: usize) -> Self {
        let text = text.into();
        let mut cursor = cursor.min(text.len());
        while !text.is_char_boundary(cursor) {
            cursor -= 1;
        }
        Self {
            state: Mutex::new(BufferState {
                text,
                cursor,
                ..Default::default()
            }),
        }
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn notices(&self) -> Vec<String> {
        self.lock().notices.clone()
    }

    pub fn placeholder_visible(&self) -> bool {
        self.lock().placeholder
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OutputSink for BufferSink {
    async fn append(&self, text: &str) -> Result<()> {
        let mut state = self.lock();
        let cursor = state.cursor;
        state.text.insert_str(cursor, text);
        state.cursor = cursor + text.len();
        Ok(())
    }

    async fn notify(&self, message: &str) {
        info!(notice = %message, "Notice");
        self.lock().notices.push(message.to_string());
    }

    async fn set_placeholder(&self, visible: bool) {
        self.lock().placeholder = visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_appends_advance_cursor() {
        let sink = BufferSink::at("question\n\nlater text", 8);
        sink.append(" first").await.unwrap();
        sink.append(" second").await.unwrap();

        assert_eq!(sink.text(), "question first second\n\nlater text");
        assert_eq!(sink.cursor(), 21);
    }

    #[tokio::test]
    async fn test_committed_text_is_never_duplicated() {
        let committed = "Q\n\n> [!ai]\n> earlier answer\n\n";

        for _ in 0..2 {
            let sink = BufferSink::new(committed);
            sink.append("new answer").await.unwrap();
            assert_eq!(sink.text(), format!("{}new answer", committed));
            assert_eq!(sink.text().matches("earlier answer").count(), 1);
        }
    }

    #[test]
    fn test_cursor_clamps_to_char_boundary() {
        let sink = BufferSink::at("héllo", 2);
        assert_eq!(sink.cursor(), 1);
        assert_eq!(BufferSink::at("abc", 99).cursor(), 3);
    }
}
