//! Generation trait for the language model transport.

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

use crate::error::Result;
use crate::types::message::ConversationMessage;

/// Ordered text fragments of one generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A language model that turns a conversation into text.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Start a streamed generation.
    async fn generate(&self, messages: &[ConversationMessage]) -> Result<FragmentStream>;

    /// Run a generation to completion and return the whole text.
    ///
    /// Used for structured calls (ranking) where streaming is pointless.
    async fn complete(&self, messages: &[ConversationMessage]) -> Result<String> {
        let fragments: Vec<String> = self.generate(messages).await?.try_collect().await?;
        Ok(fragments.concat())
    }
}
