//! Whole-file extraction: the entire cleaned body of one note.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ContextError, Result};
use crate::strategies::{prepare, resolve_source, ExtractionRequest, Extractor};
use crate::text::markers::MarkerRegistry;
use crate::traits::vault::Vault;
use crate::types::{
    document::{Entity, NoteFile},
    excerpt::Excerpt,
};

/// Reads one note and returns it as a single excerpt.
#[derive(Clone)]
pub struct WholeFile {
    vault: Arc<dyn Vault>,
}

impl WholeFile {
    pub fn new(vault: Arc<dyn Vault>) -> Self {
        Self { vault }
    }

    /// The cleaned body of `file`, or `None` if it is gone or empty.
    pub async fn extract_file(
        &self,
        file: &NoteFile,
        markers: &MarkerRegistry,
    ) -> Result<Option<Excerpt>> {
        let Some(prepared) = prepare(self.vault.as_ref(), file).await? else {
            return Ok(None);
        };

        if prepared.text.is_empty() {
            debug!(path = %file.path, "Dropping empty note");
            return Ok(None);
        }

        Ok(Some(prepared.excerpt(&prepared.text, markers)))
    }
}

#[async_trait]
impl Extractor for WholeFile {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>> {
        let file = match (&request.target, &request.descriptor.source_note) {
            (None, None) => match request.descriptor.target() {
                Some(Entity::Note(name)) => self.vault.resolve(&name).await?,
                _ => return Err(ContextError::invalid("whole-file extraction needs a note")),
            },
            _ => resolve_source(self.vault.as_ref(), request).await?,
        };
        let Some(file) = file else {
            return Ok(Vec::new());
        };

        Ok(self
            .extract_file(&file, &request.markers)
            .await?
            .into_iter()
            .collect())
    }
}
