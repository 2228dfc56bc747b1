//! Single-referrer extraction: windows around one entity inside one note.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ContextError, Result};
use crate::strategies::{prepare, resolve_source, ExtractionRequest, Extractor};
use crate::text::{markers::MarkerRegistry, window::windows_for_entity};
use crate::traits::vault::Vault;
use crate::types::{
    config::WindowConfig,
    document::{Entity, NoteFile},
    excerpt::Excerpt,
};

/// Windows every mention of the target entity in a single note.
#[derive(Clone)]
pub struct SingleReferrer {
    vault: Arc<dyn Vault>,
    window: WindowConfig,
}

impl SingleReferrer {
    pub fn new(vault: Arc<dyn Vault>, window: WindowConfig) -> Self {
        Self { vault, window }
    }

    /// One excerpt per distinct window around `entity` in `file`.
    ///
    /// Mention positions are found on the prepared text, after embeds were
    /// inlined and the header removed.
    pub async fn extract_file(
        &self,
        file: &NoteFile,
        entity: &Entity,
        markers: &MarkerRegistry,
    ) -> Result<Vec<Excerpt>> {
        let Some(prepared) = prepare(self.vault.as_ref(), file).await? else {
            return Ok(Vec::new());
        };

        let mut windows = windows_for_entity(&prepared.text, &prepared.metadata, entity, &self.window);
        let mut seen = HashSet::new();
        windows.retain(|w| seen.insert(w.clone()));

        debug!(
            path = %file.path,
            entity = %entity,
            window_count = windows.len(),
            "Windowed note"
        );

        Ok(windows
            .iter()
            .map(|window| prepared.excerpt(window, markers))
            .collect())
    }
}

#[async_trait]
impl Extractor for SingleReferrer {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>> {
        let entity = request
            .descriptor
            .target()
            .ok_or_else(|| ContextError::invalid("single-referrer extraction needs a target entity"))?;

        if request.target.is_none() && request.descriptor.source_note.is_none() {
            return Err(ContextError::invalid("single-referrer extraction needs a note"));
        }

        match resolve_source(self.vault.as_ref(), request).await? {
            Some(file) => self.extract_file(&file, &entity, &request.markers).await,
            None => Ok(Vec::new()),
        }
    }
}
