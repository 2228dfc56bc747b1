//! Vault trait for note storage and the metadata index.
//!
//! The vault is owned by the host application; this library only reads.

use async_trait::async_trait;

use crate::error::Result;
use crate::text::embeds::select_fragment;
use crate::types::document::{NoteFile, NoteMetadata};

/// Read access to the note vault.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Resolve a link target (as written inside `[[...]]`) to a file.
    ///
    /// Returns `None` when nothing in the vault matches.
    async fn resolve(&self, link: &str) -> Result<Option<NoteFile>>;

    /// Read a note's raw content.
    ///
    /// Returns `None` if the file disappeared since it was resolved.
    async fn read(&self, file: &NoteFile) -> Result<Option<String>>;

    /// Index metadata for a note.
    async fn metadata(&self, file: &NoteFile) -> Result<NoteMetadata>;

    /// Content transcluded by `![[target]]`.
    ///
    /// `target` may carry a `#Heading` or `#^block` fragment. The default
    /// implementation resolves and reads the note, then selects the fragment.
    async fn embed_content(&self, target: &str) -> Result<Option<String>> {
        let (link, fragment) = match target.split_once('#') {
            Some((link, fragment)) => (link, Some(fragment)),
            None => (target, None),
        };

        let Some(file) = self.resolve(link).await? else {
            return Ok(None);
        };
        let Some(content) = self.read(&file).await? else {
            return Ok(None);
        };

        Ok(select_fragment(&content, fragment))
    }
}
