//! Extraction strategies.
//!
//! Every strategy runs the same preparation over a note (read, inline
//! embeds, strip header and code fences) and differs only in how it picks
//! text from the prepared note:
//!
//! - [`WholeFile`]: the entire cleaned body
//! - [`SingleReferrer`]: windows around one entity's mentions
//! - [`QueryDriven`]: single-referrer windows over every query candidate
//! - [`RecencyRanked`]: windows around the most active recent entities

pub mod merge;
pub mod query_driven;
pub mod recency_ranked;
pub mod single_referrer;
pub mod whole_file;

pub use merge::{merge_excerpts, splice};
pub use query_driven::QueryDriven;
pub use recency_ranked::{rank_entities, RankedEntity, RecencyRanked};
pub use single_referrer::SingleReferrer;
pub use whole_file::WholeFile;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::text::{
    clean::clean,
    embeds::{resolve_embeds, strip_block_anchors, ResolvedEmbed},
    markers::{to_markers, MarkerRegistry},
    mentions::scan_embeds,
};
use crate::traits::vault::Vault;
use crate::types::{
    descriptor::StrategyDescriptor,
    document::{NoteFile, NoteMetadata},
    excerpt::Excerpt,
};

/// Everything an extractor needs for one source descriptor.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Note already resolved by the caller, if any
    pub target: Option<NoteFile>,

    pub descriptor: StrategyDescriptor,

    /// Substitution table shared by the whole retrieval cycle
    pub markers: Arc<MarkerRegistry>,
}

impl ExtractionRequest {
    pub fn new(descriptor: StrategyDescriptor, markers: Arc<MarkerRegistry>) -> Self {
        Self {
            target: None,
            descriptor,
            markers,
        }
    }

    pub fn with_target(mut self, target: NoteFile) -> Self {
        self.target = Some(target);
        self
    }
}

/// One extraction algorithm.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Excerpts for one descriptor, in the strategy's output order.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>>;
}

/// A note after the shared preparation steps.
#[derive(Debug, Clone)]
pub struct PreparedNote {
    pub file: NoteFile,

    /// Embeds inlined, header and code fences stripped
    pub text: String,

    /// Index metadata of the raw note
    pub metadata: NoteMetadata,
}

impl PreparedNote {
    /// Header tags followed by inline tags, deduplicated.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.metadata.header_tags.clone();
        for mention in &self.metadata.tags {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(&mention.name)) {
                tags.push(mention.name.clone());
            }
        }
        tags
    }

    /// Convert a slice of this note into an excerpt, minting markers.
    pub fn excerpt(&self, selection: &str, markers: &MarkerRegistry) -> Excerpt {
        let marked = to_markers(self.file.basename(), selection, markers);
        Excerpt::new(&self.file.path, self.file.modified, marked.text)
            .with_substitutions(marked.substitutions)
            .with_tags(self.tags())
    }
}

/// Read a note and run the shared preparation steps.
///
/// Returns `None` when the note no longer exists. Embeds are resolved one
/// level deep; an embed that does not resolve stays as written. Block
/// anchors inside embedded content are dropped, so only the note's own
/// anchors become markers.
pub async fn prepare(vault: &dyn Vault, file: &NoteFile) -> Result<Option<PreparedNote>> {
    let Some(raw) = vault.read(file).await? else {
        debug!(path = %file.path, "Skipping note that no longer resolves");
        return Ok(None);
    };

    let embeds = scan_embeds(&raw);
    let contents = join_all(embeds.iter().map(|e| vault.embed_content(&e.target))).await;

    let mut resolved = Vec::with_capacity(embeds.len());
    for (embed, content) in embeds.iter().zip(contents) {
        if let Some(content) = content? {
            resolved.push(ResolvedEmbed::new(
                embed.position,
                strip_block_anchors(&content),
            ));
        }
    }

    let metadata = vault.metadata(file).await?;
    let text = clean(&resolve_embeds(&raw, &resolved));

    Ok(Some(PreparedNote {
        file: file.clone(),
        text,
        metadata,
    }))
}

/// Resolve the descriptor's `source_note` unless the caller supplied a file.
pub(crate) async fn resolve_source(
    vault: &dyn Vault,
    request: &ExtractionRequest,
) -> Result<Option<NoteFile>> {
    if let Some(file) = &request.target {
        return Ok(Some(file.clone()));
    }

    match request.descriptor.source_note.as_deref() {
        Some(note) if !note.trim().is_empty() => {
            let file = vault.resolve(note).await?;
            if file.is_none() {
                debug!(note = %note, "Source note does not resolve");
            }
            Ok(file)
        }
        _ => Ok(None),
    }
}
