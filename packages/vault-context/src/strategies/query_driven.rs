//! Query-driven multi-file extraction.
//!
//! The query picks candidate notes; each candidate is windowed around the
//! target entity exactly like [`SingleReferrer`]. The target note's own
//! content, when it is a note, leads the result as one whole-file excerpt.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ContextError, Result};
use crate::pipeline::retry::run_query_with_retry;
use crate::strategies::{ExtractionRequest, Extractor, SingleReferrer, WholeFile};
use crate::text::markers::MarkerRegistry;
use crate::traits::{query::QueryRunner, vault::Vault};
use crate::types::{
    config::{RetryConfig, WindowConfig},
    descriptor::StrategyKind,
    document::{Entity, NoteFile},
    excerpt::Excerpt,
};

/// Runs a query and windows every candidate it returns.
#[derive(Clone)]
pub struct QueryDriven {
    queries: Arc<dyn QueryRunner>,
    vault: Arc<dyn Vault>,
    referrer: SingleReferrer,
    whole: WholeFile,
    retry: RetryConfig,
    max_candidates: usize,
}

impl QueryDriven {
    pub fn new(
        queries: Arc<dyn QueryRunner>,
        vault: Arc<dyn Vault>,
        window: WindowConfig,
        retry: RetryConfig,
        max_candidates: usize,
    ) -> Self {
        Self {
            referrer: SingleReferrer::new(vault.clone(), window),
            whole: WholeFile::new(vault.clone()),
            queries,
            vault,
            retry,
            max_candidates,
        }
    }

    /// The target note's own body, if it is a note and not empty.
    async fn evergreen(
        &self,
        entity: Option<&Entity>,
        markers: &MarkerRegistry,
    ) -> Result<Option<Excerpt>> {
        let Some(Entity::Note(name)) = entity else {
            return Ok(None);
        };
        let Some(file) = self.vault.resolve(name).await? else {
            debug!(note = %name, "Evergreen note does not resolve");
            return Ok(None);
        };
        self.whole.extract_file(&file, markers).await
    }

    async fn extract_candidate(
        &self,
        file: NoteFile,
        entity: Option<&Entity>,
        markers: &MarkerRegistry,
    ) -> Result<Vec<Excerpt>> {
        match entity {
            Some(entity) => self.referrer.extract_file(&file, entity, markers).await,
            None => Ok(self
                .whole
                .extract_file(&file, markers)
                .await?
                .into_iter()
                .collect()),
        }
    }
}

/// The query to run: the descriptor's own, or every referrer of the target.
fn candidate_query(query: Option<&str>, entity: Option<&Entity>) -> Result<String> {
    match (query.map(str::trim), entity) {
        (Some(query), _) if !query.is_empty() => Ok(query.to_string()),
        (_, Some(entity)) => Ok(entity.referrers_query()),
        _ => Err(ContextError::invalid(
            "query-driven extraction needs a query or a target entity",
        )),
    }
}

#[async_trait]
impl Extractor for QueryDriven {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>> {
        let entity = request.descriptor.target();
        let query = candidate_query(request.descriptor.query.as_deref(), entity.as_ref())?;

        let mut hits = run_query_with_retry(
            self.queries.as_ref(),
            &query,
            Some(StrategyKind::QueryDriven),
            &self.retry,
        )
        .await?;
        hits.truncate(self.max_candidates);

        let evergreen = self.evergreen(entity.as_ref(), &request.markers).await?;
        let evergreen_path = evergreen.as_ref().map(|e| e.source_id.clone());

        let candidates: Vec<NoteFile> = hits
            .iter()
            .filter(|hit| Some(&hit.path) != evergreen_path.as_ref())
            .map(|hit| hit.file())
            .collect();

        let gathered = join_all(
            candidates
                .into_iter()
                .map(|file| self.extract_candidate(file, entity.as_ref(), &request.markers)),
        )
        .await;

        let mut excerpts: Vec<Excerpt> = evergreen.into_iter().collect();
        for result in gathered {
            excerpts.extend(result?);
        }

        info!(
            query = %query,
            candidate_count = hits.len(),
            excerpt_count = excerpts.len(),
            "Query-driven extraction complete"
        );

        Ok(excerpts)
    }
}
