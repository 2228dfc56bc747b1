//! Recency-ranked multi-entity extraction.
//!
//! Finds what the user has been writing about lately: the entities (tags
//! and linked notes) mentioned across recently modified notes, ranked by
//! how many distinct notes mention them and how recently. The top entities
//! are windowed in their most recent notes, then merged per note.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::retry::run_query_with_retry;
use crate::strategies::{merge_excerpts, ExtractionRequest, Extractor, SingleReferrer, WholeFile};
use crate::text::markers::MarkerRegistry;
use crate::traits::{
    query::{QueryHit, QueryRunner},
    vault::Vault,
};
use crate::types::{
    config::{RecencyConfig, RetryConfig, WindowConfig},
    descriptor::StrategyKind,
    document::Entity,
    excerpt::Excerpt,
};

/// An entity and the notes mentioning it, most recent first.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntity {
    pub entity: Entity,
    pub files: Vec<QueryHit>,
    pub latest: DateTime<Utc>,
}

/// Group hits by the entities they mention and rank the groups.
///
/// Ranking is by number of distinct notes, then most recent mention, both
/// descending. Ties keep first-seen order. Entities whose name or written
/// form matches a noise pattern are ignored.
pub fn rank_entities(hits: &[QueryHit], noise: &[Regex]) -> Vec<RankedEntity> {
    let mut groups: IndexMap<String, RankedEntity> = IndexMap::new();

    for hit in hits {
        let entities = hit
            .tags
            .iter()
            .map(|t| Entity::Tag(t.trim_start_matches('#').to_string()))
            .chain(hit.links.iter().filter_map(|l| Entity::parse(l)));

        for entity in entities {
            if is_noise(&entity, noise) {
                continue;
            }

            let group = groups.entry(entity.key()).or_insert_with(|| RankedEntity {
                entity: entity.clone(),
                files: Vec::new(),
                latest: hit.modified,
            });
            if group.files.iter().any(|f| f.path == hit.path) {
                continue;
            }
            group.latest = group.latest.max(hit.modified);
            group.files.push(hit.clone());
        }
    }

    let mut ranked: Vec<RankedEntity> = groups.into_values().collect();
    for group in &mut ranked {
        group.files.sort_by(|a, b| b.modified.cmp(&a.modified));
    }
    ranked.sort_by(|a, b| {
        b.files
            .len()
            .cmp(&a.files.len())
            .then_with(|| b.latest.cmp(&a.latest))
    });
    ranked
}

fn is_noise(entity: &Entity, noise: &[Regex]) -> bool {
    let written = entity.to_string();
    noise
        .iter()
        .any(|p| p.is_match(entity.name()) || p.is_match(&written))
}

/// Windows the most active recent entities in their latest notes.
#[derive(Clone)]
pub struct RecencyRanked {
    queries: Arc<dyn QueryRunner>,
    vault: Arc<dyn Vault>,
    referrer: SingleReferrer,
    whole: WholeFile,
    config: RecencyConfig,
    noise: Vec<Regex>,
    retry: RetryConfig,
    max_candidates: usize,
}

impl RecencyRanked {
    /// Fails when a noise pattern does not compile.
    pub fn new(
        queries: Arc<dyn QueryRunner>,
        vault: Arc<dyn Vault>,
        window: WindowConfig,
        config: RecencyConfig,
        retry: RetryConfig,
        max_candidates: usize,
    ) -> Result<Self> {
        Ok(Self {
            referrer: SingleReferrer::new(vault.clone(), window),
            whole: WholeFile::new(vault.clone()),
            noise: config.compiled_noise_patterns()?,
            queries,
            vault,
            config,
            retry,
            max_candidates,
        })
    }

    /// Privileged hits first, then the rest of the corpus, deduplicated.
    async fn candidates(&self, request: &ExtractionRequest) -> Result<Vec<QueryHit>> {
        let corpus_query = match request.descriptor.query.as_deref() {
            Some(query) if !query.trim().is_empty() => query.trim().to_string(),
            _ => self
                .config
                .corpus_query_for(request.descriptor.folder.as_deref()),
        };

        let hint = Some(StrategyKind::RecencyRanked);
        let privileged = run_query_with_retry(
            self.queries.as_ref(),
            &self.config.privileged_query,
            hint,
            &self.retry,
        )
        .await?;
        let corpus =
            run_query_with_retry(self.queries.as_ref(), &corpus_query, hint, &self.retry).await?;

        let mut by_path: IndexMap<String, QueryHit> = IndexMap::new();
        for hit in privileged
            .into_iter()
            .take(self.max_candidates)
            .chain(corpus.into_iter().take(self.max_candidates))
        {
            by_path.entry(hit.path.clone()).or_insert(hit);
        }
        Ok(by_path.into_values().collect())
    }

    async fn extract_pair(
        &self,
        entity: &Entity,
        hit: &QueryHit,
        markers: &MarkerRegistry,
    ) -> Result<Vec<Excerpt>> {
        let file = hit.file();

        if let Entity::Tag(tag) = entity {
            let metadata = self.vault.metadata(&file).await?;
            if metadata.declares_header_tag(tag) && !metadata.mentions_tag_inline(tag) {
                return Ok(self.whole.extract_file(&file, markers).await?.into_iter().collect());
            }
        }

        self.referrer.extract_file(&file, entity, markers).await
    }
}

#[async_trait]
impl Extractor for RecencyRanked {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>> {
        let hits = self.candidates(request).await?;
        let ranked = rank_entities(&hits, &self.noise);

        let jobs: Vec<(&Entity, &QueryHit)> = ranked
            .iter()
            .take(self.config.top_entities)
            .flat_map(|group| {
                group
                    .files
                    .iter()
                    .take(self.config.files_per_entity)
                    .map(move |hit| (&group.entity, hit))
            })
            .collect();

        debug!(
            candidate_count = hits.len(),
            entity_count = ranked.len(),
            job_count = jobs.len(),
            "Ranked recent entities"
        );

        let gathered = join_all(
            jobs.iter()
                .map(|(entity, hit)| self.extract_pair(entity, hit, &request.markers)),
        )
        .await;

        let mut excerpts = Vec::new();
        for result in gathered {
            excerpts.extend(result?);
        }

        let mut merged = merge_excerpts(excerpts, self.config.min_splice_overlap);
        merged.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        merged.truncate(self.config.max_excerpts);

        info!(excerpt_count = merged.len(), "Recency-ranked extraction complete");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed_time, MockQueryRunner, MockVault, SequenceMarkers};
    use crate::types::descriptor::StrategyDescriptor;

    fn hit(path: &str, day: i64, tags: &[&str], links: &[&str]) -> QueryHit {
        QueryHit::new(path, fixed_time(day))
            .with_tags(tags.iter().copied())
            .with_links(links.iter().copied())
    }

    fn noise() -> Vec<Regex> {
        RecencyConfig::default().compiled_noise_patterns().unwrap()
    }

    #[test]
    fn test_rank_by_file_count_then_recency() {
        let hits = vec![
            hit("a.md", 1, &["alpha"], &["Beta"]),
            hit("b.md", 5, &["alpha"], &[]),
            hit("c.md", 3, &["gamma"], &["Beta"]),
            hit("d.md", 9, &["delta"], &[]),
        ];

        let ranked = rank_entities(&hits, &noise());
        let order: Vec<String> = ranked.iter().map(|r| r.entity.to_string()).collect();

        assert_eq!(order, vec!["#alpha", "[[Beta]]", "#delta", "#gamma"]);
        assert_eq!(ranked[0].latest, fixed_time(5));
        assert_eq!(ranked[0].files[0].path, "b.md");
    }

    #[test]
    fn test_noise_and_duplicates_are_ignored() {
        let hits = vec![
            hit("a.md", 1, &["daily", "Alpha", "alpha"], &["2024-01-02", "Alpha"]),
            hit("b.md", 2, &["todo/later"], &[]),
        ];

        let ranked = rank_entities(&hits, &noise());
        let order: Vec<String> = ranked.iter().map(|r| r.entity.to_string()).collect();

        assert_eq!(order, vec!["#Alpha", "[[Alpha]]"]);
        assert_eq!(ranked[0].files.len(), 1);
    }

    fn setup() -> (MockVault, MockQueryRunner, RecencyConfig) {
        let vault = MockVault::new()
            .with_note(
                "Journal/2024-01-05.md",
                "Coffee\n\nWorked on #launch with [[Bob]] ^j1\n\nTired",
                fixed_time(5),
            )
            .with_note(
                "Journal/2024-01-03.md",
                "Rainy\n\n#launch plan drafted\n\nDinner",
                fixed_time(3),
            )
            .with_note(
                "Projects/Launch.md",
                "---\ntags: [launch]\n---\nLaunch overview and goals",
                fixed_time(4),
            )
            .with_note("People/Bob.md", "Bob likes [[Tea]]", fixed_time(1));

        let config = RecencyConfig {
            privileged_query: "JOURNAL".into(),
            corpus_query: "CORPUS".into(),
            top_entities: 2,
            files_per_entity: 3,
            ..Default::default()
        };

        let journal = ["Journal/2024-01-05.md", "Journal/2024-01-03.md"];
        let corpus = [
            "Journal/2024-01-05.md",
            "Projects/Launch.md",
            "People/Bob.md",
        ];
        let runner = MockQueryRunner::new()
            .with_result("JOURNAL", journal.iter().filter_map(|p| vault.hit(p)).collect())
            .with_result("CORPUS", corpus.iter().filter_map(|p| vault.hit(p)).collect());

        (vault, runner, config)
    }

    fn extractor(vault: &MockVault, runner: &MockQueryRunner, config: RecencyConfig) -> RecencyRanked {
        RecencyRanked::new(
            Arc::new(runner.clone()),
            Arc::new(vault.clone()),
            WindowConfig {
                paragraphs: 0,
                ..Default::default()
            },
            config,
            RetryConfig::default().immediate(),
            100,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_recency_ranked_end_to_end() {
        let (vault, runner, config) = setup();
        let registry = Arc::new(MarkerRegistry::new(SequenceMarkers::new(["k1", "k2"]), 4));
        let request = ExtractionRequest::new(StrategyDescriptor::unspecified(), registry);

        let excerpts = extractor(&vault, &runner, config).extract(&request).await.unwrap();

        let found: Vec<(&str, &str)> = excerpts
            .iter()
            .map(|e| (e.source_id.as_str(), e.body.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Journal/2024-01-05.md", "Worked on #launch with [[Bob]] %k1%"),
                ("Projects/Launch.md", "Launch overview and goals"),
                ("Journal/2024-01-03.md", "#launch plan drafted"),
            ]
        );
        assert_eq!(runner.call_count("JOURNAL"), 1);
        assert_eq!(runner.call_count("CORPUS"), 1);
    }

    #[tokio::test]
    async fn test_folder_restricts_corpus_query() {
        let (vault, runner, config) = setup();
        let request = ExtractionRequest::new(
            StrategyDescriptor::new(StrategyKind::RecencyRanked).with_folder("Projects"),
            Arc::new(MarkerRegistry::random(4, 8)),
        );

        extractor(&vault, &runner, config).extract(&request).await.unwrap();

        let queries: Vec<String> = runner.calls().into_iter().map(|c| c.query).collect();
        assert_eq!(
            queries,
            vec![
                "JOURNAL".to_string(),
                "LIST FROM \"Projects\" SORT file.mtime DESC LIMIT 100".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_result_is_capped() {
        let (vault, runner, config) = setup();
        let config = RecencyConfig {
            max_excerpts: 1,
            ..config
        };
        let request = ExtractionRequest::new(
            StrategyDescriptor::unspecified(),
            Arc::new(MarkerRegistry::random(4, 8)),
        );

        let excerpts = extractor(&vault, &runner, config).extract(&request).await.unwrap();
        assert_eq!(excerpts.len(), 1);
        assert_eq!(excerpts[0].source_id, "Journal/2024-01-05.md");
    }
}
