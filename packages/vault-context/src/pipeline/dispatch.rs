//! Strategy dispatch - route each descriptor to its extractor.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::strategies::{
    ExtractionRequest, Extractor, QueryDriven, RecencyRanked, SingleReferrer, WholeFile,
};
use crate::traits::{query::QueryRunner, vault::Vault};
use crate::types::{config::ContextConfig, descriptor::StrategyKind, excerpt::Excerpt};

/// Holds one extractor per strategy kind.
///
/// Routing is an exhaustive match over [`StrategyKind`]; the descriptor's
/// resolved kind decides, see [`StrategyDescriptor::resolved_kind`].
///
/// [`StrategyDescriptor::resolved_kind`]: crate::types::descriptor::StrategyDescriptor::resolved_kind
pub struct ExtractionDispatcher {
    whole_file: Box<dyn Extractor>,
    single_referrer: Box<dyn Extractor>,
    recency_ranked: Box<dyn Extractor>,
    query_driven: Box<dyn Extractor>,
}

impl ExtractionDispatcher {
    /// Build the four strategies over the same vault and query engine.
    pub fn new(
        vault: Arc<dyn Vault>,
        queries: Arc<dyn QueryRunner>,
        config: &ContextConfig,
    ) -> Result<Self> {
        Ok(Self {
            whole_file: Box::new(WholeFile::new(vault.clone())),
            single_referrer: Box::new(SingleReferrer::new(vault.clone(), config.window.clone())),
            recency_ranked: Box::new(RecencyRanked::new(
                queries.clone(),
                vault.clone(),
                config.window.clone(),
                config.recency.clone(),
                config.retry.clone(),
                config.max_candidates,
            )?),
            query_driven: Box::new(QueryDriven::new(
                queries,
                vault,
                config.window.clone(),
                config.retry.clone(),
                config.max_candidates,
            )),
        })
    }

    /// Dispatcher over arbitrary extractors.
    pub fn with_extractors(
        whole_file: Box<dyn Extractor>,
        single_referrer: Box<dyn Extractor>,
        recency_ranked: Box<dyn Extractor>,
        query_driven: Box<dyn Extractor>,
    ) -> Self {
        Self {
            whole_file,
            single_referrer,
            recency_ranked,
            query_driven,
        }
    }

    /// The extractor a descriptor routes to.
    pub fn route(&self, kind: StrategyKind) -> &dyn Extractor {
        match kind {
            StrategyKind::WholeFile => self.whole_file.as_ref(),
            StrategyKind::SingleReferrer => self.single_referrer.as_ref(),
            StrategyKind::RecencyRanked => self.recency_ranked.as_ref(),
            StrategyKind::QueryDriven => self.query_driven.as_ref(),
        }
    }

    /// Run the extractor the request's descriptor resolves to.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<Excerpt>> {
        let kind = request.descriptor.resolved_kind();
        debug!(
            strategy = kind.as_str(),
            explicit = request.descriptor.kind.is_some(),
            unknown = ?request.descriptor.unknown_kind,
            "Dispatching extraction"
        );
        self.route(kind).extract(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::conversation::parse_source_block;
    use crate::strategies::MockExtractor;
    use crate::text::markers::MarkerRegistry;
    use crate::testing::fixed_time;
    use crate::types::descriptor::StrategyDescriptor;

    fn labelled(label: &'static str, expected_calls: usize) -> Box<dyn Extractor> {
        let mut mock = MockExtractor::new();
        mock.expect_extract()
            .times(expected_calls)
            .returning(move |_| Ok(vec![Excerpt::new(label, fixed_time(0), label)]));
        Box::new(mock)
    }

    async fn routed(dispatcher: &ExtractionDispatcher, descriptor: StrategyDescriptor) -> String {
        let request = ExtractionRequest::new(descriptor, Arc::new(MarkerRegistry::random(4, 8)));
        dispatcher.extract(&request).await.unwrap()[0].source_id.clone()
    }

    #[tokio::test]
    async fn test_routing_table() {
        let dispatcher = ExtractionDispatcher::with_extractors(
            labelled("whole", 1),
            labelled("single", 1),
            labelled("recency", 1),
            labelled("query", 2),
        );

        let basic_with_query = StrategyDescriptor::new(StrategyKind::WholeFile)
            .with_query("LIST FROM #x")
            .with_source_note("Alpha");
        assert_eq!(routed(&dispatcher, basic_with_query).await, "whole");

        let query_only = StrategyDescriptor::unspecified().with_query("LIST FROM #x");
        assert_eq!(routed(&dispatcher, query_only).await, "query");

        assert_eq!(routed(&dispatcher, StrategyDescriptor::unspecified()).await, "recency");

        let referrer = StrategyDescriptor::new(StrategyKind::SingleReferrer).with_target("#x");
        assert_eq!(routed(&dispatcher, referrer).await, "single");

        let explicit = StrategyDescriptor::new(StrategyKind::QueryDriven).with_target("#x");
        assert_eq!(routed(&dispatcher, explicit).await, "query");
    }

    #[tokio::test]
    async fn test_unknown_strategy_routes_to_query_driven() {
        let dispatcher = ExtractionDispatcher::with_extractors(
            labelled("whole", 0),
            labelled("single", 0),
            labelled("recency", 0),
            labelled("query", 1),
        );

        let block = parse_source_block(
            "sources:\n- strategy: Telepathy\n  evergreen: #launch\nThoughts?",
        );
        assert_eq!(routed(&dispatcher, block.descriptors[0].clone()).await, "query");
    }

    #[tokio::test]
    async fn test_blank_query_is_not_a_query() {
        let dispatcher = ExtractionDispatcher::with_extractors(
            labelled("whole", 0),
            labelled("single", 0),
            labelled("recency", 1),
            labelled("query", 0),
        );

        let blank = StrategyDescriptor::unspecified().with_query("   ");
        assert_eq!(routed(&dispatcher, blank).await, "recency");
    }
}
