//! Bounded retries for query execution and structured model calls.
//!
//! Raw free-text generation is never retried here.

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{ContextError, Result};
use crate::traits::{
    generation::GenerationSource,
    query::{QueryHit, QueryRunner},
};
use crate::types::{config::RetryConfig, descriptor::StrategyKind, message::ConversationMessage};

/// Run a query, retrying with a fixed backoff.
///
/// After `query_attempts` failures the last error is wrapped in
/// [`ContextError::QueryExhausted`].
pub async fn run_query_with_retry(
    runner: &dyn QueryRunner,
    query: &str,
    hint: Option<StrategyKind>,
    retry: &RetryConfig,
) -> Result<Vec<QueryHit>> {
    let attempts = retry.query_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match runner.run(query, hint).await {
            Ok(hits) => return Ok(hits),
            Err(e) if attempt < attempts => {
                warn!(
                    error = %e,
                    query = %query,
                    attempt = attempt,
                    max_attempts = attempts,
                    "Query failed, retrying..."
                );
                sleep(retry.query_backoff()).await;
            }
            Err(e) => {
                error!(error = %e, query = %query, "Query failed after all retries");
                return Err(ContextError::QueryExhausted {
                    query: query.to_string(),
                    attempts,
                    source: Box::new(e),
                });
            }
        }
    }
}

/// Run a non-streamed model call and parse its JSON answer.
///
/// Unparseable output is retried with the same messages up to `attempts`
/// times; transport errors are returned immediately.
pub async fn complete_json_with_retry<T: DeserializeOwned>(
    generation: &dyn GenerationSource,
    messages: &[ConversationMessage],
    attempts: u32,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut reason = String::new();

    for attempt in 1..=attempts {
        let response = generation.complete(messages).await?;
        match parse_json(&response) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => {
                warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = attempts,
                    "Malformed model response, retrying..."
                );
                reason = e.to_string();
            }
        }
    }

    error!(reason = %reason, "Model response unreadable after all retries");
    Err(ContextError::MalformedResponse { attempts, reason })
}

/// Parse JSON, accepting an answer wrapped in a markdown code block.
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    serde_json::from_str(response)
        .or_else(|_| {
            let json_str = response
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(json_str)
        })
        .map_err(ContextError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed_time, MockGeneration, MockQueryRunner};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Keep {
        keep: Vec<usize>,
    }

    fn retry() -> RetryConfig {
        RetryConfig::default().immediate()
    }

    #[tokio::test]
    async fn test_query_recovers_after_failures() {
        let runner = MockQueryRunner::new()
            .with_result("LIST FROM #x", vec![QueryHit::new("a.md", fixed_time(0))])
            .with_failures("LIST FROM #x", 2);

        let hits = run_query_with_retry(&runner, "LIST FROM #x", None, &retry())
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(runner.call_count("LIST FROM #x"), 3);
    }

    #[tokio::test]
    async fn test_query_exhaustion_propagates() {
        let runner = MockQueryRunner::new().with_failures("LIST FROM #x", 5);

        let err = run_query_with_retry(&runner, "LIST FROM #x", None, &retry())
            .await
            .unwrap_err();

        assert!(matches!(err, ContextError::QueryExhausted { attempts: 3, .. }));
        assert_eq!(runner.call_count("LIST FROM #x"), 3);
    }

    #[tokio::test]
    async fn test_json_retry_until_parseable() {
        let generation = MockGeneration::new()
            .with_completion("not json")
            .with_completion("```json\n{\"keep\": [2, 0]}\n```");

        let parsed: Keep = complete_json_with_retry(&generation, &[], 3).await.unwrap();
        assert_eq!(parsed, Keep { keep: vec![2, 0] });
        assert_eq!(generation.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_json_retry_gives_up() {
        let generation = MockGeneration::new()
            .with_completion("nope")
            .with_completion("still nope")
            .with_completion("{\"keep\": \"x\"}");

        let err = complete_json_with_retry::<Keep>(&generation, &[], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::MalformedResponse { attempts: 3, .. }));
    }
}
