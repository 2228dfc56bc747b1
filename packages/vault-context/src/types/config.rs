//! Configuration types for extraction, streaming, and orchestration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ContextError, Result};

/// Top-level configuration, usually loaded from the host's settings blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Paragraph windowing around mentions.
    pub window: WindowConfig,

    /// Marker minting.
    pub markers: MarkerConfig,

    /// Recency-ranked multi-entity extraction.
    pub recency: RecencyConfig,

    /// Retry policy for queries and structured model calls.
    pub retry: RetryConfig,

    /// Upper bound on query results considered per extraction.
    ///
    /// Default: 100.
    pub max_candidates: usize,

    /// Info string of the fenced block that holds a user turn.
    ///
    /// Default: `context`.
    pub source_block_language: String,

    /// Callout type wrapping generated turns (`> [!ai]`).
    ///
    /// Default: `ai`.
    pub assistant_callout: String,

    /// Ask the model to pick excerpts when too many are retrieved.
    ///
    /// Default: None (disabled).
    pub ranking: Option<RankingConfig>,

    /// Replaces the built-in system instruction.
    pub system_prompt: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            markers: MarkerConfig::default(),
            recency: RecencyConfig::default(),
            retry: RetryConfig::default(),
            max_candidates: 100,
            source_block_language: "context".to_string(),
            assistant_callout: "ai".to_string(),
            ranking: None,
            system_prompt: None,
        }
    }
}

impl ContextConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON settings blob. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make extraction silently empty.
    pub fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            return Err(ContextError::invalid("max_candidates must be positive"));
        }
        if self.window.max_windows == 0 {
            return Err(ContextError::invalid("window.max_windows must be positive"));
        }
        if self.markers.width == 0 {
            return Err(ContextError::invalid("markers.width must be positive"));
        }
        if self.retry.query_attempts == 0 || self.retry.json_attempts == 0 {
            return Err(ContextError::invalid("retry attempts must be positive"));
        }
        self.recency.compiled_noise_patterns()?;
        Ok(())
    }

    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    pub fn with_recency(mut self, recency: RecencyConfig) -> Self {
        self.recency = recency;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = Some(ranking);
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Paragraph windowing around mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Paragraphs of context kept on each side of the mention's own paragraph.
    pub paragraphs: usize,

    /// Extra characters kept beyond the paragraph boundaries.
    pub char_fall_off: usize,

    /// Most recent windows kept per note.
    pub max_windows: usize,

    /// Prefix length used when the entity is declared in the note's header.
    pub summary_prefix_chars: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            paragraphs: 1,
            char_fall_off: 0,
            max_windows: 8,
            summary_prefix_chars: 1000,
        }
    }
}

/// Marker minting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Hex characters per random marker token.
    pub width: usize,

    /// Fresh tokens drawn before falling back to a numeric suffix.
    pub max_attempts: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            width: 4,
            max_attempts: 16,
        }
    }
}

/// Recency-ranked multi-entity extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyConfig {
    /// Recency-ordered query over the privileged subset (e.g. the journal).
    pub privileged_query: String,

    /// Recency-ordered query over the whole corpus.
    pub corpus_query: String,

    /// Entities kept after ranking.
    pub top_entities: usize,

    /// Most recently modified notes read per entity.
    pub files_per_entity: usize,

    /// Cap on the merged result.
    pub max_excerpts: usize,

    /// Shortest tail/head overlap that splices two excerpts together.
    pub min_splice_overlap: usize,

    /// Entities matching any of these patterns are ignored.
    pub noise_patterns: Vec<String>,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            privileged_query: "LIST FROM \"Journal\" SORT file.mtime DESC LIMIT 20".to_string(),
            corpus_query: "LIST SORT file.mtime DESC LIMIT 100".to_string(),
            top_entities: 5,
            files_per_entity: 3,
            max_excerpts: 25,
            min_splice_overlap: 8,
            noise_patterns: vec![
                r"^\d{4}-\d{2}-\d{2}$".to_string(),
                r"(?i)^#?(daily|todo|journal)(/.*)?$".to_string(),
            ],
        }
    }
}

impl RecencyConfig {
    /// Compile `noise_patterns`.
    pub fn compiled_noise_patterns(&self) -> Result<Vec<Regex>> {
        self.noise_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(ContextError::from))
            .collect()
    }

    /// Restrict the corpus query to one folder.
    pub fn corpus_query_for(&self, folder: Option<&str>) -> String {
        match folder {
            Some(folder) if !folder.trim().is_empty() => {
                format!("LIST FROM \"{}\" SORT file.mtime DESC LIMIT 100", folder.trim())
            }
            _ => self.corpus_query.clone(),
        }
    }
}

/// Retry policy for queries and structured model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total query attempts before giving up.
    pub query_attempts: u32,

    /// Fixed delay between query attempts, in milliseconds.
    pub query_backoff_ms: u64,

    /// Total attempts for a structured (JSON) model call.
    pub json_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            query_attempts: 3,
            query_backoff_ms: 500,
            json_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn query_backoff(&self) -> Duration {
        Duration::from_millis(self.query_backoff_ms)
    }

    /// No delay between attempts.
    pub fn immediate(mut self) -> Self {
        self.query_backoff_ms = 0;
        self
    }
}

/// Excerpt ranking through a structured model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Ranking runs only when more excerpts than this were retrieved.
    pub threshold: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { threshold: 40 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            ContextConfig::from_json(r#"{"window": {"paragraphs": 2}, "max_candidates": 10}"#)
                .unwrap();

        assert_eq!(config.window.paragraphs, 2);
        assert_eq!(config.window.max_windows, 8);
        assert_eq!(config.max_candidates, 10);
        assert_eq!(config.recency.max_excerpts, 25);
        assert!(config.ranking.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = ContextConfig::default();
        config.recency.noise_patterns = vec!["(".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ContextError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = ContextConfig::default().with_max_candidates(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_noise_patterns() {
        let patterns = RecencyConfig::default().compiled_noise_patterns().unwrap();
        assert!(patterns.iter().any(|p| p.is_match("2024-05-01")));
        assert!(patterns.iter().any(|p| p.is_match("#daily")));
        assert!(!patterns.iter().any(|p| p.is_match("#project")));
    }

    #[test]
    fn test_folder_restricts_corpus_query() {
        let recency = RecencyConfig::default();
        assert_eq!(
            recency.corpus_query_for(Some("Work")),
            "LIST FROM \"Work\" SORT file.mtime DESC LIMIT 100"
        );
        assert_eq!(recency.corpus_query_for(None), recency.corpus_query);
    }
}
