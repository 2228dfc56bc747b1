//! Query trait for the corpus's query language.
//!
//! The query engine is external: given a query string it returns ordered
//! note paths plus whatever fields the index has for them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{descriptor::StrategyKind, document::NoteFile};

/// One row of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Vault-relative path
    pub path: String,

    /// Modification time
    pub modified: DateTime<Utc>,

    /// Tags on the note (no `#`)
    #[serde(default)]
    pub tags: Vec<String>,

    /// Outbound link targets
    #[serde(default)]
    pub links: Vec<String>,
}

impl QueryHit {
    /// Create a hit with no tags or links.
    pub fn new(path: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            modified,
            tags: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(|t| t.into()).collect();
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.links = links.into_iter().map(|l| l.into()).collect();
        self
    }

    /// The note this hit points at.
    pub fn file(&self) -> NoteFile {
        NoteFile::new(&self.path, self.modified)
    }
}

/// Executes queries against the corpus.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run a query, returning hits in the engine's order.
    ///
    /// `hint` names the strategy the results are for, so engines can
    /// pick fields or sort orders accordingly.
    async fn run(&self, query: &str, hint: Option<StrategyKind>) -> Result<Vec<QueryHit>>;
}
