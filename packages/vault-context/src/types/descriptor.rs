//! Strategy descriptors - which extractor runs, and with what parameters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::document::Entity;

/// The closed set of extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Entire cleaned body of one note. Written `Basic` in source blocks.
    WholeFile,

    /// Windows around mentions of one entity inside one note.
    SingleReferrer,

    /// Most recent mentions of the most active entities across the vault.
    RecencyRanked,

    /// Run a query, window each result around the target entity.
    QueryDriven,
}

impl StrategyKind {
    /// Name used when writing a descriptor back out.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WholeFile => "Basic",
            Self::SingleReferrer => "SingleReferrer",
            Self::RecencyRanked => "RecencyRanked",
            Self::QueryDriven => "QueryDriven",
        }
    }
}

/// Unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "basic" | "wholefile" | "file" => Ok(Self::WholeFile),
            "singlereferrer" | "singleevergreenreferrer" | "referrer" => Ok(Self::SingleReferrer),
            "recencyranked" | "allevergreenreferrers" | "recent" | "recency" => {
                Ok(Self::RecencyRanked)
            }
            "querydriven" | "dataview" | "query" => Ok(Self::QueryDriven),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Identifies which extractor to use and its parameters.
///
/// Built once per parsed source block and discarded after retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Explicit strategy; `None` when the block left it out or named an unknown one
    pub kind: Option<StrategyKind>,

    /// Strategy name the block gave that matched no known strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_kind: Option<String>,

    /// Query in the corpus's query language
    pub query: Option<String>,

    /// Entity whose mentions drive windowing (`#tag` or `[[Note]]`)
    pub target_entity: Option<String>,

    /// Note to read for whole-file / single-referrer extraction
    pub source_note: Option<String>,

    /// Free text shown ahead of this source's excerpts in the prompt
    pub source_preamble: Option<String>,

    /// Folder limiting recency-ranked candidates
    pub folder: Option<String>,
}

impl StrategyDescriptor {
    /// Descriptor with an explicit strategy.
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Descriptor with no explicit strategy.
    pub fn unspecified() -> Self {
        Self::default()
    }

    /// Set the strategy from its written name. `None` clears it.
    pub fn set_strategy_name(&mut self, name: Option<&str>) {
        self.kind = None;
        self.unknown_kind = None;
        match name.map(str::parse::<StrategyKind>) {
            Some(Ok(kind)) => self.kind = Some(kind),
            Some(Err(UnknownStrategy(name))) => self.unknown_kind = Some(name),
            None => {}
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_entity = Some(target.into());
        self
    }

    pub fn with_source_note(mut self, note: impl Into<String>) -> Self {
        self.source_note = Some(note.into());
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.source_preamble = Some(preamble.into());
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Strategy this descriptor routes to.
    ///
    /// An explicit kind always wins. An unknown strategy name or a query
    /// selects [`StrategyKind::QueryDriven`]; with neither the descriptor
    /// falls back to [`StrategyKind::RecencyRanked`].
    pub fn resolved_kind(&self) -> StrategyKind {
        match self.kind {
            Some(kind) => kind,
            None if self.unknown_kind.is_some() || self.has_query() => StrategyKind::QueryDriven,
            None => StrategyKind::RecencyRanked,
        }
    }

    /// Parsed target entity, if one was given.
    pub fn target(&self) -> Option<Entity> {
        self.target_entity.as_deref().and_then(Entity::parse)
    }

    fn has_query(&self) -> bool {
        self.query
            .as_deref()
            .map(|q| !q.trim().is_empty())
            .unwrap_or(false)
    }
}
