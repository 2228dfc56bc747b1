//! Excerpt types - retrieved text plus the substitutions it depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A marker and the embeddable reference it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substitution {
    /// Full token including delimiters, e.g. `%a3f0%`
    pub marker: String,

    /// Embeddable reference, e.g. `![[Alpha#^k2p9x]]`
    pub reference: String,
}

impl Substitution {
    pub fn new(marker: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            reference: reference.into(),
        }
    }
}

/// One retrieved, cleaned, possibly windowed block of text from a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excerpt {
    /// Vault path of the source note
    pub source_id: String,

    /// Source note's modification time
    pub last_modified: DateTime<Utc>,

    /// Excerpt text with block anchors already replaced by markers
    pub body: String,

    /// Markers appearing in `body`
    #[serde(default)]
    pub substitutions: Vec<Substitution>,

    /// Tags of the source note
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Excerpt {
    /// Create an excerpt with no substitutions.
    pub fn new(
        source_id: impl Into<String>,
        last_modified: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            last_modified,
            body: body.into(),
            substitutions: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_substitutions(mut self, substitutions: Vec<Substitution>) -> Self {
        self.substitutions = substitutions;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Add substitutions not already present.
    pub fn absorb_substitutions(&mut self, others: impl IntoIterator<Item = Substitution>) {
        for sub in others {
            if !self.substitutions.iter().any(|s| s.marker == sub.marker) {
                self.substitutions.push(sub);
            }
        }
    }
}

/// Marker → reference lookup consulted while streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: HashMap<String, String>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a substitution, replacing any previous reference for the marker.
    pub fn insert(&mut self, substitution: Substitution) {
        self.entries
            .insert(substitution.marker, substitution.reference);
    }

    pub fn extend(&mut self, substitutions: impl IntoIterator<Item = Substitution>) {
        for sub in substitutions {
            self.insert(sub);
        }
    }

    /// Resolve a full marker token (delimiters included).
    pub fn resolve(&self, marker: &str) -> Option<&str> {
        self.entries.get(marker).map(String::as_str)
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.entries.contains_key(marker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Table built from every excerpt's substitutions.
    pub fn from_excerpts<'a>(excerpts: impl IntoIterator<Item = &'a Excerpt>) -> Self {
        let mut table = Self::new();
        for excerpt in excerpts {
            table.extend(excerpt.substitutions.iter().cloned());
        }
        table
    }
}

impl FromIterator<Substitution> for SubstitutionTable {
    fn from_iter<I: IntoIterator<Item = Substitution>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstitutionTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(marker, reference)| Substitution::new(marker, reference))
            .collect()
    }
}
