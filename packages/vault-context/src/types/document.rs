//! Document types - note files, metadata, and the entities they mention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte range inside a note's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A note that resolved to a real file in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFile {
    /// Vault-relative path, e.g. `Projects/Alpha.md`
    pub path: String,

    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl NoteFile {
    /// Create a new note file reference.
    pub fn new(path: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// File name without folders or the `.md` extension.
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }
}

/// Strip folders and the markdown extension from a vault path or link target.
pub fn basename(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

/// A tag or link occurrence in a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Tag without `#`, or link target without brackets, alias, or heading
    pub name: String,
    pub position: Position,
}

/// An embed directive (`![[target]]`) occurrence in a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRef {
    /// Everything between `![[` and `]]`, alias removed, e.g. `Note#^abc123`
    pub target: String,
    pub position: Position,
}

/// Metadata the vault index exposes for a single note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    /// Tags declared in the structured header (no `#`)
    #[serde(default)]
    pub header_tags: Vec<String>,

    /// Inline `#tag` occurrences in the body
    #[serde(default)]
    pub tags: Vec<Mention>,

    /// Outbound `[[link]]` occurrences (embeds excluded)
    #[serde(default)]
    pub links: Vec<Mention>,

    /// `![[embed]]` occurrences
    #[serde(default)]
    pub embeds: Vec<EmbedRef>,
}

impl NoteMetadata {
    /// Derive metadata from raw markdown.
    pub fn scan(content: &str) -> Self {
        crate::text::mentions::scan_metadata(content)
    }

    /// Whether the header declares this tag (nested sub-tags count).
    pub fn declares_header_tag(&self, tag: &str) -> bool {
        self.header_tags.iter().any(|t| tag_matches(t, tag))
    }

    /// Whether the tag occurs in the body outside the header.
    pub fn mentions_tag_inline(&self, tag: &str) -> bool {
        self.tags.iter().any(|m| tag_matches(&m.name, tag))
    }
}

/// `candidate` equals `tag` or is nested below it, ignoring case.
pub fn tag_matches(candidate: &str, tag: &str) -> bool {
    let candidate = candidate.trim_start_matches('#').to_lowercase();
    let tag = tag.trim_start_matches('#').to_lowercase();
    candidate == tag
        || candidate
            .strip_prefix(&tag)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// A recurring topic of interest: a note or a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Note(String),
    Tag(String),
}

impl Entity {
    /// Parse a user-written target: `#tag`, `[[Note]]`, `[[Note|alias]]`, or `Note`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(tag) = raw.strip_prefix('#') {
            let tag = tag.trim();
            return (!tag.is_empty()).then(|| Self::Tag(tag.to_string()));
        }

        let inner = raw
            .strip_prefix("[[")
            .and_then(|r| r.strip_suffix("]]"))
            .unwrap_or(raw);
        let target = inner.split('|').next().unwrap_or(inner);
        let target = target.split('#').next().unwrap_or(target).trim();

        (!target.is_empty()).then(|| Self::Note(target.to_string()))
    }

    /// Name without `#` or brackets.
    pub fn name(&self) -> &str {
        match self {
            Self::Note(name) | Self::Tag(name) => name,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }

    /// Case-insensitive identity used for grouping.
    pub fn key(&self) -> String {
        match self {
            Self::Note(name) => format!("[[{}]]", basename(name).to_lowercase()),
            Self::Tag(name) => format!("#{}", name.to_lowercase()),
        }
    }

    /// Whether a link target (as written in `[[...]]`) points at this note.
    pub fn matches_link(&self, link: &str) -> bool {
        match self {
            Self::Note(name) => basename(link).eq_ignore_ascii_case(basename(name)),
            Self::Tag(_) => false,
        }
    }

    /// Query in the corpus's query language selecting every note that mentions this entity.
    pub fn referrers_query(&self) -> String {
        format!("LIST FROM {}", self)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(name) => write!(f, "[[{}]]", name),
            Self::Tag(name) => write!(f, "#{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_parse() {
        assert_eq!(Entity::parse("#project"), Some(Entity::Tag("project".into())));
        assert_eq!(
            Entity::parse("[[Alpha|the alpha]]"),
            Some(Entity::Note("Alpha".into()))
        );
        assert_eq!(
            Entity::parse("[[Alpha#Goals]]"),
            Some(Entity::Note("Alpha".into()))
        );
        assert_eq!(Entity::parse("Alpha"), Some(Entity::Note("Alpha".into())));
        assert_eq!(Entity::parse("  "), None);
        assert_eq!(Entity::parse("#"), None);
    }

    #[test]
    fn test_tag_matches_nested() {
        assert!(tag_matches("project/alpha", "project"));
        assert!(tag_matches("#Project", "project"));
        assert!(!tag_matches("projects", "project"));
    }

    #[test]
    fn test_link_matching_uses_basename() {
        let entity = Entity::Note("Alpha".into());
        assert!(entity.matches_link("Projects/alpha"));
        assert!(entity.matches_link("Alpha.md"));
        assert!(!entity.matches_link("Alphabet"));
    }

    #[test]
    fn test_referrers_query() {
        assert_eq!(
            Entity::Tag("project".into()).referrers_query(),
            "LIST FROM #project"
        );
        assert_eq!(
            Entity::Note("Alpha".into()).referrers_query(),
            "LIST FROM [[Alpha]]"
        );
    }
}
