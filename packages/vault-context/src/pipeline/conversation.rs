//! Conversation grammar - rebuild the turns persisted in a note.
//!
//! The note itself is the conversation state. It is re-read on every call:
//!
//! ```text
//! document   := segment*
//! segment    := source | callout | prose
//! source     := "```" LANG NL body-line* ("```" NL | EOF)     -- user turn
//! callout    := "> [!" KIND "]" rest NL (">" quoted-line NL)* -- assistant turn
//! prose      := any other line (ignored), other fenced blocks included
//! ```
//!
//! A source body is line-oriented `key: value` text:
//!
//! ```text
//! sources:
//!   - strategy: SingleReferrer
//!     evergreen: [[Alpha]]
//!     note: [[Standup]]
//!   - query: LIST FROM #launch
//!     preamble: Launch notes
//! What changed this week?
//! ```
//!
//! Lines outside the `sources:` list are guidance for the model. A block
//! without sources gets one query-driven descriptor per entity its
//! guidance mentions, or a single unspecified descriptor.

use tracing::warn;

use crate::text::mentions::scan_metadata;
use crate::types::{
    config::ContextConfig,
    descriptor::{StrategyDescriptor, StrategyKind},
    document::Entity,
};

/// Lexical unit of a conversation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Body of a fenced source block
    SourceBlock(String),

    /// Text of an assistant callout with quote markers removed
    Callout(String),

    /// Anything else
    Prose(String),
}

/// Parsed content of one source block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBlock {
    pub descriptors: Vec<StrategyDescriptor>,

    /// Guidance text for the model
    pub prompt: String,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(SourceBlock),
    Assistant(String),
}

/// Tokenizer and parser for persisted conversations.
#[derive(Debug, Clone)]
pub struct ConversationGrammar {
    language: String,
    callout: String,
}

impl ConversationGrammar {
    pub fn new(language: impl Into<String>, callout: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            callout: callout.into(),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(&config.source_block_language, &config.assistant_callout)
    }

    /// Callout header opening an assistant turn, e.g. `> [!ai]`.
    pub fn callout_header(&self) -> String {
        format!("> [!{}]", self.callout)
    }

    /// Split a document into tokens.
    pub fn tokenize(&self, document: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut lines = document.lines().peekable();
        let mut prose: Vec<&str> = Vec::new();

        while let Some(line) = lines.next() {
            let trimmed = line.trim();

            if let Some(info) = trimmed.strip_prefix("```") {
                flush_prose(&mut tokens, &mut prose);
                let mut body: Vec<&str> = Vec::new();
                for inner in lines.by_ref() {
                    if inner.trim() == "```" {
                        break;
                    }
                    body.push(inner);
                }

                if info.trim().eq_ignore_ascii_case(&self.language) {
                    tokens.push(Token::SourceBlock(body.join("\n")));
                } else {
                    tokens.push(Token::Prose(body.join("\n")));
                }
                continue;
            }

            if self.is_callout_header(trimmed) {
                flush_prose(&mut tokens, &mut prose);
                let mut body: Vec<&str> = Vec::new();
                while let Some(next) = lines.peek() {
                    let Some(quoted) = next.trim_start().strip_prefix('>') else {
                        break;
                    };
                    body.push(quoted.strip_prefix(' ').unwrap_or(quoted));
                    lines.next();
                }
                tokens.push(Token::Callout(body.join("\n").trim().to_string()));
                continue;
            }

            prose.push(line);
        }

        flush_prose(&mut tokens, &mut prose);
        tokens
    }

    /// Turns in document order. Prose is dropped.
    pub fn parse(&self, document: &str) -> Vec<Turn> {
        self.tokenize(document)
            .into_iter()
            .filter_map(|token| match token {
                Token::SourceBlock(body) => Some(Turn::User(parse_source_block(&body))),
                Token::Callout(text) if !text.is_empty() => Some(Turn::Assistant(text)),
                Token::Callout(_) | Token::Prose(_) => None,
            })
            .collect()
    }

    fn is_callout_header(&self, line: &str) -> bool {
        let Some(rest) = line.strip_prefix('>') else {
            return false;
        };
        let Some(rest) = rest.trim_start().strip_prefix("[!") else {
            return false;
        };
        rest.split_once(']')
            .map(|(kind, _)| kind.eq_ignore_ascii_case(&self.callout))
            .unwrap_or(false)
    }
}

fn flush_prose(tokens: &mut Vec<Token>, prose: &mut Vec<&str>) {
    if !prose.is_empty() {
        tokens.push(Token::Prose(prose.join("\n")));
        prose.clear();
    }
}

/// Parse the body of a source block.
pub fn parse_source_block(body: &str) -> SourceBlock {
    let mut descriptors = Vec::new();
    let mut current: Option<StrategyDescriptor> = None;
    let mut guidance: Vec<&str> = Vec::new();
    let mut in_sources = false;

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.eq_ignore_ascii_case("sources:") {
            in_sources = true;
            continue;
        }

        if in_sources {
            if trimmed == "-" || trimmed.starts_with("- ") {
                descriptors.extend(current.take());
                let mut descriptor = StrategyDescriptor::unspecified();
                apply_field(&mut descriptor, trimmed[1..].trim());
                current = Some(descriptor);
                continue;
            }

            let indented = line.starts_with(char::is_whitespace);
            if let Some(descriptor) = current.as_mut() {
                if indented && !trimmed.is_empty() && apply_field(descriptor, trimmed) {
                    continue;
                }
            }
            if trimmed.is_empty() {
                continue;
            }
            in_sources = false;
        }

        guidance.push(line);
    }
    descriptors.extend(current);

    let prompt = guidance.join("\n").trim().to_string();
    if descriptors.is_empty() {
        descriptors = implicit_descriptors(&prompt);
    }

    SourceBlock {
        descriptors,
        prompt,
    }
}

/// Apply one `key: value` line. Returns false for unknown keys.
fn apply_field(descriptor: &mut StrategyDescriptor, line: &str) -> bool {
    let Some((key, value)) = line.split_once(':') else {
        return false;
    };
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .trim();
    let value = (!value.is_empty()).then(|| value.to_string());

    match key.trim().to_ascii_lowercase().as_str() {
        "strategy" => {
            descriptor.set_strategy_name(value.as_deref());
            if let Some(name) = &descriptor.unknown_kind {
                warn!(strategy = %name, "Unknown strategy, falling back to query-driven");
            }
        }
        "query" => descriptor.query = value,
        "evergreen" | "target" => descriptor.target_entity = value,
        "note" | "source" | "file" => descriptor.source_note = value.map(|v| link_target(&v)),
        "preamble" | "sourcepreamble" => descriptor.source_preamble = value,
        "folder" => descriptor.folder = value,
        _ => return false,
    }
    true
}

/// `[[Name|alias]]` → `Name`; anything else unchanged.
fn link_target(value: &str) -> String {
    match Entity::parse(value) {
        Some(Entity::Note(name)) => name,
        _ => value.to_string(),
    }
}

fn implicit_descriptors(prompt: &str) -> Vec<StrategyDescriptor> {
    let metadata = scan_metadata(prompt);
    let mut seen: Vec<String> = Vec::new();
    let mut descriptors = Vec::new();

    let entities = metadata
        .links
        .iter()
        .map(|m| Entity::Note(m.name.clone()))
        .chain(metadata.tags.iter().map(|m| Entity::Tag(m.name.clone())));

    for entity in entities {
        let key = entity.key();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        descriptors.push(
            StrategyDescriptor::new(StrategyKind::QueryDriven).with_target(entity.to_string()),
        );
    }

    if descriptors.is_empty() {
        descriptors.push(StrategyDescriptor::unspecified());
    }
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> ConversationGrammar {
        ConversationGrammar::new("context", "ai")
    }

    const DOC: &str = "# Weekly review\n\n```context\nsources:\n  - strategy: Basic\n    note: [[Standup|standup notes]]\n  - query: LIST FROM #launch\n    preamble: Launch notes\nWhat changed?\n```\n\n> [!ai]\n> Launch slipped %a1%.\n> Bob is on it.\n\nMy own notes\n\n```rust\n> [!ai] not a turn\n```\n\n```context\nAnd [[Bob]]?\n```\n";

    #[test]
    fn test_tokenize() {
        let tokens = grammar().tokenize(DOC);
        let kinds: Vec<&str> = tokens
            .iter()
            .map(|t| match t {
                Token::SourceBlock(_) => "source",
                Token::Callout(_) => "callout",
                Token::Prose(_) => "prose",
            })
            .collect();

        assert_eq!(
            kinds,
            vec!["prose", "source", "prose", "callout", "prose", "prose", "prose", "source"]
        );
        assert_eq!(tokens[3], Token::Callout("Launch slipped %a1%.\nBob is on it.".into()));
    }

    #[test]
    fn test_parse_turns() {
        let turns = grammar().parse(DOC);
        assert_eq!(turns.len(), 3);

        let Turn::User(first) = &turns[0] else {
            panic!("expected user turn");
        };
        assert_eq!(first.prompt, "What changed?");
        assert_eq!(first.descriptors.len(), 2);
        assert_eq!(first.descriptors[0].kind, Some(StrategyKind::WholeFile));
        assert_eq!(first.descriptors[0].source_note.as_deref(), Some("Standup"));
        assert_eq!(first.descriptors[1].query.as_deref(), Some("LIST FROM #launch"));
        assert_eq!(first.descriptors[1].source_preamble.as_deref(), Some("Launch notes"));
        assert_eq!(first.descriptors[1].resolved_kind(), StrategyKind::QueryDriven);

        assert_eq!(
            turns[1],
            Turn::Assistant("Launch slipped %a1%.\nBob is on it.".into())
        );

        let Turn::User(last) = &turns[2] else {
            panic!("expected user turn");
        };
        assert_eq!(last.prompt, "And [[Bob]]?");
        assert_eq!(
            last.descriptors,
            vec![StrategyDescriptor::new(StrategyKind::QueryDriven).with_target("[[Bob]]")]
        );
    }

    #[test]
    fn test_block_without_entities_is_unspecified() {
        let block = parse_source_block("Summarise my week");
        assert_eq!(block.descriptors, vec![StrategyDescriptor::unspecified()]);
        assert_eq!(block.descriptors[0].resolved_kind(), StrategyKind::RecencyRanked);
    }

    #[test]
    fn test_unknown_strategy_and_keys_are_tolerated() {
        let block = parse_source_block(
            "sources:\n- strategy: Telepathy\n  evergreen: #launch\n  colour: blue\nThoughts on #launch?",
        );

        assert_eq!(block.descriptors.len(), 1);
        assert_eq!(block.descriptors[0].kind, None);
        assert_eq!(block.descriptors[0].unknown_kind.as_deref(), Some("Telepathy"));
        assert_eq!(block.descriptors[0].resolved_kind(), StrategyKind::QueryDriven);
        assert_eq!(block.descriptors[0].target_entity.as_deref(), Some("#launch"));
        assert_eq!(block.prompt, "colour: blue\nThoughts on #launch?");
    }

    #[test]
    fn test_quoted_values() {
        let block = parse_source_block(
            "sources:\n- query: LIST FROM \"Daily\" SORT file.mtime DESC\n  preamble: \"Daily notes\"",
        );
        assert_eq!(
            block.descriptors[0].query.as_deref(),
            Some("LIST FROM \"Daily\" SORT file.mtime DESC")
        );
        assert_eq!(block.descriptors[0].source_preamble.as_deref(), Some("Daily notes"));
    }

    #[test]
    fn test_unterminated_source_block_runs_to_end() {
        let tokens = grammar().tokenize("```context\nsources:\n- folder: Projects");
        assert_eq!(
            tokens,
            vec![Token::SourceBlock("sources:\n- folder: Projects".into())]
        );
    }
}
