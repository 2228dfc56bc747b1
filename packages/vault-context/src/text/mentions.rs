//! Mention scanning - tags, links, and embeds in raw markdown.

use regex::Regex;
use std::sync::LazyLock;

use crate::text::clean::header_len;
use crate::types::document::{tag_matches, EmbedRef, Entity, Mention, NoteMetadata, Position};

static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[\[([^\[\]|]+?)(?:\|[^\[\]]*)?\]\]").unwrap());

static RE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)(?:^|[\s(\[,;:!?"'])(#[\p{L}_][\p{L}\p{N}_/-]*)"#).unwrap()
});

static RE_HEADER_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tags?\s*:\s*(.*)$").unwrap());

/// Positions of every mention of `entity` in `text`.
///
/// Notes are matched through non-embed `[[links]]`; tags through inline
/// `#tag` occurrences, nested sub-tags included.
pub fn find_mentions(text: &str, entity: &Entity) -> Vec<Position> {
    match entity {
        Entity::Note(_) => RE_LINK
            .captures_iter(text)
            .filter(|c| c[1].is_empty())
            .filter(|c| entity.matches_link(link_name(&c[2])))
            .filter_map(|c| c.get(0))
            .map(|m| Position::new(m.start(), m.end()))
            .collect(),
        Entity::Tag(tag) => RE_TAG
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter(|m| tag_matches(m.as_str(), tag))
            .map(|m| Position::new(m.start(), m.end()))
            .collect(),
    }
}

/// Every `![[embed]]` directive in `text`.
pub fn scan_embeds(text: &str) -> Vec<EmbedRef> {
    RE_LINK
        .captures_iter(text)
        .filter(|c| !c[1].is_empty())
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(EmbedRef {
                target: c[2].trim().to_string(),
                position: Position::new(whole.start(), whole.end()),
            })
        })
        .collect()
}

/// Derive [`NoteMetadata`] from raw markdown.
pub fn scan_metadata(content: &str) -> NoteMetadata {
    let header_end = header_len(content);
    let header_tags = parse_header_tags(&content[..header_end]);

    let tags = RE_TAG
        .captures_iter(&content[header_end..])
        .filter_map(|c| c.get(1))
        .map(|m| Mention {
            name: m.as_str().trim_start_matches('#').to_string(),
            position: Position::new(header_end + m.start(), header_end + m.end()),
        })
        .collect();

    let links = RE_LINK
        .captures_iter(content)
        .filter(|c| c[1].is_empty())
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(Mention {
                name: link_name(&c[2]).to_string(),
                position: Position::new(whole.start(), whole.end()),
            })
        })
        .collect();

    NoteMetadata {
        header_tags,
        tags,
        links,
        embeds: scan_embeds(content),
    }
}

/// Link target without its `#fragment`.
fn link_name(target: &str) -> &str {
    target.split('#').next().unwrap_or(target).trim()
}

/// Tags declared as `tags: [a, b]`, `tags: a b`, or a YAML list.
fn parse_header_tags(header: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut in_list = false;

    for line in header.lines() {
        let trimmed = line.trim();
        if trimmed == "---" {
            continue;
        }

        if let Some(caps) = RE_HEADER_TAGS.captures(trimmed) {
            let inline = caps[1].trim();
            in_list = inline.is_empty();
            tags.extend(
                inline
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .map(clean_tag)
                    .filter(|t| !t.is_empty()),
            );
            continue;
        }

        match trimmed.strip_prefix("- ") {
            Some(item) if in_list => {
                let tag = clean_tag(item);
                if !tag.is_empty() {
                    tags.push(tag);
                }
            }
            _ => in_list = false,
        }
    }

    tags
}

fn clean_tag(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_start_matches('#')
        .to_string()
}
