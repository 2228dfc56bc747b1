//! Embed resolution - inline transcluded content before anything is windowed.

use regex::Regex;
use std::sync::LazyLock;

use crate::text::clean::strip_header;
use crate::types::document::Position;

static RE_BLOCK_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\^[A-Za-z0-9-]+\s*$").unwrap());

static RE_LINE_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|[ \t]+)\^[A-Za-z0-9-]+[ \t]*$").unwrap());

/// An embed directive and the literal content that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEmbed {
    /// Range of the `![[...]]` directive in the original text
    pub position: Position,
    pub content: String,
}

impl ResolvedEmbed {
    pub fn new(position: Position, content: impl Into<String>) -> Self {
        Self {
            position,
            content: content.into(),
        }
    }
}

/// Replace embed directives with their content.
///
/// Positions refer to the original `text`; each replacement shifts later
/// positions by its length delta. Out-of-range or overlapping embeds are
/// skipped.
pub fn resolve_embeds(text: &str, embeds: &[ResolvedEmbed]) -> String {
    let mut ordered: Vec<&ResolvedEmbed> = embeds.iter().collect();
    ordered.sort_by_key(|e| e.position.start);

    let mut out = text.to_string();
    let mut delta: isize = 0;
    let mut last_end = 0;

    for embed in ordered {
        let Position { start, end } = embed.position;
        if start < last_end
            || end > text.len()
            || start > end
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            continue;
        }

        let shifted_start = (start as isize + delta) as usize;
        let shifted_end = (end as isize + delta) as usize;
        out.replace_range(shifted_start..shifted_end, &embed.content);

        delta += embed.content.len() as isize - (end - start) as isize;
        last_end = end;
    }

    out
}

/// Remove `^anchor` suffixes from every line.
///
/// Anchors in transcluded text belong to the embedded note, not to the
/// note being read, so they must not become markers of the latter.
pub fn strip_block_anchors(text: &str) -> String {
    RE_LINE_ANCHOR.replace_all(text, "").into_owned()
}

/// Select the part of a note an embed fragment points at.
///
/// - no fragment: the whole note without its header
/// - `^block`: the paragraph carrying that block anchor, anchor removed
/// - `Heading`: the section under that heading, up to the next heading of
///   the same or higher level
pub fn select_fragment(content: &str, fragment: Option<&str>) -> Option<String> {
    let body = strip_header(content);

    match fragment.map(str::trim) {
        None | Some("") => Some(body.trim().to_string()),
        Some(f) if f.starts_with('^') => select_block(body, &f[1..]),
        Some(heading) => select_section(body, heading),
    }
}

fn select_block(body: &str, anchor: &str) -> Option<String> {
    let suffix = format!("^{}", anchor);
    body.split("\n\n")
        .find(|paragraph| paragraph.trim_end().ends_with(&suffix))
        .map(|paragraph| {
            RE_BLOCK_SUFFIX
                .replace(paragraph.trim_end(), "")
                .trim()
                .to_string()
        })
}

fn heading_level(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.starts_with(' ').then(|| (hashes, rest.trim()))
}

fn select_section(body: &str, heading: &str) -> Option<String> {
    let mut lines = body.lines();
    let level = loop {
        let line = lines.next()?;
        if let Some((level, title)) = heading_level(line) {
            if title.eq_ignore_ascii_case(heading) {
                break level;
            }
        }
    };

    let section: Vec<&str> = lines
        .take_while(|line| {
            heading_level(line)
                .map(|(l, _)| l > level)
                .unwrap_or(true)
        })
        .collect();

    Some(section.join("\n").trim().to_string())
}
