//! Paragraph-aligned windows around mentions.
//!
//! Paragraphs are separated by blank lines (`\n\n`). Boundary 0 is the start
//! of the text and boundary `k + 1` its end, with the `k` real separators in
//! between. A mention lying between boundaries `i` and `i + 1` yields the
//! text between boundaries `max(0, i - N)` and `min(k + 1, i + 1 + N)`,
//! widened by `char_fall_off` characters on each side and clamped to the
//! text.

use crate::text::mentions::find_mentions;
use crate::types::{
    config::WindowConfig,
    document::{Entity, NoteMetadata, Position},
};

const PARAGRAPH_BREAK: &str = "\n\n";

/// One window per mention, in mention order, keeping only the last
/// `max_windows`.
pub fn extract_windows(text: &str, mentions: &[Position], config: &WindowConfig) -> Vec<String> {
    let boundaries: Vec<usize> = text.match_indices(PARAGRAPH_BREAK).map(|(i, _)| i).collect();
    let n = config.paragraphs;

    let mut windows: Vec<String> = mentions
        .iter()
        .filter(|m| m.start <= text.len())
        .map(|mention| {
            let end = mention.end.clamp(mention.start, text.len());
            let before = boundaries.iter().filter(|b| **b < mention.start).count();
            let through = boundaries.iter().filter(|b| **b < end).count();

            let start = match before.saturating_sub(n) {
                0 => 0,
                idx => boundaries[idx - 1] + PARAGRAPH_BREAK.len(),
            };
            let stop = match through + 1 + n {
                idx if idx > boundaries.len() => text.len(),
                idx => boundaries[idx - 1],
            };

            let start = back_chars(text, start, config.char_fall_off);
            let stop = forward_chars(text, stop.max(start), config.char_fall_off);
            text[start..stop].trim().to_string()
        })
        .collect();

    if windows.len() > config.max_windows {
        windows.drain(..windows.len() - config.max_windows);
    }
    windows
}

/// Windows for one entity inside one cleaned note.
///
/// An entity the note declares in its header gets a single prefix window
/// of `summary_prefix_chars` characters instead of per-mention windows.
pub fn windows_for_entity(
    text: &str,
    metadata: &NoteMetadata,
    entity: &Entity,
    config: &WindowConfig,
) -> Vec<String> {
    if let Entity::Tag(tag) = entity {
        if metadata.declares_header_tag(tag) {
            let end = forward_chars(text, 0, config.summary_prefix_chars);
            let prefix = text[..end].trim();
            return if prefix.is_empty() {
                Vec::new()
            } else {
                vec![prefix.to_string()]
            };
        }
    }

    extract_windows(text, &find_mentions(text, entity), config)
}

/// Byte offset `count` characters before `from`, stopping at 0.
fn back_chars(text: &str, from: usize, count: usize) -> usize {
    if count == 0 {
        return floor_boundary(text, from);
    }
    text[..floor_boundary(text, from)]
        .char_indices()
        .rev()
        .take(count)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset `count` characters after `from`, stopping at the end.
fn forward_chars(text: &str, from: usize, count: usize) -> usize {
    let from = floor_boundary(text, from);
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
