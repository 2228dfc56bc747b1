//! Cleaning - remove the structured header, code fences, and hyperlink noise.

use regex::Regex;
use std::sync::LazyLock;

static RE_CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^[ \t]*```[^\n]*\n.*?^[ \t]*```[ \t]*$\n?").unwrap());

static RE_HYPERLINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]\([a-zA-Z][a-zA-Z0-9+.-]*:[^)\s]*\)").unwrap());

/// Byte length of a leading `---` header block, including its closing line.
///
/// Returns 0 when the note has no header or the header is never closed.
pub fn header_len(text: &str) -> usize {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return 0;
    };
    let opening = text.len() - rest.len();

    let mut offset = opening;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return offset;
        }
    }
    0
}

/// Remove the structured header block.
pub fn strip_header(text: &str) -> &str {
    &text[header_len(text)..]
}

/// Remove fenced code blocks. Unterminated fences are left alone.
pub fn strip_code_fences(text: &str) -> String {
    RE_CODE_FENCE.replace_all(text, "").into_owned()
}

/// Collapse `[label](scheme:...)` hyperlinks to their label.
pub fn strip_hyperlinks(text: &str) -> String {
    RE_HYPERLINK.replace_all(text, "$1").into_owned()
}

/// Header removal followed by fence removal, trimmed.
pub fn clean(text: &str) -> String {
    strip_code_fences(strip_header(text)).trim().to_string()
}
