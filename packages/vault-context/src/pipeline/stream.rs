//! Streaming marker substitution.
//!
//! Generated text arrives in fragments that may split a marker anywhere.
//! Each fragment is folded into a single piece of state, the pending
//! prefix: the shortest tail that could still turn out to be the start of a
//! marker. Everything before it is resolved and released immediately.
//!
//! Concatenating everything released over a whole stream equals
//! [`substitute`](crate::text::markers::substitute) applied to the
//! concatenated input, however the input was split.

use async_stream::stream;
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::text::markers::{is_marker_char, marker_pattern, DELIMITER};
use crate::types::excerpt::SubstitutionTable;

/// Output of one fold step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Resolved text safe to release now
    pub emit: String,

    /// Text held back until the next fragment
    pub pending: String,
}

/// One transition of the substitution state machine.
pub fn step(pending: &str, part: &str, table: &SubstitutionTable) -> Step {
    let mut current = String::with_capacity(pending.len() + part.len());
    current.push_str(pending);
    current.push_str(part);

    let mut emit = String::with_capacity(current.len());
    let mut last = 0;
    for found in marker_pattern().find_iter(&current) {
        emit.push_str(&current[last..found.start()]);
        let token = found.as_str();
        emit.push_str(table.resolve(token).unwrap_or(token));
        last = found.end();
    }

    let tail = &current[last..];
    match hold_from(tail) {
        Some(at) => {
            emit.push_str(&tail[..at]);
            Step {
                emit,
                pending: tail[at..].to_string(),
            }
        }
        None => {
            emit.push_str(tail);
            Step {
                emit,
                pending: String::new(),
            }
        }
    }
}

/// Offset of an unclosed delimiter that could still open a marker.
///
/// Only the last delimiter can qualify: everything after it must be marker
/// characters.
fn hold_from(tail: &str) -> Option<usize> {
    let at = tail.rfind(DELIMITER)?;
    tail[at + DELIMITER.len_utf8()..]
        .chars()
        .all(is_marker_char)
        .then_some(at)
}

/// Chunk-incremental marker resolver.
#[derive(Debug, Clone, Default)]
pub struct MarkerSubstitutionStream {
    table: SubstitutionTable,
    pending: String,
}

impl MarkerSubstitutionStream {
    pub fn new(table: SubstitutionTable) -> Self {
        Self {
            table,
            pending: String::new(),
        }
    }

    /// Feed one fragment; returns what can be released now (possibly empty).
    pub fn push(&mut self, part: &str) -> String {
        let Step { emit, pending } = step(&self.pending, part, &self.table);
        self.pending = pending;
        emit
    }

    /// End of stream: release the held prefix verbatim.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Drop the held prefix without releasing it (cancel / failure).
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Text currently held back.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.table
    }
}

/// Resolve a finite sequence of fragments, returning the released pieces.
pub fn substitute_chunks<'a>(
    chunks: impl IntoIterator<Item = &'a str>,
    table: &SubstitutionTable,
) -> Vec<String> {
    let (mut released, pending) = chunks.into_iter().fold(
        (Vec::new(), String::new()),
        |(mut released, pending), part| {
            let Step { emit, pending } = step(&pending, part, table);
            if !emit.is_empty() {
                released.push(emit);
            }
            (released, pending)
        },
    );

    if !pending.is_empty() {
        released.push(pending);
    }
    released
}

/// Resolve markers in a stream of generated fragments.
///
/// Empty releases are skipped. A failed fragment ends the stream with that
/// error and the held prefix is discarded, never flushed.
pub fn substitute_stream<S>(
    fragments: S,
    table: SubstitutionTable,
) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<String>> + Send,
{
    stream! {
        let mut state = MarkerSubstitutionStream::new(table);
        let mut fragments = Box::pin(fragments);

        while let Some(part) = fragments.next().await {
            match part {
                Ok(part) => {
                    let released = state.push(&part);
                    if !released.is_empty() {
                        yield Ok(released);
                    }
                }
                Err(e) => {
                    state.discard();
                    yield Err(e);
                    return;
                }
            }
        }

        let rest = state.finish();
        if !rest.is_empty() {
            yield Ok(rest);
        }
    }
}
