//! Markers - short opaque tokens standing in for embeddable references.
//!
//! Syntax: `%` + one or more ASCII alphanumerics + `%`. During retrieval,
//! block anchors and existing embeds are swapped for markers and recorded in
//! a [`MarkerRegistry`]; during streaming the markers are swapped back.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use uuid::Uuid;

use crate::text::clean::strip_hyperlinks;
use crate::types::excerpt::{Substitution, SubstitutionTable};

/// Marker delimiter.
pub const DELIMITER: char = '%';

static RE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[A-Za-z0-9]+%").unwrap());

static RE_BLOCK_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(\s)\^([A-Za-z0-9-]+)[ \t]*$").unwrap());

static RE_EMBED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[\[[^\[\]]+\]\]").unwrap());

/// Characters allowed between the delimiters.
pub fn is_marker_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Pattern matching one complete marker token.
pub fn marker_pattern() -> &'static Regex {
    &RE_MARKER
}

/// Resolve every marker in `text` in one pass. Unknown markers pass through.
pub fn substitute(text: &str, table: &SubstitutionTable) -> String {
    RE_MARKER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            table.resolve(token).unwrap_or(token).to_string()
        })
        .into_owned()
}

/// `![[title#^anchor]]`
pub fn block_reference(source_title: &str, anchor: &str) -> String {
    format!("![[{}#^{}]]", source_title, anchor)
}

/// `![[title]]`
pub fn note_reference(source_title: &str) -> String {
    format!("![[{}]]", source_title)
}

/// Source of candidate marker token bodies (delimiters excluded).
///
/// Injected so tests can drive collisions deterministically.
pub trait MarkerGenerator: Send {
    fn next_token(&mut self) -> String;
}

/// Hex tokens drawn from random v4 UUIDs.
#[derive(Debug, Clone)]
pub struct RandomMarkers {
    width: usize,
}

impl RandomMarkers {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.clamp(1, 32),
        }
    }
}

impl Default for RandomMarkers {
    fn default() -> Self {
        Self::new(4)
    }
}

impl MarkerGenerator for RandomMarkers {
    fn next_token(&mut self) -> String {
        Uuid::new_v4().simple().to_string()[..self.width].to_string()
    }
}

/// Hex tokens derived from SHA-256 of a seed and a counter.
///
/// Reproducible across runs for the same seed.
#[derive(Debug, Clone)]
pub struct HashMarkers {
    seed: String,
    counter: u64,
    width: usize,
}

impl HashMarkers {
    pub fn new(seed: impl Into<String>, width: usize) -> Self {
        Self {
            seed: seed.into(),
            counter: 0,
            width: width.clamp(1, 64),
        }
    }
}

impl MarkerGenerator for HashMarkers {
    fn next_token(&mut self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(self.counter.to_le_bytes());
        self.counter += 1;
        format!("{:x}", hasher.finalize())[..self.width].to_string()
    }
}

struct RegistryState {
    generator: Box<dyn MarkerGenerator>,
    by_marker: HashMap<String, String>,
    by_reference: HashMap<String, String>,
}

/// The substitution table of one retrieval + generation cycle.
///
/// Minting the same reference twice returns the same marker, so overlapping
/// windows of a note agree on their markers. A fresh marker is checked
/// against every marker already issued; after `max_attempts` colliding
/// draws the last candidate gets an increasing decimal suffix until unique.
///
/// Shared by reference across concurrently running extractors.
pub struct MarkerRegistry {
    state: Mutex<RegistryState>,
    max_attempts: usize,
}

impl MarkerRegistry {
    /// Registry backed by a custom generator.
    pub fn new(generator: impl MarkerGenerator + 'static, max_attempts: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                generator: Box::new(generator),
                by_marker: HashMap::new(),
                by_reference: HashMap::new(),
            }),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Registry minting random hex markers of the given width.
    pub fn random(width: usize, max_attempts: usize) -> Self {
        Self::new(RandomMarkers::new(width), max_attempts)
    }

    /// Marker for `reference`, minting one if needed. Delimiters included.
    pub fn mint(&self, reference: &str) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = state.by_reference.get(reference) {
            return existing.clone();
        }

        let mut candidate = String::new();
        let mut unique = false;
        for _ in 0..self.max_attempts {
            candidate = wrap(&sanitize(&state.generator.next_token()));
            if !state.by_marker.contains_key(&candidate) {
                unique = true;
                break;
            }
        }

        if !unique {
            let stem = candidate.trim_matches(DELIMITER).to_string();
            let mut suffix = 1u64;
            loop {
                candidate = wrap(&format!("{}{}", stem, suffix));
                if !state.by_marker.contains_key(&candidate) {
                    break;
                }
                suffix += 1;
            }
        }

        state
            .by_marker
            .insert(candidate.clone(), reference.to_string());
        state
            .by_reference
            .insert(reference.to_string(), candidate.clone());
        candidate
    }

    /// Register markers that already exist (e.g. from earlier turns).
    ///
    /// Returns false if the marker is taken by a different reference.
    pub fn reserve(&self, substitution: &Substitution) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.by_marker.get(&substitution.marker) {
            Some(existing) => existing == &substitution.reference,
            None => {
                state
                    .by_marker
                    .insert(substitution.marker.clone(), substitution.reference.clone());
                state
                    .by_reference
                    .entry(substitution.reference.clone())
                    .or_insert_with(|| substitution.marker.clone());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_marker
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every marker issued so far.
    pub fn table(&self) -> SubstitutionTable {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_marker
            .iter()
            .map(|(marker, reference)| Substitution::new(marker.clone(), reference.clone()))
            .collect()
    }
}

impl std::fmt::Debug for MarkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRegistry")
            .field("issued", &self.len())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

fn wrap(token: &str) -> String {
    format!("{}{}{}", DELIMITER, token, DELIMITER)
}

fn sanitize(token: &str) -> String {
    let cleaned: String = token.chars().filter(|c| is_marker_char(*c)).collect();
    if cleaned.is_empty() {
        "0".to_string()
    } else {
        cleaned
    }
}

/// Text with markers in place of references, plus what they stand for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkedText {
    pub text: String,
    pub substitutions: Vec<Substitution>,
}

/// Swap block anchors and embeds for markers, and drop hyperlink noise.
///
/// - `^anchor` at the end of a line becomes a marker for
///   `![[source_title#^anchor]]`
/// - an existing `![[target]]` becomes a marker for itself
pub fn to_markers(source_title: &str, text: &str, registry: &MarkerRegistry) -> MarkedText {
    let mut substitutions: Vec<Substitution> = Vec::new();
    let mut record = |marker: &str, reference: String| {
        if !substitutions.iter().any(|s| s.marker == marker) {
            substitutions.push(Substitution::new(marker, reference));
        }
    };

    let anchored = RE_BLOCK_ANCHOR.replace_all(text, |caps: &regex::Captures<'_>| {
        let reference = block_reference(source_title, &caps[2]);
        let marker = registry.mint(&reference);
        record(&marker, reference);
        format!("{}{}", &caps[1], marker)
    });

    let embedded = RE_EMBED.replace_all(&anchored, |caps: &regex::Captures<'_>| {
        let reference = caps[0].to_string();
        let marker = registry.mint(&reference);
        record(&marker, reference);
        marker
    });

    MarkedText {
        text: strip_hyperlinks(&embedded),
        substitutions,
    }
}
