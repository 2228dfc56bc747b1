//! Merging overlapping excerpts of the same note.
//!
//! Two excerpts of one source are combined when
//! - one body contains the other: the longer one is kept
//! - the tail of one equals the head of the other for at least
//!   `min_overlap` bytes: they are spliced into one body
//!
//! Otherwise both are kept. Excerpts are compared in the order given.

use indexmap::IndexMap;

use crate::types::excerpt::Excerpt;

/// Merge excerpts per source note, keeping first-seen source order.
pub fn merge_excerpts(excerpts: Vec<Excerpt>, min_overlap: usize) -> Vec<Excerpt> {
    let mut by_source: IndexMap<String, Vec<Excerpt>> = IndexMap::new();

    for excerpt in excerpts {
        let kept = by_source.entry(excerpt.source_id.clone()).or_default();
        merge_into(kept, excerpt, min_overlap);
    }

    by_source.into_values().flatten().collect()
}

/// Fold `incoming` into `kept`. A grown excerpt is compared again with the
/// rest, so one excerpt bridging two kept ones joins all three.
fn merge_into(kept: &mut Vec<Excerpt>, mut incoming: Excerpt, min_overlap: usize) {
    let mut slot: Option<usize> = None;

    while let Some((index, body)) = kept.iter().enumerate().find_map(|(i, existing)| {
        combined_body(&existing.body, &incoming.body, min_overlap).map(|body| (i, body))
    }) {
        let mut existing = kept.remove(index);
        absorb(&mut existing, incoming, body);
        incoming = existing;
        slot = Some(slot.map_or(index, |s| s.min(index)));
    }

    match slot {
        Some(at) => kept.insert(at, incoming),
        None => kept.push(incoming),
    }
}

/// Body of `existing` and `incoming` merged, if they merge at all.
fn combined_body(existing: &str, incoming: &str, min_overlap: usize) -> Option<String> {
    if existing.contains(incoming) {
        return Some(existing.to_string());
    }
    if incoming.contains(existing) {
        return Some(incoming.to_string());
    }
    splice(existing, incoming, min_overlap)
}

fn absorb(existing: &mut Excerpt, incoming: Excerpt, body: String) {
    existing.body = body;
    existing.last_modified = existing.last_modified.max(incoming.last_modified);
    existing.absorb_substitutions(incoming.substitutions);
    for tag in incoming.tags {
        if !existing.tags.contains(&tag) {
            existing.tags.push(tag);
        }
    }
}

/// Join `a` and `b` on their longest tail/head overlap, in either order.
///
/// Tries `a` followed by `b` first. Returns `None` when neither order
/// overlaps by at least `min_overlap` bytes.
pub fn splice(a: &str, b: &str, min_overlap: usize) -> Option<String> {
    join_on_overlap(a, b, min_overlap).or_else(|| join_on_overlap(b, a, min_overlap))
}

fn join_on_overlap(head: &str, tail: &str, min_overlap: usize) -> Option<String> {
    let longest = head.len().min(tail.len());
    (min_overlap.max(1)..=longest)
        .rev()
        .filter(|k| tail.is_char_boundary(*k) && head.is_char_boundary(head.len() - k))
        .find(|k| head.ends_with(&tail[..*k]))
        .map(|k| format!("{}{}", head, &tail[k..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixed_time;
    use crate::types::excerpt::Substitution;

    fn excerpt(source: &str, day: i64, body: &str) -> Excerpt {
        Excerpt::new(source, fixed_time(day), body)
    }

    #[test]
    fn test_partial_overlap_splices() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox"),
                excerpt("a.md", 2, "brown fox jumps"),
            ],
            8,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "the quick brown fox jumps");
        assert_eq!(merged[0].last_modified, fixed_time(2));
    }

    #[test]
    fn test_overlap_in_reverse_order_splices() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "brown fox jumps"),
                excerpt("a.md", 1, "the quick brown fox"),
            ],
            8,
        );
        assert_eq!(merged[0].body, "the quick brown fox jumps");
    }

    #[test]
    fn test_containment_keeps_longer() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "quick brown"),
                excerpt("a.md", 1, "the quick brown fox"),
            ],
            8,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "the quick brown fox");

        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox"),
                excerpt("a.md", 1, "quick brown"),
            ],
            8,
        );
        assert_eq!(merged[0].body, "the quick brown fox");
    }

    #[test]
    fn test_disjoint_excerpts_are_kept() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox"),
                excerpt("a.md", 1, "lazy dog sleeps"),
            ],
            8,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_bridging_excerpt_joins_both_neighbours() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox"),
                excerpt("a.md", 1, "lazy dog sleeps soundly"),
                excerpt("b.md", 1, "unrelated"),
                excerpt("a.md", 3, "brown fox meets the lazy dog"),
            ],
            8,
        );

        let bodies: Vec<&str> = merged.iter().map(|e| e.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["the quick brown fox meets the lazy dog sleeps soundly", "unrelated"]
        );
        assert_eq!(merged[0].last_modified, fixed_time(3));
    }

    #[test]
    fn test_short_overlap_is_not_spliced() {
        let merged = merge_excerpts(
            vec![excerpt("a.md", 1, "ends with fox"), excerpt("a.md", 1, "fox begins")],
            8,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_different_sources_never_merge() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox"),
                excerpt("b.md", 1, "the quick brown fox"),
                excerpt("a.md", 1, "brown fox jumps"),
            ],
            8,
        );

        let sources: Vec<&str> = merged.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_merge_unions_substitutions_and_tags() {
        let merged = merge_excerpts(
            vec![
                excerpt("a.md", 1, "the quick brown fox %m1%")
                    .with_substitutions(vec![Substitution::new("%m1%", "![[a#^1]]")])
                    .with_tags(vec!["animals".into()]),
                excerpt("a.md", 1, "brown fox %m1% and %m2%")
                    .with_substitutions(vec![
                        Substitution::new("%m1%", "![[a#^1]]"),
                        Substitution::new("%m2%", "![[a#^2]]"),
                    ])
                    .with_tags(vec!["animals".into(), "speed".into()]),
            ],
            8,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "the quick brown fox %m1% and %m2%");
        assert_eq!(merged[0].substitutions.len(), 2);
        assert_eq!(merged[0].tags, vec!["animals", "speed"]);
    }

    #[test]
    fn test_splice_respects_char_boundaries() {
        assert_eq!(
            splice("über straße end", "straße end más", 8).as_deref(),
            Some("über straße end más")
        );
    }
}
