//! Excerpt ranking - let the model pick which excerpts to keep.

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::{prompts::format_rank_excerpts_prompt, retry::complete_json_with_retry};
use crate::traits::generation::GenerationSource;
use crate::types::{excerpt::Excerpt, message::ConversationMessage};

#[derive(Debug, Deserialize)]
struct RankingResponse {
    keep: Vec<usize>,
}

/// Keep the excerpts the model selects, in the order it returns them.
///
/// Out-of-range and repeated indices are ignored. When nothing valid is
/// selected the input is returned unchanged.
pub async fn rank_excerpts(
    generation: &dyn GenerationSource,
    excerpts: Vec<Excerpt>,
    guidance: &str,
    limit: usize,
    json_attempts: u32,
) -> Result<Vec<Excerpt>> {
    let messages = vec![ConversationMessage::user(
        format_rank_excerpts_prompt(guidance, &excerpts, limit),
        Vec::new(),
        guidance,
    )];

    let response: RankingResponse =
        complete_json_with_retry(generation, &messages, json_attempts).await?;

    let mut slots: Vec<Option<Excerpt>> = excerpts.into_iter().map(Some).collect();
    let kept: Vec<Excerpt> = response
        .keep
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .take(limit)
        .collect();

    if kept.is_empty() {
        warn!("Ranking selected no excerpts, keeping all");
        return Ok(slots.into_iter().flatten().collect());
    }

    info!(kept = kept.len(), "Ranked excerpts");
    Ok(kept)
}
