//! LLM prompts for context synthesis.
//!
//! Excerpts reach the model with block references replaced by short
//! `%marker%` tokens; the system prompt tells the model to copy them
//! verbatim when it wants to cite a block.

use crate::types::excerpt::Excerpt;

/// System instruction used unless the host configures its own.
pub const SYSTEM_PROMPT: &str = r#"You are a writing assistant working inside the user's personal notes.

The user message contains excerpts retrieved from their notes, grouped by source, followed by their request.

Rules:
1. Ground every statement in the excerpts. If the excerpts do not cover something, say so.
2. Excerpts contain markers such as %a3f0%. Each marker stands for a block of a note. To quote or point at that block, write the marker exactly as it appears, delimiters included. Never invent markers.
3. Refer to notes by their title as [[Title]].
4. Answer in markdown. Be concise."#;

/// Prompt for choosing the excerpts worth keeping.
pub const RANK_EXCERPTS_PROMPT: &str = r#"Select the excerpts most useful for answering the request below.

Request:
{guidance}

Excerpts:
{excerpts}

Keep at most {limit} excerpts, most useful first.

Output JSON:
{"keep": [indices of the excerpts to keep, most useful first]}"#;

/// Retrieved excerpts for one source descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSection {
    pub preamble: Option<String>,
    pub excerpts: Vec<Excerpt>,
}

/// Render one excerpt with its note title and date.
pub fn format_excerpt(excerpt: &Excerpt) -> String {
    format!(
        "### {} ({})\n{}\n",
        crate::types::document::basename(&excerpt.source_id),
        excerpt.last_modified.format("%Y-%m-%d"),
        excerpt.body
    )
}

/// Render every section, preambles first.
pub fn format_sections(sections: &[SourceSection]) -> String {
    sections
        .iter()
        .filter(|s| !s.excerpts.is_empty() || s.preamble.is_some())
        .map(|section| {
            let excerpts = section
                .excerpts
                .iter()
                .map(format_excerpt)
                .collect::<Vec<_>>()
                .join("\n");
            match section.preamble.as_deref() {
                Some(preamble) => format!("{}\n\n{}", preamble.trim(), excerpts),
                None => excerpts,
            }
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// The final user message: retrieved context, then the request.
pub fn format_user_message(prompt: &str, sections: &[SourceSection]) -> String {
    let context = format_sections(sections);
    let request = if prompt.trim().is_empty() {
        "Summarise what these notes say."
    } else {
        prompt.trim()
    };

    if context.trim().is_empty() {
        format!("No excerpts were retrieved.\n\n## Request\n{}", request)
    } else {
        format!("## Excerpts\n\n{}\n\n## Request\n{}", context.trim_end(), request)
    }
}

/// Format the ranking prompt with numbered excerpts.
pub fn format_rank_excerpts_prompt(guidance: &str, excerpts: &[Excerpt], limit: usize) -> String {
    let excerpts_text = excerpts
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {}", i, format_excerpt(e)))
        .collect::<Vec<_>>()
        .join("\n");

    RANK_EXCERPTS_PROMPT
        .replace("{guidance}", guidance)
        .replace("{excerpts}", &excerpts_text)
        .replace("{limit}", &limit.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixed_time;

    #[test]
    fn test_format_excerpt() {
        let excerpt = Excerpt::new("Journal/2024-01-06.md", fixed_time(5), "Shipped %a1%");
        assert_eq!(format_excerpt(&excerpt), "### 2024-01-06 (2024-01-06)\nShipped %a1%\n");
    }

    #[test]
    fn test_user_message_with_preamble() {
        let sections = vec![SourceSection {
            preamble: Some("Launch notes".into()),
            excerpts: vec![Excerpt::new("Launch.md", fixed_time(0), "Goal")],
        }];

        let message = format_user_message("What changed?", &sections);
        assert!(message.starts_with("## Excerpts\n\nLaunch notes\n\n### Launch (2024-01-01)\nGoal"));
        assert!(message.ends_with("## Request\nWhat changed?"));
    }

    #[test]
    fn test_user_message_without_context() {
        let message = format_user_message("", &[]);
        assert_eq!(
            message,
            "No excerpts were retrieved.\n\n## Request\nSummarise what these notes say."
        );
    }

    #[test]
    fn test_rank_prompt_numbers_excerpts() {
        let excerpts = vec![
            Excerpt::new("a.md", fixed_time(0), "first"),
            Excerpt::new("b.md", fixed_time(0), "second"),
        ];
        let prompt = format_rank_excerpts_prompt("Plan the launch", &excerpts, 1);

        assert!(prompt.contains("[0] ### a (2024-01-01)\nfirst"));
        assert!(prompt.contains("[1] ### b"));
        assert!(prompt.contains("Keep at most 1 excerpts"));
        assert!(!prompt.contains("{guidance}"));
    }
}
