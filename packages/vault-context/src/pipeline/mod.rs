//! Synthesis pipeline - from a conversation note to a streamed answer.
//!
//! The pipeline orchestrates:
//! - Conversation parsing (source blocks and assistant callouts)
//! - Strategy dispatch per source descriptor
//! - Query and structured-output retry
//! - Optional model ranking of retrieved excerpts
//! - Streaming marker substitution into the output sink

pub mod aggregator;
pub mod conversation;
pub mod dispatch;
pub mod prompts;
pub mod ranking;
pub mod retry;
pub mod stream;

pub use aggregator::{Aggregator, ConversationDocument, SynthesisOutcome};
pub use conversation::{parse_source_block, ConversationGrammar, SourceBlock, Token, Turn};
pub use dispatch::ExtractionDispatcher;
pub use prompts::{
    format_excerpt, format_rank_excerpts_prompt, format_sections, format_user_message,
    SourceSection, RANK_EXCERPTS_PROMPT, SYSTEM_PROMPT,
};
pub use ranking::rank_excerpts;
pub use retry::{complete_json_with_retry, parse_json, run_query_with_retry};
pub use stream::{step, substitute_chunks, substitute_stream, MarkerSubstitutionStream, Step};
