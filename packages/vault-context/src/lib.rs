//! Retrieval-augmented synthesis over a personal note vault.
//!
//! A conversation lives inside a note: fenced `context` blocks hold the
//! user's turns, `> [!ai]` callouts hold the generated ones. Each cycle
//! re-reads the note, retrieves excerpts for the last source block, and
//! streams the model's answer back into the note.
//!
//! # Design Philosophy
//!
//! - The note is the conversation state; nothing is cached between cycles
//! - Block references never reach the model; short markers stand in for them
//! - The host provides the vault, queries, generation and output surface
//!
//! # Usage
//!
//! ```rust,ignore
//! use vault_context::{Aggregator, ContextConfig, ConversationDocument};
//! use tokio_util::sync::CancellationToken;
//!
//! let aggregator = Aggregator::new(vault, queries, generation, ContextConfig::default())?;
//! let document = ConversationDocument::new("Weekly review", note_text);
//! let outcome = aggregator
//!     .synthesize(&document, &sink, CancellationToken::new())
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Host capabilities (Vault, QueryRunner, GenerationSource, OutputSink)
//! - [`types`] - Notes, descriptors, excerpts, messages, configuration
//! - [`text`] - Pure text helpers (cleaning, embeds, windows, markers)
//! - [`strategies`] - The four extraction strategies and excerpt merging
//! - [`pipeline`] - Conversation parsing, dispatch, ranking, streaming
//! - [`sink`] - In-memory output sink
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod sink;
pub mod strategies;
pub mod testing;
pub mod text;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{ContextError, Result};
pub use traits::{
    generation::{FragmentStream, GenerationSource},
    query::{QueryHit, QueryRunner},
    sink::OutputSink,
    vault::Vault,
};
pub use types::{
    config::{ContextConfig, MarkerConfig, RankingConfig, RecencyConfig, RetryConfig, WindowConfig},
    descriptor::{StrategyDescriptor, StrategyKind},
    document::{Entity, NoteFile, NoteMetadata},
    excerpt::{Excerpt, Substitution, SubstitutionTable},
    message::{ConversationMessage, MessageMetadata, Role},
};

// Re-export strategies
pub use strategies::{
    ExtractionRequest, Extractor, QueryDriven, RecencyRanked, SingleReferrer, WholeFile,
};

// Re-export pipeline components
pub use pipeline::{
    Aggregator, ConversationDocument, ConversationGrammar, ExtractionDispatcher, SourceBlock,
    SynthesisOutcome, Turn,
};

pub use sink::BufferSink;
pub use text::markers::{MarkerGenerator, MarkerRegistry};

// Re-export testing utilities
pub use testing::{MockGeneration, MockQueryRunner, MockVault, RecordingSink};
