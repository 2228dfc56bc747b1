//! Aggregator - one full retrieval + generation cycle over a conversation note.
//!
//! 1. Re-parse the conversation note into turns
//! 2. Replay earlier turns; assistant turns get markers for their embeds
//! 3. Retrieve excerpts for the last source block, one section per descriptor
//! 4. Optionally let the model rank the excerpts
//! 5. Stream the generation through marker substitution into the sink
//!
//! Failures surface as one notice on the sink. Text already appended stays.

use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ContextError, Result};
use crate::pipeline::{
    conversation::{ConversationGrammar, SourceBlock, Turn},
    dispatch::ExtractionDispatcher,
    prompts::{format_user_message, SourceSection, SYSTEM_PROMPT},
    ranking::rank_excerpts,
    stream::substitute_stream,
};
use crate::strategies::ExtractionRequest;
use crate::text::markers::{to_markers, MarkerGenerator, MarkerRegistry};
use crate::traits::{
    generation::GenerationSource, query::QueryRunner, sink::OutputSink, vault::Vault,
};
use crate::types::{config::ContextConfig, excerpt::Excerpt, message::ConversationMessage};

type MarkerFactory = Box<dyn Fn() -> MarkerRegistry + Send + Sync>;

/// The conversation note being continued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDocument {
    /// Note title, used for block references inside assistant turns
    pub title: String,
    pub text: String,
}

impl ConversationDocument {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// What one synthesis produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOutcome {
    /// Excerpts sent to the model, in prompt order
    pub excerpts: Vec<Excerpt>,

    /// Appends made to the sink, the closing separator excluded
    pub fragments: usize,

    /// Stopped through the cancellation token
    pub cancelled: bool,
}

/// Wraps generated text in the assistant callout.
#[derive(Debug)]
struct CalloutWriter {
    separator: String,
    started: bool,
}

impl CalloutWriter {
    fn new(header: &str) -> Self {
        Self {
            separator: format!("\n\n{}\n> ", header),
            started: false,
        }
    }

    /// Text to append for one resolved fragment, `None` when empty.
    fn format(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        let quoted = fragment.replace('\n', "\n> ");
        if self.started {
            Some(quoted)
        } else {
            self.started = true;
            Some(format!("{}{}", self.separator, quoted))
        }
    }

    /// Closing text after a completed stream.
    fn finish(&self) -> Option<&'static str> {
        self.started.then_some("\n\n")
    }
}

/// Orchestrates retrieval and generation for a conversation note.
pub struct Aggregator {
    dispatcher: ExtractionDispatcher,
    generation: Arc<dyn GenerationSource>,
    config: ContextConfig,
    grammar: ConversationGrammar,
    markers: MarkerFactory,
}

impl Aggregator {
    /// Validates `config` and builds the default strategies.
    pub fn new(
        vault: Arc<dyn Vault>,
        queries: Arc<dyn QueryRunner>,
        generation: Arc<dyn GenerationSource>,
        config: ContextConfig,
    ) -> Result<Self> {
        config.validate()?;
        let dispatcher = ExtractionDispatcher::new(vault, queries, &config)?;
        Ok(Self::with_dispatcher(dispatcher, generation, config))
    }

    pub fn with_dispatcher(
        dispatcher: ExtractionDispatcher,
        generation: Arc<dyn GenerationSource>,
        config: ContextConfig,
    ) -> Self {
        let width = config.markers.width;
        let attempts = config.markers.max_attempts;
        Self {
            dispatcher,
            generation,
            grammar: ConversationGrammar::from_config(&config),
            config,
            markers: Box::new(move || MarkerRegistry::random(width, attempts)),
        }
    }

    /// Mint markers from a custom generator; one fresh generator per cycle.
    pub fn with_marker_generator<G, F>(mut self, make: F) -> Self
    where
        G: MarkerGenerator + 'static,
        F: Fn() -> G + Send + Sync + 'static,
    {
        let attempts = self.config.markers.max_attempts;
        self.markers = Box::new(move || MarkerRegistry::new(make(), attempts));
        self
    }

    fn system_prompt(&self) -> &str {
        self.config.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT)
    }

    /// Continue the conversation in `document`, appending the answer to `sink`.
    pub async fn synthesize(
        &self,
        document: &ConversationDocument,
        sink: &dyn OutputSink,
        cancel: CancellationToken,
    ) -> Result<SynthesisOutcome> {
        info!(title = %document.title, "Starting synthesis");
        sink.set_placeholder(true).await;
        let mut placeholder = true;

        let result = self.run(document, sink, &cancel, &mut placeholder).await;

        if placeholder {
            sink.set_placeholder(false).await;
        }

        match result {
            Ok(outcome) => {
                info!(
                    excerpt_count = outcome.excerpts.len(),
                    fragments = outcome.fragments,
                    cancelled = outcome.cancelled,
                    "Synthesis finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Synthesis failed");
                sink.notify(&e.notice()).await;
                Err(e)
            }
        }
    }

    /// Messages for the history before the last source block.
    pub fn replay(
        &self,
        document: &ConversationDocument,
        history: &[Turn],
        markers: &MarkerRegistry,
    ) -> Vec<ConversationMessage> {
        let mut messages = vec![ConversationMessage::system(self.system_prompt())];
        for turn in history {
            match turn {
                Turn::User(block) => messages.push(ConversationMessage::user(
                    &block.prompt,
                    block.descriptors.clone(),
                    &block.prompt,
                )),
                Turn::Assistant(text) => {
                    let marked = to_markers(&document.title, text, markers);
                    messages.push(ConversationMessage::assistant(
                        marked.text,
                        marked.substitutions,
                    ));
                }
            }
        }
        messages
    }

    /// One section per descriptor, in descriptor order.
    pub async fn retrieve(
        &self,
        block: &SourceBlock,
        markers: Arc<MarkerRegistry>,
    ) -> Result<Vec<SourceSection>> {
        let requests: Vec<ExtractionRequest> = block
            .descriptors
            .iter()
            .map(|d| ExtractionRequest::new(d.clone(), markers.clone()))
            .collect();

        let results = join_all(requests.iter().map(|r| self.dispatcher.extract(r))).await;

        requests
            .iter()
            .zip(results)
            .map(|(request, excerpts)| {
                Ok(SourceSection {
                    preamble: request.descriptor.source_preamble.clone(),
                    excerpts: excerpts?,
                })
            })
            .collect()
    }

    async fn rank(&self, sections: Vec<SourceSection>, guidance: &str) -> Result<Vec<SourceSection>> {
        let total: usize = sections.iter().map(|s| s.excerpts.len()).sum();
        let Some(ranking) = self.config.ranking.as_ref().filter(|r| total > r.threshold) else {
            return Ok(sections);
        };

        debug!(total = total, threshold = ranking.threshold, "Ranking excerpts");
        let preambles: Vec<String> = sections.iter().filter_map(|s| s.preamble.clone()).collect();
        let excerpts: Vec<Excerpt> = sections.into_iter().flat_map(|s| s.excerpts).collect();

        let kept = rank_excerpts(
            self.generation.as_ref(),
            excerpts,
            guidance,
            ranking.threshold,
            self.config.retry.json_attempts,
        )
        .await?;

        Ok(vec![SourceSection {
            preamble: (!preambles.is_empty()).then(|| preambles.join("\n")),
            excerpts: kept,
        }])
    }

    async fn run(
        &self,
        document: &ConversationDocument,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
        placeholder: &mut bool,
    ) -> Result<SynthesisOutcome> {
        let turns = self.grammar.parse(&document.text);
        let (history, block) = split_last_user(&turns)
            .ok_or_else(|| ContextError::invalid("the note has no source block"))?;

        let markers = Arc::new((self.markers)());
        let mut messages = self.replay(document, history, &markers);

        let sections = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(Vec::new(), 0)),
            sections = self.retrieve(block, markers.clone()) => sections?,
        };
        let sections = self.rank(sections, &block.prompt).await?;
        let excerpts: Vec<Excerpt> = sections.iter().flat_map(|s| s.excerpts.clone()).collect();

        messages.push(ConversationMessage::user(
            format_user_message(&block.prompt, &sections),
            block.descriptors.clone(),
            &block.prompt,
        ));

        let table = markers.table();
        debug!(
            message_count = messages.len(),
            marker_count = table.len(),
            "Starting generation"
        );

        let fragments = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(excerpts, 0)),
            fragments = self.generation.generate(&messages) => fragments?,
        };

        let mut resolved = Box::pin(substitute_stream(fragments, table));
        let mut writer = CalloutWriter::new(&self.grammar.callout_header());
        let mut appended = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(fragments = appended, "Generation cancelled");
                    return Ok(cancelled(excerpts, appended));
                }
                next = resolved.next() => next,
            };

            match next {
                Some(Ok(text)) => {
                    let Some(out) = writer.format(&text) else {
                        continue;
                    };
                    if *placeholder {
                        sink.set_placeholder(false).await;
                        *placeholder = false;
                    }
                    sink.append(&out).await?;
                    appended += 1;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        if let Some(closing) = writer.finish() {
            sink.append(closing).await?;
        }

        Ok(SynthesisOutcome {
            excerpts,
            fragments: appended,
            cancelled: false,
        })
    }
}

fn cancelled(excerpts: Vec<Excerpt>, fragments: usize) -> SynthesisOutcome {
    SynthesisOutcome {
        excerpts,
        fragments,
        cancelled: true,
    }
}

/// Turns before the last source block, and that block.
fn split_last_user(turns: &[Turn]) -> Option<(&[Turn], &SourceBlock)> {
    turns.iter().enumerate().rev().find_map(|(i, turn)| match turn {
        Turn::User(block) => Some((&turns[..i], block)),
        Turn::Assistant(_) => None,
    })
}
