//! Testing utilities including mock implementations.
//!
//! These are useful for testing hosts that use the vault-context library
//! without a real vault, query engine, or language model.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::{ContextError, Result};
use crate::text::markers::MarkerGenerator;
use crate::traits::{
    generation::{FragmentStream, GenerationSource},
    query::{QueryHit, QueryRunner},
    sink::OutputSink,
    vault::Vault,
};
use crate::types::{
    descriptor::StrategyKind,
    document::{basename, NoteFile, NoteMetadata},
    message::ConversationMessage,
};

/// A fixed timestamp `days` days after 2024-01-01.
pub fn fixed_time(days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
}

/// Deterministic marker generator cycling through a fixed list.
#[derive(Debug, Clone)]
pub struct SequenceMarkers {
    tokens: Vec<String>,
    next: usize,
}

impl SequenceMarkers {
    pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl MarkerGenerator for SequenceMarkers {
    fn next_token(&mut self) -> String {
        if self.tokens.is_empty() {
            return "0".to_string();
        }
        let token = self.tokens[self.next % self.tokens.len()].clone();
        self.next += 1;
        token
    }
}

#[derive(Debug, Clone)]
struct StoredNote {
    content: String,
    modified: DateTime<Utc>,
}

/// An in-memory vault.
///
/// Links resolve by exact path, path without `.md`, or case-insensitive
/// basename. Metadata is derived with [`NoteMetadata::scan`].
#[derive(Default, Clone)]
pub struct MockVault {
    notes: Arc<RwLock<IndexMap<String, StoredNote>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<MockVaultCall>>>,
}

/// Record of a call made to the mock vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockVaultCall {
    Resolve { link: String },
    Read { path: String },
    Metadata { path: String },
}

impl MockVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a note.
    pub fn with_note(
        self,
        path: impl Into<String>,
        content: impl Into<String>,
        modified: DateTime<Utc>,
    ) -> Self {
        self.notes.write().unwrap().insert(
            path.into(),
            StoredNote {
                content: content.into(),
                modified,
            },
        );
        self
    }

    /// Make reads of `path` fail.
    pub fn with_failing_read(self, path: impl Into<String>) -> Self {
        self.failing.write().unwrap().insert(path.into());
        self
    }

    /// Delete a note after it may already have been resolved.
    pub fn remove(&self, path: &str) {
        self.notes.write().unwrap().shift_remove(path);
    }

    /// The note at `path` as a query hit, with tags and links from its content.
    pub fn hit(&self, path: &str) -> Option<QueryHit> {
        let notes = self.notes.read().unwrap();
        let note = notes.get(path)?;
        let metadata = NoteMetadata::scan(&note.content);

        let mut tags: Vec<String> = metadata.header_tags.clone();
        for tag in &metadata.tags {
            if !tags.contains(&tag.name) {
                tags.push(tag.name.clone());
            }
        }
        let mut links: Vec<String> = Vec::new();
        for link in &metadata.links {
            if !links.contains(&link.name) {
                links.push(link.name.clone());
            }
        }

        Some(
            QueryHit::new(path, note.modified)
                .with_tags(tags)
                .with_links(links),
        )
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockVaultCall> {
        self.calls.read().unwrap().clone()
    }

    fn record(&self, call: MockVaultCall) {
        self.calls.write().unwrap().push(call);
    }

    fn find(&self, link: &str) -> Option<NoteFile> {
        let notes = self.notes.read().unwrap();
        let link = link.trim();
        let with_ext = format!("{}.md", link);

        if let Some((path, note)) = notes
            .get_key_value(link)
            .or_else(|| notes.get_key_value(with_ext.as_str()))
        {
            return Some(NoteFile::new(path, note.modified));
        }

        notes
            .iter()
            .find(|(path, _)| basename(path).eq_ignore_ascii_case(basename(link)))
            .map(|(path, note)| NoteFile::new(path, note.modified))
    }
}

#[async_trait]
impl Vault for MockVault {
    async fn resolve(&self, link: &str) -> Result<Option<NoteFile>> {
        self.record(MockVaultCall::Resolve {
            link: link.to_string(),
        });
        Ok(self.find(link))
    }

    async fn read(&self, file: &NoteFile) -> Result<Option<String>> {
        self.record(MockVaultCall::Read {
            path: file.path.clone(),
        });
        if self.failing.read().unwrap().contains(&file.path) {
            return Err(ContextError::vault(format!("cannot read {}", file.path)));
        }
        Ok(self
            .notes
            .read()
            .unwrap()
            .get(&file.path)
            .map(|n| n.content.clone()))
    }

    async fn metadata(&self, file: &NoteFile) -> Result<NoteMetadata> {
        self.record(MockVaultCall::Metadata {
            path: file.path.clone(),
        });
        Ok(self
            .notes
            .read()
            .unwrap()
            .get(&file.path)
            .map(|n| NoteMetadata::scan(&n.content))
            .unwrap_or_default())
    }
}

/// Record of a query run against the mock runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockQueryCall {
    pub query: String,
    pub hint: Option<StrategyKind>,
}

/// A scriptable query engine.
#[derive(Default, Clone)]
pub struct MockQueryRunner {
    results: Arc<RwLock<HashMap<String, Vec<QueryHit>>>>,
    failures: Arc<RwLock<HashMap<String, u32>>>,
    calls: Arc<RwLock<Vec<MockQueryCall>>>,
}

impl MockQueryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits returned for `query`. Unknown queries return nothing.
    pub fn with_result(self, query: impl Into<String>, hits: Vec<QueryHit>) -> Self {
        self.results.write().unwrap().insert(query.into(), hits);
        self
    }

    /// Fail the next `times` runs of `query`.
    pub fn with_failures(self, query: impl Into<String>, times: u32) -> Self {
        self.failures.write().unwrap().insert(query.into(), times);
        self
    }

    pub fn calls(&self) -> Vec<MockQueryCall> {
        self.calls.read().unwrap().clone()
    }

    /// How many times `query` was run.
    pub fn call_count(&self, query: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.query == query)
            .count()
    }
}

#[async_trait]
impl QueryRunner for MockQueryRunner {
    async fn run(&self, query: &str, hint: Option<StrategyKind>) -> Result<Vec<QueryHit>> {
        self.calls.write().unwrap().push(MockQueryCall {
            query: query.to_string(),
            hint,
        });

        if let Some(remaining) = self.failures.write().unwrap().get_mut(query) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ContextError::Query {
                    query: query.to_string(),
                    source: "scripted failure".into(),
                });
            }
        }

        Ok(self
            .results
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

/// One scripted step of a mock generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFragment {
    Text(String),
    /// Transport failure mid-stream
    Fail(String),
    /// Never yields again
    Hang,
}

/// A scriptable generation source.
///
/// Each `generate` call consumes the next scripted stream; each `complete`
/// call consumes the next scripted completion, falling back to collecting a
/// stream when none is queued.
#[derive(Default, Clone)]
pub struct MockGeneration {
    streams: Arc<RwLock<VecDeque<Vec<MockFragment>>>>,
    completions: Arc<RwLock<VecDeque<String>>>,
    refuse: Arc<RwLock<Option<String>>>,
    requests: Arc<RwLock<Vec<Vec<ConversationMessage>>>>,
}

impl MockGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream yielding these fragments.
    pub fn with_fragments(self, fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.with_script(
            fragments
                .into_iter()
                .map(|f| MockFragment::Text(f.into()))
                .collect(),
        )
    }

    /// Queue an arbitrary stream script.
    pub fn with_script(self, script: Vec<MockFragment>) -> Self {
        self.streams.write().unwrap().push_back(script);
        self
    }

    /// Queue a non-streamed completion.
    pub fn with_completion(self, text: impl Into<String>) -> Self {
        self.completions.write().unwrap().push_back(text.into());
        self
    }

    /// Make every `generate` call fail before streaming.
    pub fn with_transport_error(self, message: impl Into<String>) -> Self {
        *self.refuse.write().unwrap() = Some(message.into());
        self
    }

    /// Message lists received, in call order.
    pub fn requests(&self) -> Vec<Vec<ConversationMessage>> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl GenerationSource for MockGeneration {
    async fn generate(&self, messages: &[ConversationMessage]) -> Result<FragmentStream> {
        self.requests.write().unwrap().push(messages.to_vec());

        if let Some(message) = self.refuse.read().unwrap().clone() {
            return Err(ContextError::generation(message));
        }

        let script = self.streams.write().unwrap().pop_front().unwrap_or_default();
        let mut items: Vec<Result<String>> = Vec::new();
        let mut hang = false;
        for step in script {
            match step {
                MockFragment::Text(text) => items.push(Ok(text)),
                MockFragment::Fail(message) => {
                    items.push(Err(ContextError::generation(message)));
                    break;
                }
                MockFragment::Hang => {
                    hang = true;
                    break;
                }
            }
        }

        let scripted = stream::iter(items);
        if hang {
            Ok(Box::pin(futures::StreamExt::chain(scripted, stream::pending())))
        } else {
            Ok(Box::pin(scripted))
        }
    }

    async fn complete(&self, messages: &[ConversationMessage]) -> Result<String> {
        let queued = self.completions.write().unwrap().pop_front();
        match queued {
            Some(text) => {
                self.requests.write().unwrap().push(messages.to_vec());
                Ok(text)
            }
            None => {
                let fragments: Vec<String> =
                    futures::TryStreamExt::try_collect(self.generate(messages).await?).await?;
                Ok(fragments.concat())
            }
        }
    }
}

/// Output sink recording everything it receives.
#[derive(Default, Clone)]
pub struct RecordingSink {
    appends: Arc<RwLock<Vec<String>>>,
    notices: Arc<RwLock<Vec<String>>>,
    placeholders: Arc<RwLock<Vec<bool>>>,
    fail_appends: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every append.
    pub fn failing() -> Self {
        Self {
            fail_appends: true,
            ..Default::default()
        }
    }

    pub fn appends(&self) -> Vec<String> {
        self.appends.read().unwrap().clone()
    }

    /// Everything appended, concatenated.
    pub fn text(&self) -> String {
        self.appends.read().unwrap().concat()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.read().unwrap().clone()
    }

    /// Placeholder visibility changes in order.
    pub fn placeholder_history(&self) -> Vec<bool> {
        self.placeholders.read().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn append(&self, text: &str) -> Result<()> {
        if self.fail_appends {
            return Err(ContextError::Sink("sink is read-only".into()));
        }
        self.appends.write().unwrap().push(text.to_string());
        Ok(())
    }

    async fn notify(&self, message: &str) {
        self.notices.write().unwrap().push(message.to_string());
    }

    async fn set_placeholder(&self, visible: bool) {
        self.placeholders.write().unwrap().push(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_sequence_markers_cycle() {
        let mut markers = SequenceMarkers::new(["a", "b"]);
        let drawn: Vec<String> = (0..3).map(|_| markers.next_token()).collect();
        assert_eq!(drawn, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_mock_vault_resolves_by_basename() {
        let vault = MockVault::new().with_note("People/Alpha.md", "hello", fixed_time(0));

        let by_name = vault.resolve("alpha").await.unwrap().unwrap();
        assert_eq!(by_name.path, "People/Alpha.md");
        assert!(vault.resolve("People/Alpha").await.unwrap().is_some());
        assert!(vault.resolve("Beta").await.unwrap().is_none());

        vault.remove("People/Alpha.md");
        assert_eq!(vault.read(&by_name).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_query_runner_scripted_failures() {
        let runner = MockQueryRunner::new()
            .with_result("LIST", vec![QueryHit::new("a.md", fixed_time(1))])
            .with_failures("LIST", 1);

        assert!(runner.run("LIST", None).await.is_err());
        assert_eq!(runner.run("LIST", None).await.unwrap().len(), 1);
        assert_eq!(runner.call_count("LIST"), 2);
    }

    #[tokio::test]
    async fn test_mock_generation_script() {
        let generation = MockGeneration::new().with_script(vec![
            MockFragment::Text("one".into()),
            MockFragment::Fail("reset".into()),
            MockFragment::Text("never".into()),
        ]);

        let items: Vec<Result<String>> = generation.generate(&[]).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
