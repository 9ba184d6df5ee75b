//! Retrieval-augmented question answering with conversation memory.
//!
//! A [`Session`] owns the running exchange history and is bound to at most
//! one [`VectorIndex`]. Each [`Session::ask`] retrieves context for the
//! query, renders the system template, and sends it to the oracle together
//! with the whole history. The exchange is recorded only after the oracle
//! answers, so a failed call leaves the session exactly as it was.
//!
//! `ask` takes `&mut self`: a session serves one question at a time.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{PipelineError, PipelineResult};
use crate::index::VectorIndex;
use crate::models::{Exchange, ScoredChunk};
use crate::oracle::{ChatMessage, Oracle};
use crate::prompt::{condense_prompt, GenerationCount, PromptTemplate};

/// Retrieval knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub top_k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            condense_question: false,
        }
    }
}

pub struct Session {
    id: Uuid,
    index: Option<VectorIndex>,
    history: Vec<Exchange>,
    queries_asked: u64,
    embedder: Arc<dyn Embedder>,
    oracle: Arc<dyn Oracle>,
    template: PromptTemplate,
    options: SessionOptions,
    last_context: Vec<ScoredChunk>,
}

impl Session {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        oracle: Arc<dyn Oracle>,
        template: PromptTemplate,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: None,
            history: Vec::new(),
            queries_asked: 0,
            embedder,
            oracle,
            template,
            options,
            last_context: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Binds a freshly built index, discarding the previous one and the
    /// conversation that was held against it.
    pub fn bind(&mut self, index: VectorIndex) {
        info!(session = %self.id, chunks = index.len(), "session bound to new index");
        self.index = Some(index);
        self.history.clear();
        self.last_context.clear();
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    /// Number of successful questions over the session's lifetime. Not
    /// reset by [`Session::bind`], so it can namespace artifacts.
    pub fn queries_asked(&self) -> u64 {
        self.queries_asked
    }

    /// Context retrieved for the most recent successful question.
    pub fn last_context(&self) -> &[ScoredChunk] {
        &self.last_context
    }

    /// Asks one question against the bound index.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NoDocumentIndexed`] when no index is bound; the
    ///   oracle is not called.
    /// - [`PipelineError::EmptyQuery`] for a blank query.
    /// - [`PipelineError::Embedding`] / [`PipelineError::Oracle`] when an
    ///   upstream call fails; history is left untouched.
    pub async fn ask(
        &mut self,
        query: &str,
        count: Option<GenerationCount>,
    ) -> PipelineResult<(String, &[Exchange])> {
        let index = self.index.as_ref().ok_or(PipelineError::NoDocumentIndexed)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let retrieval_query = if self.options.condense_question && !self.history.is_empty() {
            let pairs: Vec<(String, String)> = self
                .history
                .iter()
                .map(|e| (e.query.clone(), e.answer.clone()))
                .collect();
            let standalone = self
                .oracle
                .complete(&[ChatMessage::user(condense_prompt(&pairs, query))])
                .await
                .map_err(PipelineError::oracle)?;
            debug!(session = %self.id, standalone = %standalone.trim(), "condensed follow-up question");
            standalone.trim().to_string()
        } else {
            query.to_string()
        };

        let context = index
            .retrieve(&retrieval_query, self.embedder.as_ref(), self.options.top_k)
            .await?;

        let messages = self.build_messages(&context, query, count);
        info!(
            session = %self.id,
            context_chunks = context.len(),
            history = self.history.len(),
            count = ?count.map(GenerationCount::get),
            "asking oracle"
        );

        let answer = self
            .oracle
            .complete(&messages)
            .await
            .map_err(PipelineError::oracle)?;

        self.history.push(Exchange {
            query: query.to_string(),
            answer: answer.clone(),
            asked_at: Utc::now(),
        });
        self.queries_asked += 1;
        self.last_context = context;

        Ok((answer, &self.history))
    }

    fn build_messages(
        &self,
        context: &[ScoredChunk],
        query: &str,
        count: Option<GenerationCount>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 2);
        messages.push(ChatMessage::system(
            self.template.render(context, query, count),
        ));
        for exchange in &self.history {
            messages.push(ChatMessage::user(exchange.query.clone()));
            messages.push(ChatMessage::assistant(exchange.answer.clone()));
        }
        messages.push(ChatMessage::user(query));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::config::ChunkingConfig;
    use crate::oracle::Role;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    /// Records every message list it receives and answers from a script.
    struct ScriptedOracle {
        answers: Mutex<Vec<Result<String, String>>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedOracle {
        fn new(answers: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            match self.answers.lock().unwrap().remove(0) {
                Ok(answer) => Ok(answer),
                Err(e) => Err(anyhow::anyhow!(e)),
            }
        }
    }

    async fn index() -> VectorIndex {
        let chunks = chunk_text(
            "SRS\nThe cart shall hold up to 50 items.\nCheckout requires login.\n",
            &ChunkingConfig {
                chunk_size: 40,
                chunk_overlap: 5,
                separator: '\n',
            },
        );
        VectorIndex::build(chunks, &ConstEmbedder, 16, None).await.unwrap()
    }

    fn session(oracle: Arc<ScriptedOracle>, options: SessionOptions) -> Session {
        Session::new(
            Arc::new(ConstEmbedder),
            oracle,
            PromptTemplate::default(),
            options,
        )
    }

    #[tokio::test]
    async fn ask_without_index_fails_without_calling_oracle() {
        let oracle = ScriptedOracle::new(vec![Ok("unused".into())]);
        let mut s = session(oracle.clone(), SessionOptions::default());
        let err = s.ask("As a shopper...", None).await.err().unwrap();
        assert!(matches!(err, PipelineError::NoDocumentIndexed));
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn ask_appends_history_and_sends_prior_turns() {
        let oracle = ScriptedOracle::new(vec![Ok("first".into()), Ok("second".into())]);
        let mut s = session(oracle.clone(), SessionOptions::default());
        s.bind(index().await);

        let (answer, history) = s.ask("story one", None).await.unwrap();
        assert_eq!(answer, "first");
        assert_eq!(history.len(), 1);

        let count = GenerationCount::try_from(2).unwrap();
        let (answer, history) = s.ask("story two", Some(count)).await.unwrap();
        assert_eq!(answer, "second");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "story one");

        let calls = oracle.calls();
        let second = &calls[1];
        assert_eq!(second[0].role, Role::System);
        assert!(second[0].content.contains("Generate 2 test cases"));
        assert!(second[0].content.contains("story two"));
        assert_eq!(second[1], ChatMessage::user("story one"));
        assert_eq!(second[2], ChatMessage::assistant("first"));
        assert_eq!(second[3], ChatMessage::user("story two"));
        assert_eq!(s.queries_asked(), 2);
    }

    #[tokio::test]
    async fn oracle_failure_leaves_history_untouched() {
        let oracle = ScriptedOracle::new(vec![Ok("first".into()), Err("quota exceeded".into())]);
        let mut s = session(oracle, SessionOptions::default());
        s.bind(index().await);
        s.ask("story one", None).await.unwrap();

        let err = s.ask("story two", None).await.err().unwrap();
        assert!(matches!(err, PipelineError::Oracle(ref m) if m.contains("quota")));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.queries_asked(), 1);
    }

    #[tokio::test]
    async fn blank_query_rejected() {
        let oracle = ScriptedOracle::new(vec![]);
        let mut s = session(oracle, SessionOptions::default());
        s.bind(index().await);
        let err = s.ask("   \n", None).await.err().unwrap();
        assert!(matches!(err, PipelineError::EmptyQuery));
    }

    #[tokio::test]
    async fn rebinding_resets_history() {
        let oracle = ScriptedOracle::new(vec![Ok("first".into())]);
        let mut s = session(oracle, SessionOptions::default());
        s.bind(index().await);
        s.ask("story one", None).await.unwrap();
        s.bind(index().await);
        assert!(s.history().is_empty());
        assert_eq!(s.queries_asked(), 1);
    }

    #[tokio::test]
    async fn condense_only_runs_with_history() {
        let oracle = ScriptedOracle::new(vec![
            Ok("first".into()),
            Ok("standalone admin story".into()),
            Ok("second".into()),
        ]);
        let options = SessionOptions {
            top_k: 2,
            condense_question: true,
        };
        let mut s = session(oracle.clone(), options);
        s.bind(index().await);
        s.ask("story one", None).await.unwrap();
        s.ask("and for admins?", None).await.unwrap();

        let calls = oracle.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].len(), 1);
        assert!(calls[1][0].content.contains("Follow Up Input: and for admins?"));
        assert_eq!(calls[2].last().unwrap(), &ChatMessage::user("and for admins?"));
        assert!(s.last_context().len() <= 2);
    }
}
