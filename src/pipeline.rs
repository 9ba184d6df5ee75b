//! End-to-end orchestration: documents in, packaged test cases out.
//!
//! A [`Pipeline`] owns one [`Session`] and the configuration that drives
//! every stage:
//!
//! ```text
//! index_documents: load → chunk → embed → bind index to session
//! generate:        ask oracle → parse test cases → package → (run scripts)
//! ```
//!
//! Indexing is all-or-nothing: a failed upload leaves the previously bound
//! index and history in place. The most recent [`GenerationReport`] is kept
//! so frontends can serve its downloads.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::cases::parse_test_cases;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineResult;
use crate::index::VectorIndex;
use crate::loader::load_documents;
use crate::models::{TestCaseRecord, UploadedDocument};
use crate::oracle::{create_oracle, Oracle};
use crate::package::{package_records, PackageReport};
use crate::prompt::{GenerationCount, PromptTemplate};
use crate::runner::{run_scripts, ScriptRun};
use crate::session::{Session, SessionOptions};

/// Outcome of indexing an upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub documents: usize,
    pub characters: usize,
    pub chunks: usize,
    pub dims: usize,
    pub model: String,
}

/// Outcome of one generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    /// 1-based sequence number of the question within the session.
    pub query_seq: u64,
    pub story: String,
    pub answer: String,
    pub cases: Vec<TestCaseRecord>,
    /// `None` when the answer contained no test cases.
    pub package: Option<PackageReport>,
    pub runs: Vec<ScriptRun>,
}

pub struct Pipeline {
    config: Config,
    session: Session,
    run_scripts: bool,
    last_report: Option<GenerationReport>,
}

impl Pipeline {
    /// Builds the embedder and oracle named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let oracle = create_oracle(&config.oracle)?;
        Self::new(config, embedder, oracle).context("Failed to load prompt template")
    }

    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        oracle: Arc<dyn Oracle>,
    ) -> PipelineResult<Self> {
        let template = match &config.generation.template_path {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };
        let options = SessionOptions {
            top_k: config.retrieval.top_k,
            condense_question: config.retrieval.condense_question,
        };
        let session = Session::new(embedder, oracle, template, options);
        Ok(Self {
            run_scripts: config.execution.enabled,
            config,
            session,
            last_report: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Overrides `execution.enabled` for this pipeline.
    pub fn set_run_scripts(&mut self, enabled: bool) {
        self.run_scripts = enabled;
    }

    pub fn last_report(&self) -> Option<&GenerationReport> {
        self.last_report.as_ref()
    }

    /// Loads, chunks, and embeds `docs`, then binds the new index to the
    /// session. Any failure leaves the current index untouched.
    pub async fn index_documents(&mut self, docs: &[UploadedDocument]) -> PipelineResult<IndexSummary> {
        let text = load_documents(docs, &self.config.loader.markers)?;
        let chunks = chunk_text(&text, &self.config.chunking);
        let index = VectorIndex::build(
            chunks,
            self.session.embedder().as_ref(),
            self.config.embedding.batch_size,
            self.config.embedding.dims,
        )
        .await?;

        let summary = IndexSummary {
            documents: docs.len(),
            characters: text.chars().count(),
            chunks: index.len(),
            dims: index.dims(),
            model: index.model().to_string(),
        };
        self.session.bind(index);
        self.last_report = None;

        info!(
            documents = summary.documents,
            chunks = summary.chunks,
            "documents indexed"
        );
        Ok(summary)
    }

    /// Asks for test cases for `story` and packages whatever comes back.
    ///
    /// `count` falls back to `generation.default_count`; with neither set
    /// the oracle is asked for all possible cases. An answer without any
    /// recognisable test case is not an error: the report simply has no
    /// cases and no package.
    pub async fn generate(&mut self, story: &str, count: Option<u8>) -> PipelineResult<GenerationReport> {
        let count = count
            .or(self.config.generation.default_count)
            .map(GenerationCount::try_from)
            .transpose()?;

        let (answer, _) = self.session.ask(story, count).await?;
        let query_seq = self.session.queries_asked();
        let cases = parse_test_cases(&answer, self.config.extraction.require_script);
        info!(query_seq, cases = cases.len(), "extracted test cases");

        let package = if cases.is_empty() {
            None
        } else {
            Some(package_records(story, &cases, &self.config.output, query_seq))
        };

        let runs = match (&package, self.run_scripts) {
            (Some(package), true) => run_scripts(&package.scripts, &self.config.execution).await,
            _ => Vec::new(),
        };

        let report = GenerationReport {
            query_seq,
            story: story.trim().to_string(),
            answer,
            cases,
            package,
            runs,
        };
        self.last_report = Some(report.clone());
        Ok(report)
    }
}
