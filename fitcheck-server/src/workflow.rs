//! Session workflow: the upload → query → report state machine.
//!
//! States run forward only:
//!
//! ```text
//! AwaitingUpload → Ingesting → Indexing → AwaitingQuery → Synthesizing → Reported
//!                      │           │            │
//!                      └───────────┴→ IngestFailed   └→ NoResults
//! ```
//!
//! A fresh upload restarts the machine from any state. Questions are accepted
//! in `AwaitingQuery`, `NoResults` and `Reported`, so one upload can serve
//! several questions. Every external capability comes in through `Pipeline`;
//! a session holds no process-wide state.
//!
//! Records are stamped with the session id and an id for the upload that
//! produced them. Searches only see the session's latest upload, and a new
//! upload first deletes the session's older records.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fitcheck_core::config::RetrievalConfig;
use fitcheck_core::{
    AnswerSynthesizer, EmbeddingBackend, MetadataFilter, SearchHit, SourceRow, StoreError,
    SynthesisError, SynthesizedAnswer, UploadScope, VectorStore,
};
use fitcheck_ingest::{parse_workbook, IngestionError, RecordBuilder, RecordError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::report::{Report, ReportEmitter, ReportError};

pub const NO_RESULTS_MESSAGE: &str = "No relevant results found.";

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Records(#[from] RecordError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("Cannot {event} while session is {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

/// Capabilities shared by every session.
pub struct Pipeline {
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub store: Arc<dyn VectorStore>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
    pub reports: ReportEmitter,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    AwaitingUpload,
    Ingesting {
        filename: String,
    },
    Indexing {
        rows: usize,
    },
    AwaitingQuery {
        records: usize,
    },
    Synthesizing {
        question: String,
    },
    Reported {
        question: String,
        answer: SynthesizedAnswer,
        sources: Vec<SearchHit>,
        report_path: PathBuf,
    },
    IngestFailed {
        reason: String,
    },
    NoResults {
        question: String,
        message: &'static str,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingUpload => "awaiting_upload",
            SessionState::Ingesting { .. } => "ingesting",
            SessionState::Indexing { .. } => "indexing",
            SessionState::AwaitingQuery { .. } => "awaiting_query",
            SessionState::Synthesizing { .. } => "synthesizing",
            SessionState::Reported { .. } => "reported",
            SessionState::IngestFailed { .. } => "ingest_failed",
            SessionState::NoResults { .. } => "no_results",
        }
    }

    fn accepts_question(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingQuery { .. }
                | SessionState::NoResults { .. }
                | SessionState::Reported { .. }
        )
    }
}

/// A question plus optional search knobs.
#[derive(Debug, Clone, Default)]
pub struct Question {
    pub text: String,
    pub limit: Option<u32>,
    pub filter: MetadataFilter,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: SessionState,
    records_indexed: usize,
    scope: Option<UploadScope>,
    report: Option<Report>,
    pipeline: Arc<Pipeline>,
}

impl Session {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            state: SessionState::AwaitingUpload,
            records_indexed: 0,
            scope: None,
            report: None,
            pipeline,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The most recent report, if the last question produced one.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            session = %self.id,
            from = self.state.name(),
            to = next.name(),
            "Session transition"
        );
        self.state = next;
    }

    fn fail_ingest(&mut self, reason: String) {
        self.records_indexed = 0;
        self.scope = None;
        self.transition(SessionState::IngestFailed { reason });
    }

    /// Parse an uploaded spreadsheet, embed every row and store the records.
    pub async fn upload(
        &mut self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<&SessionState, WorkflowError> {
        self.report = None;
        self.transition(SessionState::Ingesting {
            filename: filename.to_string(),
        });

        // Decoding a workbook is CPU-bound; run it on the blocking pool.
        let name = filename.to_string();
        let parsed = tokio::task::spawn_blocking(move || parse_workbook(&bytes, &name)).await;
        let rows = match parsed {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                tracing::warn!(session = %self.id, filename = %filename, error = %e, "Upload rejected");
                self.fail_ingest(e.to_string());
                return Err(e.into());
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Spreadsheet parsing task failed");
                self.fail_ingest(e.to_string());
                return Err(e.into());
            }
        };

        self.index_rows(rows).await
    }

    /// Same as `upload`, starting from already-parsed rows.
    pub async fn ingest_rows(&mut self, rows: Vec<SourceRow>) -> Result<&SessionState, WorkflowError> {
        self.report = None;
        self.transition(SessionState::Ingesting {
            filename: String::new(),
        });
        self.index_rows(rows).await
    }

    async fn index_rows(&mut self, rows: Vec<SourceRow>) -> Result<&SessionState, WorkflowError> {
        self.transition(SessionState::Indexing { rows: rows.len() });

        let scope = UploadScope::new(self.id);
        match self.build_and_store(&rows, scope).await {
            Ok(count) => {
                self.records_indexed = count;
                self.scope = Some(scope);
                tracing::info!(session = %self.id, records = count, "Data insertion complete");
                self.transition(SessionState::AwaitingQuery { records: count });
                Ok(&self.state)
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Indexing failed");
                self.fail_ingest(e.to_string());
                Err(e)
            }
        }
    }

    async fn build_and_store(
        &self,
        rows: &[SourceRow],
        scope: UploadScope,
    ) -> Result<usize, WorkflowError> {
        let mut builder = RecordBuilder::new(self.pipeline.embedder.clone()).with_scope(scope);
        let records = builder.build_all(rows).await?;

        let store = &self.pipeline.store;
        store.create_tables().await?;
        store.create_index().await?;
        let removed = store.remove_session(self.id).await?;
        if removed > 0 {
            tracing::debug!(session = %self.id, removed, "Dropped records from earlier upload");
        }
        store.upsert(&records).await?;
        Ok(records.len())
    }

    /// Retrieve context for `question`, synthesize an answer and render the report.
    pub async fn submit_question(
        &mut self,
        question: Question,
    ) -> Result<&SessionState, WorkflowError> {
        let text = question.text.trim().to_string();
        if text.is_empty() {
            return Err(WorkflowError::EmptyQuestion);
        }
        if !self.state.accepts_question() {
            return Err(WorkflowError::InvalidTransition {
                state: self.state.name(),
                event: "submit a question",
            });
        }

        self.report = None;
        self.transition(SessionState::Synthesizing {
            question: text.clone(),
        });

        match self.answer(&text, &question).await {
            Ok(Some((answer, sources, report))) => {
                let report_path = report.path.clone();
                self.report = Some(report);
                self.transition(SessionState::Reported {
                    question: text,
                    answer,
                    sources,
                    report_path,
                });
            }
            Ok(None) => {
                tracing::info!(session = %self.id, question = %text, "No relevant results");
                self.transition(SessionState::NoResults {
                    question: text,
                    message: NO_RESULTS_MESSAGE,
                });
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Question failed");
                self.transition(SessionState::AwaitingQuery {
                    records: self.records_indexed,
                });
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    async fn answer(
        &self,
        text: &str,
        question: &Question,
    ) -> Result<Option<(SynthesizedAnswer, Vec<SearchHit>, Report)>, WorkflowError> {
        let Some(scope) = self.scope else {
            return Ok(None);
        };
        let limit = self.pipeline.retrieval.clamp_limit(question.limit);
        let filter = question.filter.clone().scoped(scope);
        let hits = self.pipeline.store.search(text, limit, &filter).await?;
        tracing::info!(session = %self.id, hits = hits.len(), limit, "Search complete");

        if hits.is_empty() {
            return Ok(None);
        }

        let answer = self.pipeline.synthesizer.synthesize(text, &hits).await?;
        let report = self.pipeline.reports.emit(self.id, &answer).await?;
        Ok(Some((answer, hits, report)))
    }
}
