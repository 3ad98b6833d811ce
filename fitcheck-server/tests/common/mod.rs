//! Shared fixtures: an in-memory pipeline with counting stubs.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fitcheck_core::config::{ReportConfig, RetrievalConfig};
use fitcheck_core::{
    AnswerSynthesizer, EmbeddingBackend, EmbeddingError, MemoryVectorStore, MetadataFilter,
    Record, SearchHit, SourceRow, StoreError, SynthesisError, SynthesizedAnswer, VectorStore,
};
use fitcheck_server::report::ReportEmitter;
use fitcheck_server::workflow::Pipeline;
use uuid::Uuid;

const VOCAB: [&str; 8] = [
    "engineer", "build", "systems", "experience", "qualified", "candidate", "nurse", "pass",
];

/// Bag-of-words over a tiny vocabulary plus a bias term. Counts calls.
#[derive(Default)]
pub struct VocabEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingBackend for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
            .collect();
        v.push(0.1);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        VOCAB.len() + 1
    }

    fn name(&self) -> &str {
        "vocab"
    }
}

/// Memory store that records the size of every upsert batch.
pub struct RecordingStore {
    inner: MemoryVectorStore,
    pub upserts: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            inner: MemoryVectorStore::new(embedder, None),
            upserts: Mutex::new(Vec::new()),
        }
    }

    pub fn upsert_batches(&self) -> Vec<usize> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn create_tables(&self) -> Result<(), StoreError> {
        self.inner.create_tables().await
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        self.inner.create_index().await
    }

    async fn upsert(&self, records: &[Record]) -> Result<(), StoreError> {
        self.upserts.lock().unwrap().push(records.len());
        self.inner.upsert(records).await
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.inner.search(query, limit, filter).await
    }

    async fn remove_session(&self, session_id: Uuid) -> Result<u64, StoreError> {
        self.inner.remove_session(session_id).await
    }

    async fn health(&self) -> Result<String, StoreError> {
        self.inner.health().await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Answers with a fixed sentence naming the question and hit count.
#[derive(Default)]
pub struct StubSynthesizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AnswerSynthesizer for StubSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        context: &[SearchHit],
    ) -> Result<SynthesizedAnswer, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SynthesizedAnswer {
            thought_process: vec![format!("Reviewed {} records", context.len())],
            answer: format!(
                "Based on {} records the answer to \"{}\" is yes.",
                context.len(),
                question
            ),
            enough_context: true,
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub struct Fixture {
    pub pipeline: Arc<Pipeline>,
    pub embedder: Arc<VocabEmbedder>,
    pub store: Arc<RecordingStore>,
    pub synthesizer: Arc<StubSynthesizer>,
}

pub fn fixture(report_dir: &Path) -> Fixture {
    let embedder = Arc::new(VocabEmbedder::default());
    let store = Arc::new(RecordingStore::new(embedder.clone()));
    let synthesizer = Arc::new(StubSynthesizer::default());
    let pipeline = Arc::new(Pipeline {
        embedder: embedder.clone(),
        store: store.clone(),
        synthesizer: synthesizer.clone(),
        reports: ReportEmitter::new(ReportConfig {
            output_dir: report_dir.to_string_lossy().into_owned(),
            ..Default::default()
        }),
        retrieval: RetrievalConfig::default(),
    });
    Fixture {
        pipeline,
        embedder,
        store,
        synthesizer,
    }
}

pub fn engineer_row() -> SourceRow {
    SourceRow {
        jd_name: Some("Engineer".into()),
        job_description: Some("Build systems".into()),
        resume: Some("5 years experience".into()),
        qa_text: Some("Q: ok? A: yes".into()),
        tag: Some("Pass".into()),
    }
}

const HEADER: [&str; 5] = ["JD NAME", "JD", "RESUME", "Q AND A", "TAG"];

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn sheet_xml(rows: &[[&str; 5]]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, cells) in std::iter::once(&HEADER).chain(rows).enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, text) in cells.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let col = (b'A' + c as u8) as char;
            xml.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                col,
                r + 1,
                escape_xml(text)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// A one-sheet .xlsx workbook with the standard header row followed by `rows`.
pub fn xlsx(rows: &[[&str; 5]]) -> Vec<u8> {
    let parts: [(&str, String); 5] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, body) in parts.iter() {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// The two-row upload: an engineer who passed and a nurse who did not.
pub fn two_candidate_xlsx() -> Vec<u8> {
    xlsx(&[
        ["Engineer", "Build systems", "5 years experience", "Q: ok? A: yes", "Pass"],
        ["Nurse", "Patient care", "2 years on a ward", "Q: shifts? A: nights", "Fail"],
    ])
}
