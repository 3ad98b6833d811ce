//! Report emitter: renders a synthesized answer into a PDF.
//!
//! The document has no title. It holds one body paragraph with the answer
//! text, set in Helvetica and word-wrapped to the page width. A paragraph too
//! long for one page continues on the next. Each session writes to its own
//! directory, so sessions never overwrite each other's reports.

mod helvetica;

use std::path::{Path, PathBuf};

use fitcheck_core::config::ReportConfig;
use fitcheck_core::SynthesizedAnswer;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;
use uuid::Uuid;

pub use helvetica::{encode_win_ansi, text_width};

/// Name the report is offered under for download.
pub const REPORT_FILENAME: &str = "suitability_report.pdf";

const LINE_SPACING: f32 = 1.2;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build PDF: {0}")]
    Pdf(String),
}

/// A rendered report on disk.
#[derive(Debug, Clone)]
pub struct Report {
    pub path: PathBuf,
    pub filename: &'static str,
    pub bytes: Vec<u8>,
    /// Body text as laid out, one entry per line.
    pub lines: Vec<String>,
    pub pages: usize,
}

impl Report {
    /// Body text with line breaks folded back into spaces.
    pub fn body_text(&self) -> String {
        self.lines.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct ReportEmitter {
    config: ReportConfig,
}

impl ReportEmitter {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn session_dir(&self, session_id: Uuid) -> PathBuf {
        Path::new(&self.config.output_dir).join(session_id.to_string())
    }

    /// Render `answer` and write it to the session's report path, replacing any earlier report.
    pub async fn emit(
        &self,
        session_id: Uuid,
        answer: &SynthesizedAnswer,
    ) -> Result<Report, ReportError> {
        // Layout and PDF encoding are CPU-bound; keep them off the async workers.
        let emitter = self.clone();
        let text = answer.answer.clone();
        let (lines, pages, bytes) = tokio::task::spawn_blocking(move || emitter.layout(&text))
            .await
            .map_err(|e| ReportError::Pdf(format!("render task failed: {e}")))??;

        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(REPORT_FILENAME);
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            session = %session_id,
            path = %path.display(),
            pages,
            bytes = bytes.len(),
            "Report written"
        );

        Ok(Report {
            path,
            filename: REPORT_FILENAME,
            bytes,
            lines,
            pages,
        })
    }

    /// Wrap, paginate and render `text`. Returns the laid-out lines, the page count and the PDF bytes.
    pub fn layout(&self, text: &str) -> Result<(Vec<String>, usize, Vec<u8>), ReportError> {
        let lines = self.wrap(text);
        let pages = self.paginate(&lines);
        let page_count = pages.len();
        let bytes = self.render(&pages)?;
        Ok((lines, page_count, bytes))
    }

    /// Delete a session's report directory. Missing directories are fine.
    pub async fn discard(&self, session_id: Uuid) -> Result<(), ReportError> {
        match tokio::fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn text_area_width(&self) -> f32 {
        let (width, _) = self.config.page_size.dimensions_pt();
        (width - 2.0 * self.config.margin_pt).max(self.config.font_size)
    }

    fn lines_per_page(&self) -> usize {
        let (_, height) = self.config.page_size.dimensions_pt();
        let usable = height - 2.0 * self.config.margin_pt;
        let leading = self.config.font_size * LINE_SPACING;
        ((usable / leading).floor() as usize).max(1)
    }

    fn fits(&self, text: &str) -> bool {
        text_width(&encode_win_ansi(text), self.config.font_size) <= self.text_area_width()
    }

    /// Greedy word wrap. Whitespace runs collapse to single spaces, as in a
    /// flowed paragraph; words wider than a line are split by character.
    pub fn wrap(&self, text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if self.fits(&candidate) {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            if self.fits(word) {
                current = word.to_string();
            } else {
                for ch in word.chars() {
                    current.push(ch);
                    if !self.fits(&current) && current.chars().count() > 1 {
                        current.pop();
                        lines.push(std::mem::take(&mut current));
                        current.push(ch);
                    }
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    fn paginate<'a>(&self, lines: &'a [String]) -> Vec<&'a [String]> {
        if lines.is_empty() {
            return vec![lines];
        }
        lines.chunks(self.lines_per_page()).collect()
    }

    fn page_operations(&self, lines: &[String]) -> Vec<Operation> {
        let (_, height) = self.config.page_size.dimensions_pt();
        let font_size = self.config.font_size;
        let top = height - self.config.margin_pt - font_size;

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), font_size.into()]),
            Operation::new("TL", vec![(font_size * LINE_SPACING).into()]),
            Operation::new("Td", vec![self.config.margin_pt.into(), top.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
        operations
    }

    fn render(&self, pages: &[&[String]]) -> Result<Vec<u8>, ReportError> {
        let (width, height) = self.config.page_size.dimensions_pt();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for lines in pages {
            let content = Content {
                operations: self.page_operations(lines),
            };
            let encoded = content
                .encode()
                .map_err(|e| ReportError::Pdf(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        Ok(bytes)
    }
}
