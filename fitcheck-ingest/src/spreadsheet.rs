//! Spreadsheet → `SourceRow` parsing.
//!
//! Only the first worksheet is read. Its first row is the header. Columns are
//! matched by name (case and spacing ignored); anything unrecognized is
//! ignored and missing columns simply leave fields empty.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use fitcheck_core::SourceRow;
use thiserror::Error;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unsupported file type '{0}': upload an Excel or OpenDocument spreadsheet")]
    UnsupportedFormat(String),

    #[error("Could not read spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Spreadsheet has no worksheets")]
    NoWorksheet,

    #[error("Uploaded file is empty")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    JdName,
    JobDescription,
    Resume,
    QaText,
    Tag,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        let normalized = header
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        match normalized.as_str() {
            "JD NAME" => Some(Column::JdName),
            "JD" => Some(Column::JobDescription),
            "RESUME" => Some(Column::Resume),
            "Q AND A" | "Q&A" => Some(Column::QaText),
            "TAG" => Some(Column::Tag),
            _ => None,
        }
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        other => {
            let text = other.to_string();
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

/// Map a worksheet range onto rows. The first row is the header.
pub fn rows_from_range(range: &Range<Data>) -> Vec<SourceRow> {
    let mut rows = range.rows();
    let header = match rows.next() {
        Some(h) => h,
        None => return Vec::new(),
    };

    let columns: Vec<Option<Column>> = header
        .iter()
        .map(|cell| cell_text(cell).and_then(|h| Column::from_header(&h)))
        .collect();

    rows.filter_map(|cells| {
        if cells.iter().all(|c| cell_text(c).is_none()) {
            return None;
        }

        let mut row = SourceRow::default();
        for (cell, column) in cells.iter().zip(&columns) {
            let Some(column) = column else { continue };
            let slot = match column {
                Column::JdName => &mut row.jd_name,
                Column::JobDescription => &mut row.job_description,
                Column::Resume => &mut row.resume,
                Column::QaText => &mut row.qa_text,
                Column::Tag => &mut row.tag,
            };
            // first matching column wins on duplicate headers
            if slot.is_none() {
                *slot = cell_text(cell);
            }
        }
        Some(row)
    })
    .collect()
}

fn check_extension(filename: &str) -> Result<(), IngestionError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        // no extension: let calamine sniff the bytes
        None => Ok(()),
        Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(IngestionError::UnsupportedFormat(ext)),
    }
}

/// Parse uploaded spreadsheet bytes into rows, preserving row order.
pub fn parse_workbook(bytes: &[u8], filename: &str) -> Result<Vec<SourceRow>, IngestionError> {
    check_extension(filename)?;
    if bytes.is_empty() {
        return Err(IngestionError::Empty);
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(IngestionError::NoWorksheet)??;

    let rows = rows_from_range(&range);
    tracing::info!(filename = %filename, rows = rows.len(), "Parsed spreadsheet");
    Ok(rows)
}
