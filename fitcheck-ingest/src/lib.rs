//! Upload-side half of the pipeline: spreadsheet bytes in, embedded records out.

pub mod records;
pub mod spreadsheet;

pub use records::{build_content, RecordBuilder, RecordError};
pub use spreadsheet::{parse_workbook, rows_from_range, IngestionError};
