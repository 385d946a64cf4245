//! Paragraph input records
//!
//! Paragraphs arrive already extracted and filtered to rule-bearing text, one
//! JSON object per line:
//!
//! ```json
//! {"doc_id": "NSG-2019-004", "locator": "§ 4 Abs. 2", "text": "..."}
//! ```

use enumdiff_common::text::collapse_whitespace;
use enumdiff_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// One rule-bearing paragraph of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphRecord {
    /// Source document identifier
    pub doc_id: String,
    /// Paragraph or citation locator within the document
    #[serde(alias = "para_id")]
    pub locator: String,
    /// Paragraph text
    pub text: String,
}

impl ParagraphRecord {
    pub fn new(
        doc_id: impl Into<String>,
        locator: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            locator: locator.into(),
            text: text.into(),
        }
    }

    /// Text with whitespace runs collapsed; the form that is fingerprinted
    /// and sent to the analysis service
    pub fn normalized_text(&self) -> String {
        collapse_whitespace(&self.text)
    }
}

/// Read paragraph records from a JSON Lines file
///
/// Blank lines are skipped. Records with empty text are skipped with a
/// warning. A line that does not parse fails the whole read, naming the line.
pub fn read_paragraphs(path: &Path) -> Result<Vec<ParagraphRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::InvalidInput(format!("Open {} failed: {}", path.display(), e)))?;
    parse_paragraphs(std::io::BufReader::new(file))
}

/// Parse paragraph records from any JSON Lines reader
pub fn parse_paragraphs<R: BufRead>(reader: R) -> Result<Vec<ParagraphRecord>> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: ParagraphRecord = serde_json::from_str(&line).map_err(|e| {
            Error::InvalidInput(format!("Paragraph line {}: {}", line_no, e))
        })?;

        if record.text.trim().is_empty() {
            tracing::warn!(
                line = line_no,
                doc_id = %record.doc_id,
                locator = %record.locator,
                "Skipping paragraph with empty text"
            );
            continue;
        }

        records.push(record);
    }

    Ok(records)
}
