//! The session's cumulative document text.

use crate::documents::{extract, Extracted, ExtractionError, Upload};
use crate::spreadsheet::Table;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Table,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBlock {
    pub source: String,
    pub kind: BlockKind,
    pub text: String,
    pub added_at: DateTime<Utc>,
}

impl KnowledgeBlock {
    pub fn header(&self) -> String {
        match self.kind {
            BlockKind::Text => format!("=== DOCUMENT: {} ===", self.source),
            BlockKind::Table => format!("=== DOCUMENT: {} (Excel Table) ===", self.source),
        }
    }

    fn render(&self) -> String {
        format!("\n\n{}\n{}", self.header(), self.text)
    }
}

/// Outcome of one upload batch. A failing file never stops the others.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<String>,
    /// Sheets from spreadsheet uploads, for the session to retain.
    pub tables: Vec<Table>,
    pub failures: Vec<ExtractionError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered blocks; never reordered, only appended or cleared.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    blocks: Vec<KnowledgeBlock>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[KnowledgeBlock] {
        &self.blocks
    }

    pub fn add_text(&mut self, source: &str, text: &str) {
        self.push(source, BlockKind::Text, text.to_string());
    }

    /// One block per upload. Multi-sheet workbooks get a `### Sheet:` line
    /// ahead of each sheet.
    pub fn add_tables(&mut self, source: &str, tables: &[Table]) {
        let text = if tables.len() == 1 {
            tables[0].to_markdown()
        } else {
            tables
                .iter()
                .map(|t| format!("### Sheet: {}\n{}", t.name, t.to_markdown()))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        self.push(source, BlockKind::Table, text);
    }

    fn push(&mut self, source: &str, kind: BlockKind, text: String) {
        self.blocks.push(KnowledgeBlock {
            source: source.to_string(),
            kind,
            text,
            added_at: Utc::now(),
        });
    }

    /// Extract every upload and append the successes in upload order.
    pub fn ingest(&mut self, uploads: &[Upload]) -> IngestReport {
        let mut report = IngestReport::default();
        for upload in uploads {
            match extract(upload) {
                Ok(Extracted::Text(text)) => {
                    self.add_text(&upload.name, &text);
                    report.ingested.push(upload.name.clone());
                }
                Ok(Extracted::Tables(tables)) => {
                    self.add_tables(&upload.name, &tables);
                    report.ingested.push(upload.name.clone());
                    report.tables.extend(tables);
                }
                Err(e) => {
                    tracing::warn!(file = %upload.name, error = %e, "document extraction failed");
                    report.failures.push(e);
                }
            }
        }
        tracing::info!(
            ingested = report.ingested.len(),
            failed = report.failures.len(),
            words = self.word_count(),
            "knowledge base updated"
        );
        report
    }

    /// Concatenation of every block with its header.
    pub fn text(&self) -> String {
        self.blocks.iter().map(KnowledgeBlock::render).collect()
    }

    pub fn word_count(&self) -> usize {
        self.text().split_whitespace().count()
    }

    /// Source names in the order they were added; repeats are kept.
    pub fn sources(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.source.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
