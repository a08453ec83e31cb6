//! Text extraction from uploaded documents.

use crate::media::document_mime;
use crate::spreadsheet::{read_csv, read_workbook, Table};
use std::path::Path;
use thiserror::Error;

/// An uploaded file as delivered by the surface.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    /// Declared MIME type, if the surface sent one.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.map(str::to_string),
            bytes,
        }
    }

    /// Read a file from disk; the MIME type is left to extension inference.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, None, bytes))
    }

    /// Declared type, unless it is missing or generic, in which case the
    /// extension decides.
    pub fn resolved_mime(&self) -> Option<String> {
        let declared = self
            .mime
            .as_deref()
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty() && m != "application/octet-stream");
        declared.or_else(|| document_mime(&self.name).map(str::to_string))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Workbook,
    Csv,
    Text,
}

impl DocumentKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let kind = match mime {
            "application/pdf" => DocumentKind::Pdf,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet" => DocumentKind::Workbook,
            "text/csv" => DocumentKind::Csv,
            "text/plain" | "text/markdown" => DocumentKind::Text,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{name}: unsupported file type ({mime})")]
    Unsupported { name: String, mime: String },

    #[error("{name}: could not read PDF: {reason}")]
    Pdf { name: String, reason: String },

    #[error("{name}: no extractable text (the PDF may be scanned images)")]
    NoText { name: String },

    #[error("{name}: could not read spreadsheet: {reason}")]
    Spreadsheet { name: String, reason: String },

    #[error("{name}: spreadsheet has no data")]
    EmptySpreadsheet { name: String },

    #[error("{name}: text is not valid UTF-8")]
    Encoding { name: String },
}

impl ExtractionError {
    pub fn file_name(&self) -> &str {
        match self {
            ExtractionError::Unsupported { name, .. }
            | ExtractionError::Pdf { name, .. }
            | ExtractionError::NoText { name }
            | ExtractionError::Spreadsheet { name, .. }
            | ExtractionError::EmptySpreadsheet { name }
            | ExtractionError::Encoding { name } => name,
        }
    }
}

/// What an upload turned into.
#[derive(Debug, Clone)]
pub enum Extracted {
    Text(String),
    Tables(Vec<Table>),
}

pub fn extract(upload: &Upload) -> Result<Extracted, ExtractionError> {
    let name = upload.name.clone();
    let mime = upload.resolved_mime().unwrap_or_else(|| "unknown".to_string());
    let kind = DocumentKind::from_mime(&mime).ok_or_else(|| ExtractionError::Unsupported {
        name: name.clone(),
        mime: mime.clone(),
    })?;
    tracing::debug!(file = %name, mime = %mime, bytes = upload.bytes.len(), "extracting document");

    match kind {
        DocumentKind::Pdf => extract_pdf(&name, &upload.bytes).map(Extracted::Text),
        DocumentKind::Text => {
            let text = String::from_utf8(upload.bytes.clone())
                .map_err(|_| ExtractionError::Encoding { name: name.clone() })?;
            if text.trim().is_empty() {
                return Err(ExtractionError::NoText { name });
            }
            Ok(Extracted::Text(text))
        }
        DocumentKind::Workbook => {
            let tables = read_workbook(&name, &upload.bytes).map_err(|e| ExtractionError::Spreadsheet {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            if tables.is_empty() {
                return Err(ExtractionError::EmptySpreadsheet { name });
            }
            Ok(Extracted::Tables(tables))
        }
        DocumentKind::Csv => {
            let table = read_csv(&name, &upload.bytes).map_err(|e| ExtractionError::Spreadsheet {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            table
                .map(|t| Extracted::Tables(vec![t]))
                .ok_or(ExtractionError::EmptySpreadsheet { name })
        }
    }
}

/// Page texts joined, each followed by a newline.
fn extract_pdf(name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed files
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractionError::Pdf {
            name: name.to_string(),
            reason: "parser aborted on malformed document".to_string(),
        })?
        .map_err(|e| ExtractionError::Pdf {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    let mut text = String::new();
    for page in &pages {
        text.push_str(page);
        text.push('\n');
    }
    if text.trim().is_empty() {
        return Err(ExtractionError::NoText {
            name: name.to_string(),
        });
    }
    Ok(text)
}
