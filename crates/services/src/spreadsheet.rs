//! Spreadsheet sheets kept as tables, with markdown and plain-text flattening.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::io::Cursor;

/// One sheet. The first non-empty row of the sheet is the header row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Sheet name, or the file stem for CSV uploads.
    pub name: String,
    /// Upload the sheet came from.
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    /// Non-empty cells.
    pub count: usize,
    pub numeric_count: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Table {
    /// Build a table from raw rows. Blank rows are dropped and short rows are
    /// padded so every row has one cell per header. Returns `None` when
    /// nothing but blank rows was given.
    pub fn from_rows(name: &str, source: &str, rows: Vec<Vec<String>>) -> Option<Self> {
        let mut rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.trim().to_string()).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| !c.is_empty()));

        let mut headers = rows.next()?;
        let mut rows: Vec<Vec<String>> = rows.collect();

        let width = rows.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
        for i in headers.len()..width {
            headers.push(format!("Column {}", i + 1));
        }
        for (i, h) in headers.iter_mut().enumerate() {
            if h.is_empty() {
                *h = format!("Column {}", i + 1);
            }
        }
        for row in rows.iter_mut() {
            row.resize(width, String::new());
        }

        Some(Self {
            name: name.to_string(),
            source: source.to_string(),
            headers,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// GitHub-style table; every column is padded to its widest cell.
    pub fn to_markdown(&self) -> String {
        let headers: Vec<String> = self.headers.iter().map(|h| escape_cell(h)).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|c| escape_cell(c)).collect())
            .collect();

        let widths: Vec<usize> = (0..headers.len())
            .map(|i| {
                rows.iter()
                    .map(|r| r[i].chars().count())
                    .chain([headers[i].chars().count(), 3])
                    .max()
                    .unwrap_or(3)
            })
            .collect();

        let render = |cells: &[String]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{}{}", c, " ".repeat(w - c.chars().count())))
                .collect();
            format!("| {} |", padded.join(" | "))
        };

        let mut lines = Vec::with_capacity(rows.len() + 2);
        lines.push(render(&headers));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        lines.push(format!("|-{}-|", rule.join("-|-")));
        for row in &rows {
            lines.push(render(row));
        }
        lines.join("\n")
    }

    /// Header line then one line per row, cells joined by a space.
    pub fn to_plain_text(&self) -> String {
        std::iter::once(&self.headers)
            .chain(self.rows.iter())
            .map(|row| {
                row.iter()
                    .filter(|c| !c.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        let column = column.trim();
        self.headers
            .iter()
            .position(|h| h == column)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(column)))
    }

    /// Numeric summary of one column; cells that do not parse as numbers are
    /// skipped.
    pub fn column_stats(&self, column: &str) -> Option<ColumnStats> {
        let idx = self.column_index(column)?;
        let cells: Vec<&str> = self
            .rows
            .iter()
            .map(|r| r[idx].as_str())
            .filter(|c| !c.is_empty())
            .collect();
        let values: Vec<f64> = cells
            .iter()
            .filter_map(|c| c.replace(',', "").parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();

        let sum: f64 = values.iter().sum();
        let numeric_count = values.len();
        Some(ColumnStats {
            column: self.headers[idx].clone(),
            count: cells.len(),
            numeric_count,
            sum,
            mean: (numeric_count > 0).then(|| sum / numeric_count as f64),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        })
    }
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Every non-empty sheet of an xlsx/xls/ods workbook, in workbook order.
pub fn read_workbook(source: &str, bytes: &[u8]) -> Result<Vec<Table>, calamine::Error> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let mut tables = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet)?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        match Table::from_rows(&sheet, source, rows) {
            Some(table) => tables.push(table),
            None => tracing::debug!(source, sheet = %sheet, "skipping empty sheet"),
        }
    }
    Ok(tables)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// A comma-separated file as a single table named after the file stem.
pub fn read_csv(source: &str, bytes: &[u8]) -> Result<Option<Table>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    let stem = source.rsplit_once('.').map(|(s, _)| s).unwrap_or(source);
    Ok(Table::from_rows(stem, source, rows))
}
