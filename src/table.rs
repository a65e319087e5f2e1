use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use crate::error::{Result, SoduError};

/// Raw cell value as read from the file, before any typing heuristics.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Inclusive merged range in grid-relative 0-based coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

/// Rectangular cell grid plus the merge metadata needed to resolve it.
/// CSV sources never carry merges.
#[derive(Debug, Clone)]
pub struct Grid {
    pub rows: Vec<Vec<Cell>>,
    pub merges: Vec<MergeRange>,
}

impl Grid {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(Cell::is_blank))
    }
}

/// Decode CSV bytes into a grid. Quoted fields may contain delimiters,
/// escaped quotes and newlines. Blank lines are dropped (the reader skips
/// them), but a `,,,` record of empty cells is a real row: positions
/// matter to header detection.
pub fn decode_csv(bytes: &[u8]) -> Result<Grid> {
    let text = std::str::from_utf8(bytes).map_err(|_| SoduError::InvalidEncoding)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<Cell> = record
            .iter()
            .map(|f| {
                if f.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(f.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    let grid = Grid {
        rows,
        merges: Vec::new(),
    };
    if grid.rows.is_empty() || grid.is_empty() {
        return Err(SoduError::EmptyInput);
    }
    Ok(grid)
}

/// Decode XLSX bytes: first worksheet unless a sheet name is given, merge
/// regions loaded for the resolver, cells flattened positionally.
pub fn decode_xlsx(bytes: &[u8], sheet: Option<&str>) -> Result<Grid> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| SoduError::Xlsx(e.to_string()))?;

    let sheet_name = match sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|n| n == name) {
                return Err(SoduError::MissingSheet(name.to_string()));
            }
            name.to_string()
        }
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(SoduError::EmptyInput)?,
    };

    // Older producers sometimes omit the merge metadata part entirely.
    let _ = workbook.load_merged_regions();
    let merged: Vec<calamine::Dimensions> = workbook
        .merged_regions()
        .iter()
        .filter(|(name, _, _)| name == &sheet_name)
        .map(|(_, _, dims)| *dims)
        .collect();

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| SoduError::Xlsx(e.to_string()))?;
    let (off_row, off_col) = range.start().unwrap_or((0, 0));

    let rows: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    let merges = merged
        .iter()
        .filter(|d| d.start.0 >= off_row && d.start.1 >= off_col)
        .map(|d| MergeRange {
            start_row: (d.start.0 - off_row) as usize,
            start_col: (d.start.1 - off_col) as usize,
            end_row: (d.end.0 - off_row) as usize,
            end_col: (d.end.1 - off_col) as usize,
        })
        .collect();

    let grid = Grid { rows, merges };
    if grid.rows.is_empty() || grid.is_empty() {
        return Err(SoduError::EmptyInput);
    }
    Ok(grid)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(d) => Cell::Date(d),
            None => Cell::Empty,
        },
        Data::DateTimeIso(s) => match NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d") {
            Ok(d) => Cell::Date(d),
            Err(_) => Cell::Text(s.clone()),
        },
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial as i64))
}

pub type RowMap = BTreeMap<String, Cell>;

/// Header-addressed table: every row has a value (possibly Empty) for every
/// header, and header names are unique after `" (n)"` suffixing.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RowMap>,
    pub header_row_index: usize,
}

impl ParsedTable {
    /// Build from positional rows once the header row is known. Rows at or
    /// before the header index are metadata and are not carried over.
    pub fn from_rows(rows: &[Vec<Cell>], header_row_index: usize) -> Self {
        let header_cells = rows.get(header_row_index).cloned().unwrap_or_default();
        let headers = unique_headers(&header_cells);

        let data_rows = rows
            .iter()
            .skip(header_row_index + 1)
            .map(|row| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or(Cell::Empty)))
                    .collect::<RowMap>()
            })
            .collect();

        Self {
            headers,
            rows: data_rows,
            header_row_index,
        }
    }
}

fn unique_headers(cells: &[Cell]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = match cell.display() {
                s if s.is_empty() => format!("Column {}", i + 1),
                s => s,
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base} ({count})")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_csv_basic() {
        let grid = decode_csv(b"a,b,c\n1,2,3\n").unwrap();
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0][0], Cell::Text("a".into()));
        assert!(grid.merges.is_empty());
    }

    #[test]
    fn test_decode_csv_blank_lines_vs_empty_records() {
        // The truly blank line vanishes; the ",," record survives as a row
        // of empty cells so downstream indices stay aligned with the file.
        let grid = decode_csv(b"a,b\n\n,,\n1,2\n").unwrap();
        assert_eq!(grid.rows.len(), 3);
        assert!(grid.rows[1].iter().all(Cell::is_blank));
    }

    #[test]
    fn test_decode_csv_all_blank_cells_is_empty_input() {
        assert!(matches!(decode_csv(b",,\n,,\n"), Err(SoduError::EmptyInput)));
    }

    #[test]
    fn test_decode_csv_quoted_fields() {
        let grid = decode_csv(b"desc,amt\n\"PAYMENT, wire \"\"urgent\"\"\",\"1,000.50\"\n").unwrap();
        assert_eq!(
            grid.rows[1][0],
            Cell::Text("PAYMENT, wire \"urgent\"".into())
        );
        assert_eq!(grid.rows[1][1], Cell::Text("1,000.50".into()));
    }

    #[test]
    fn test_decode_csv_quoted_newline() {
        let grid = decode_csv(b"desc,amt\n\"two\nlines\",5\n").unwrap();
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[1][0], Cell::Text("two\nlines".into()));
    }

    #[test]
    fn test_decode_csv_empty_input() {
        assert!(matches!(decode_csv(b""), Err(SoduError::EmptyInput)));
        assert!(matches!(decode_csv(b"\n\n"), Err(SoduError::EmptyInput)));
    }

    #[test]
    fn test_decode_csv_invalid_utf8() {
        assert!(matches!(
            decode_csv(&[0xFF, 0xFE, b',', b'a']),
            Err(SoduError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(
            excel_serial_to_date(45667.0),
            NaiveDate::from_ymd_opt(2025, 1, 10)
        );
        assert_eq!(excel_serial_to_date(-5.0), None);
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let rows = vec![
            vec![Cell::Text("Date".into()), Cell::Text("Amount".into())],
            vec![Cell::Text("01/02/2024".into())],
        ];
        let table = ParsedTable::from_rows(&rows, 0);
        assert_eq!(table.headers, vec!["Date", "Amount"]);
        assert_eq!(table.rows[0]["Amount"], Cell::Empty);
    }

    #[test]
    fn test_from_rows_dedups_header_names() {
        let rows = vec![vec![
            Cell::Text("Amount".into()),
            Cell::Text("Amount".into()),
            Cell::Empty,
        ]];
        let table = ParsedTable::from_rows(&rows, 0);
        assert_eq!(table.headers, vec!["Amount", "Amount (2)", "Column 3"]);
    }

    #[test]
    fn test_from_rows_skips_preheader_rows() {
        let rows = vec![
            vec![Cell::Text("BANK STATEMENT".into())],
            vec![Cell::Text("Date".into()), Cell::Text("Amount".into())],
            vec![Cell::Text("01/02/2024".into()), Cell::Text("5".into())],
        ];
        let table = ParsedTable::from_rows(&rows, 1);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.header_row_index, 1);
    }
}
