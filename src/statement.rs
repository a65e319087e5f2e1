use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::amount::parse_cell_amount;
use crate::classify::{classify_columns, ColumnClassification, ColumnRole};
use crate::dates;
use crate::error::Result;
use crate::header::{locate_header_row, CSV_SCAN_LIMIT, XLSX_SCAN_LIMIT};
use crate::models::CandidateTransaction;
use crate::sheet;
use crate::table::{self, Cell, ParsedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Xlsx,
}

impl SourceKind {
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub kind: SourceKind,
    /// XLSX only; None means the first worksheet.
    pub sheet: Option<String>,
    /// Tie-break for ambiguous day/month ordering.
    pub prefer_month_first: bool,
}

impl ParseOptions {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            sheet: None,
            prefer_month_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Resolve,
    HeaderDetect,
    Classify,
    DateFormat,
    Metadata,
    Candidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// One entry in the diagnostics sink returned with every parse. The core
/// never logs from inside the pipeline; callers decide what to surface.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatementSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub ending_balance: Option<Decimal>,
}

/// Everything the import preview needs: the typed table, advisory column
/// roles, detected date format, checkpoint pre-fill suggestions, candidate
/// rows, and the diagnostics trail.
#[derive(Debug)]
pub struct Statement {
    pub table: ParsedTable,
    pub columns: Vec<ColumnClassification>,
    pub date_format: Option<&'static str>,
    pub summary: StatementSummary,
    pub candidates: Vec<CandidateTransaction>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the whole heuristic pipeline over a statement file.
///
/// Header detection runs once on the raw grid to get an approximate index,
/// the merged-cell resolver uses that index as its metadata boundary, and
/// detection runs again on the cleaned rows; the two passes break the
/// header/merge dependency cycle.
pub fn parse_statement(bytes: &[u8], opts: &ParseOptions) -> Result<Statement> {
    let mut diagnostics = Vec::new();

    let (rows, scan_limit) = match opts.kind {
        SourceKind::Csv => {
            let grid = table::decode_csv(bytes)?;
            diagnostics.push(Diagnostic {
                stage: Stage::Decode,
                severity: Severity::Info,
                message: format!("decoded {} row(s)", grid.rows.len()),
            });
            (grid.rows, CSV_SCAN_LIMIT)
        }
        SourceKind::Xlsx => {
            let grid = table::decode_xlsx(bytes, opts.sheet.as_deref())?;
            diagnostics.push(Diagnostic {
                stage: Stage::Decode,
                severity: Severity::Info,
                message: format!("decoded {} row(s)", grid.rows.len()),
            });
            let first_pass = locate_header_row(&grid.rows, XLSX_SCAN_LIMIT);
            if !grid.merges.is_empty() {
                diagnostics.push(Diagnostic {
                    stage: Stage::Resolve,
                    severity: Severity::Info,
                    message: format!("resolved {} merged range(s)", grid.merges.len()),
                });
            }
            let (rows, _) = sheet::resolve(&grid, first_pass.index);
            (rows, XLSX_SCAN_LIMIT)
        }
    };

    let location = locate_header_row(&rows, scan_limit);
    if location.fallback {
        diagnostics.push(Diagnostic {
            stage: Stage::HeaderDetect,
            severity: Severity::Warning,
            message: "no row looked like column headers; assuming the first row".into(),
        });
    } else if location.index > 0 {
        diagnostics.push(Diagnostic {
            stage: Stage::HeaderDetect,
            severity: Severity::Info,
            message: format!(
                "headers found at row {} (score {})",
                location.index, location.score
            ),
        });
    }

    let table = ParsedTable::from_rows(&rows, location.index);
    let columns = classify_columns(&table.headers, &table.rows);
    for c in columns.iter().filter(|c| c.confidence < 0.5) {
        diagnostics.push(Diagnostic {
            stage: Stage::Classify,
            severity: Severity::Warning,
            message: format!(
                "low confidence for column \"{}\" ({:.2}): {}",
                c.name, c.confidence, c.justification
            ),
        });
    }

    let date_column = metadata_date_column(&columns);
    let date_format = match date_column {
        Some(name) => detect_format_for(name, &table, opts.prefer_month_first, &mut diagnostics),
        None => {
            diagnostics.push(Diagnostic {
                stage: Stage::DateFormat,
                severity: Severity::Warning,
                message: "no date column identified; rows cannot be dated".into(),
            });
            None
        }
    };

    let summary = extract_summary(&table, &columns, date_column, date_format);
    if let (Some(start), Some(end)) = (summary.start_date, summary.end_date) {
        diagnostics.push(Diagnostic {
            stage: Stage::Metadata,
            severity: Severity::Info,
            message: format!("statement period {start} to {end}"),
        });
    }

    let candidates = build_candidates(&table, &columns, date_column, date_format, &mut diagnostics);

    let flagged = candidates.iter().filter(|c| c.problem().is_some()).count();
    if flagged > 0 {
        diagnostics.push(Diagnostic {
            stage: Stage::Candidates,
            severity: Severity::Warning,
            message: format!("{flagged} row(s) lack a date or an amount and will be quarantined"),
        });
    }

    Ok(Statement {
        table,
        columns,
        date_format,
        summary,
        candidates,
        diagnostics,
    })
}

fn best_column<'a>(columns: &'a [ColumnClassification], role: ColumnRole) -> Option<&'a str> {
    columns
        .iter()
        .filter(|c| c.role == role)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|c| c.name.as_str())
}

// Headers meaning "effective/value date" beat a generic transaction date for
// the statement period; banks post on one and settle on the other.
const EFFECTIVE_DATE_MARKERS: &[&str] = &[
    "hiệu lực",
    "hieu luc",
    "effective",
    "value date",
];

fn metadata_date_column(columns: &[ColumnClassification]) -> Option<&str> {
    let effective = columns.iter().find(|c| {
        c.role == ColumnRole::Date
            && EFFECTIVE_DATE_MARKERS
                .iter()
                .any(|m| c.name.to_lowercase().contains(m))
    });
    match effective {
        Some(c) => Some(c.name.as_str()),
        None => best_column(columns, ColumnRole::Date),
    }
}

fn detect_format_for(
    column: &str,
    table: &ParsedTable,
    prefer_month_first: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<&'static str> {
    let samples: Vec<&str> = table
        .rows
        .iter()
        .filter_map(|r| r.get(column))
        .filter_map(Cell::as_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(10)
        .collect();

    if samples.is_empty() {
        // Spreadsheet-typed dates need no format.
        return None;
    }

    let detection = dates::detect_date_format(&samples, prefer_month_first);
    for w in &detection.warnings {
        diagnostics.push(Diagnostic {
            stage: Stage::DateFormat,
            severity: Severity::Warning,
            message: w.clone(),
        });
    }
    if let Some(tag) = detection.format {
        diagnostics.push(Diagnostic {
            stage: Stage::DateFormat,
            severity: Severity::Info,
            message: format!(
                "date format {tag} (confidence {:.2})",
                detection.confidence
            ),
        });
    }
    detection.format
}

fn parse_row_date(cell: &Cell, format: Option<&str>) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Text(s) => match format {
            Some(f) => dates::parse_date(s, f),
            None => dates::parse_date_any(s),
        },
        // A numeric cell under a date header is usually an Excel serial.
        Cell::Number(n) => table::excel_serial_to_date(*n),
        Cell::Empty => None,
    }
}

/// Statement period and ending balance, as checkpoint pre-fill suggestions.
/// Dates compare as plain calendar dates; no timezone shifting.
fn extract_summary(
    table: &ParsedTable,
    columns: &[ColumnClassification],
    date_column: Option<&str>,
    date_format: Option<&str>,
) -> StatementSummary {
    let Some(date_column) = date_column else {
        return StatementSummary::default();
    };
    let balance_column = best_column(columns, ColumnRole::Balance);

    let mut dated: Vec<(NaiveDate, usize)> = table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            row.get(date_column)
                .and_then(|c| parse_row_date(c, date_format))
                .map(|d| (d, i))
        })
        .collect();
    dated.sort_by_key(|(d, i)| (*d, *i));

    let start_date = dated.first().map(|(d, _)| *d);
    let end_date = dated.last().map(|(d, _)| *d);
    let ending_balance = dated.last().and_then(|(_, i)| {
        balance_column
            .and_then(|col| table.rows[*i].get(col))
            .and_then(parse_cell_amount)
    });

    StatementSummary {
        start_date,
        end_date,
        ending_balance,
    }
}

fn build_candidates(
    table: &ParsedTable,
    columns: &[ColumnClassification],
    date_column: Option<&str>,
    date_format: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<CandidateTransaction> {
    let description_column = best_column(columns, ColumnRole::Description);
    let debit_column = best_column(columns, ColumnRole::Debit);
    let credit_column = best_column(columns, ColumnRole::Credit);
    let amount_column = best_column(columns, ColumnRole::Amount);
    let balance_column = best_column(columns, ColumnRole::Balance);
    let reference_column = best_column(columns, ColumnRole::Reference);
    let branch_column = best_column(columns, ColumnRole::Branch);

    let cell = |row: &crate::table::RowMap, col: Option<&str>| -> Option<Cell> {
        col.and_then(|c| row.get(c)).cloned()
    };
    let text = |row: &crate::table::RowMap, col: Option<&str>| -> Option<String> {
        cell(row, col)
            .map(|c| c.display())
            .filter(|s| !s.is_empty())
    };

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let date = date_column
                .and_then(|c| row.get(c))
                .and_then(|c| parse_row_date(c, date_format));

            let mut debit = cell(row, debit_column)
                .and_then(|c| parse_cell_amount(&c))
                .filter(|v| !v.is_zero())
                .map(|v| v.abs());
            let mut credit = cell(row, credit_column)
                .and_then(|c| parse_cell_amount(&c))
                .filter(|v| !v.is_zero())
                .map(|v| v.abs());

            // A single signed column splits on sign: money in is credit.
            if debit.is_none() && credit.is_none() {
                if let Some(v) = cell(row, amount_column)
                    .and_then(|c| parse_cell_amount(&c))
                    .filter(|v| !v.is_zero())
                {
                    if v.is_sign_negative() {
                        debit = Some(v.abs());
                    } else {
                        credit = Some(v);
                    }
                }
            }

            if debit.is_some() && credit.is_some() {
                diagnostics.push(Diagnostic {
                    stage: Stage::Candidates,
                    severity: Severity::Warning,
                    message: format!(
                        "row {} has values in both debit and credit; left unclassified",
                        i + 1
                    ),
                });
                debit = None;
                credit = None;
            }

            CandidateTransaction {
                date,
                description: text(row, description_column),
                debit,
                credit,
                running_balance: cell(row, balance_column).and_then(|c| parse_cell_amount(&c)),
                reference: text(row, reference_column),
                branch: text(row, branch_column),
                row_number: i + 1,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const VN_CSV: &str = "\
SAO KÊ TÀI KHOẢN,,,,
,,,,
Chủ tài khoản:,CÔNG TY ABC,Số TK:,19035281,
Ngày,Diễn giải,Ghi nợ,Ghi có,Số dư
02/01/2024,Thanh toán hóa đơn điện,500.000,,9.500.000
15/01/2024,Nhận chuyển khoản,,\"1.200.000\",10.700.000
31/01/2024,Phí dịch vụ,11.000,,10.689.000
";

    #[test]
    fn test_parse_vietnamese_csv_end_to_end() {
        let opts = ParseOptions::new(SourceKind::Csv);
        let st = parse_statement(VN_CSV.as_bytes(), &opts).unwrap();

        assert_eq!(st.table.header_row_index, 3);
        assert_eq!(st.table.headers.len(), 5);
        assert_eq!(st.date_format, Some("dd/mm/yyyy"));
        assert_eq!(st.candidates.len(), 3);

        let first = &st.candidates[0];
        assert_eq!(first.date, Some(ymd(2024, 1, 2)));
        assert_eq!(first.debit, Some(dec!(500000)));
        assert_eq!(first.credit, None);
        assert_eq!(first.running_balance, Some(dec!(9500000)));

        let second = &st.candidates[1];
        assert_eq!(second.credit, Some(dec!(1200000)));
        assert_eq!(second.debit, None);

        assert_eq!(st.summary.start_date, Some(ymd(2024, 1, 2)));
        assert_eq!(st.summary.end_date, Some(ymd(2024, 1, 31)));
        assert_eq!(st.summary.ending_balance, Some(dec!(10689000)));
    }

    #[test]
    fn test_signed_amount_statement() {
        let csv = "\
Date,Description,Amount,Running Bal.
01/15/2025,ADOBE CREATIVE,-50.00,950.00
01/17/2025,STRIPE PAYOUT,\"2,500.00\",\"3,450.00\"
";
        let opts = ParseOptions::new(SourceKind::Csv);
        let st = parse_statement(csv.as_bytes(), &opts).unwrap();
        assert_eq!(st.candidates[0].debit, Some(dec!(50.00)));
        assert_eq!(st.candidates[1].credit, Some(dec!(2500.00)));
        assert_eq!(st.summary.ending_balance, Some(dec!(3450.00)));
    }

    #[test]
    fn test_ambiguous_dates_surface_warning() {
        let csv = "\
Ngày,Diễn giải,Ghi nợ,Ghi có,Số dư
01/02/2024,A,100,,900
03/04/2024,B,,50,950
";
        let opts = ParseOptions::new(SourceKind::Csv);
        let st = parse_statement(csv.as_bytes(), &opts).unwrap();
        assert_eq!(st.date_format, Some("dd/mm/yyyy"));
        assert!(st
            .diagnostics
            .iter()
            .any(|d| d.stage == Stage::DateFormat && d.severity == Severity::Warning));
    }

    #[test]
    fn test_month_first_hint_flips_ambiguity() {
        let csv = "\
Date,Description,Debit,Credit,Balance
01/02/2024,A,100,,900
";
        let mut opts = ParseOptions::new(SourceKind::Csv);
        opts.prefer_month_first = true;
        let st = parse_statement(csv.as_bytes(), &opts).unwrap();
        assert_eq!(st.date_format, Some("mm/dd/yyyy"));
        assert_eq!(st.candidates[0].date, Some(ymd(2024, 1, 2)));
    }

    #[test]
    fn test_unparseable_rows_flagged_not_fatal() {
        let csv = "\
Ngày,Diễn giải,Ghi nợ,Ghi có,Số dư
02/01/2024,OK,100,,900
not-a-date,Bad date,100,,800
03/01/2024,No amount,,,800
";
        let opts = ParseOptions::new(SourceKind::Csv);
        let st = parse_statement(csv.as_bytes(), &opts).unwrap();
        assert_eq!(st.candidates.len(), 3);
        assert_eq!(st.candidates[1].problem(), Some("no parseable date"));
        assert_eq!(st.candidates[2].problem(), Some("no debit or credit amount"));
        assert!(st
            .diagnostics
            .iter()
            .any(|d| d.stage == Stage::Candidates && d.message.contains("quarantined")));
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let opts = ParseOptions::new(SourceKind::Csv);
        assert!(parse_statement(b"", &opts).is_err());
    }

    #[test]
    fn test_source_kind_from_path() {
        use std::path::Path;
        assert_eq!(
            SourceKind::from_path(Path::new("a/b/stmt.CSV")),
            Some(SourceKind::Csv)
        );
        assert_eq!(
            SourceKind::from_path(Path::new("stmt.xlsx")),
            Some(SourceKind::Xlsx)
        );
        assert_eq!(SourceKind::from_path(Path::new("stmt.pdf")), None);
    }

    #[test]
    fn test_both_sides_filled_left_unclassified() {
        let csv = "\
Ngày,Diễn giải,Ghi nợ,Ghi có,Số dư
02/01/2024,Weird row,100,200,900
";
        let opts = ParseOptions::new(SourceKind::Csv);
        let st = parse_statement(csv.as_bytes(), &opts).unwrap();
        assert_eq!(st.candidates[0].debit, None);
        assert_eq!(st.candidates[0].credit, None);
        assert!(st.candidates[0].problem().is_some());
    }
}
