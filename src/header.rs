use std::sync::OnceLock;

use regex::Regex;

use crate::table::Cell;

pub const CSV_SCAN_LIMIT: usize = 30;
pub const XLSX_SCAN_LIMIT: usize = 20;

// Bilingual header vocabulary. Diacritic-stripped spellings are listed
// alongside the accented ones because exports are inconsistent about both.
const HEADER_KEYWORDS: &[&str] = &[
    "date",
    "ngày",
    "ngay",
    "ngày giao dịch",
    "ngay giao dich",
    "ngày hạch toán",
    "ngay hach toan",
    "ngày hiệu lực",
    "ngay hieu luc",
    "transaction date",
    "posting date",
    "value date",
    "time",
    "thời gian",
    "description",
    "diễn giải",
    "dien giai",
    "chi tiết",
    "chi tiet",
    "nội dung",
    "noi dung",
    "mô tả",
    "mo ta",
    "remark",
    "memo",
    "particulars",
    "narrative",
    "debit",
    "ghi nợ",
    "ghi no",
    "phát sinh nợ",
    "phat sinh no",
    "withdrawal",
    "tiền ra",
    "tien ra",
    "credit",
    "ghi có",
    "ghi co",
    "phát sinh có",
    "phat sinh co",
    "deposit",
    "tiền vào",
    "tien vao",
    "balance",
    "số dư",
    "so du",
    "running balance",
    "amount",
    "số tiền",
    "so tien",
    "giá trị",
    "gia tri",
    "reference",
    "ref no",
    "mã giao dịch",
    "ma giao dich",
    "số bút toán",
    "so but toan",
    "transaction id",
    "số tham chiếu",
    "so tham chieu",
    "account",
    "tài khoản",
    "tai khoan",
    "bank",
    "ngân hàng",
    "ngan hang",
    "fee",
    "phí",
    "phi",
    "interest",
    "lãi",
    "lai",
    "branch",
    "chi nhánh",
    "chi nhanh",
    "currency",
    "loại tiền",
    "loai tien",
    "giao dịch",
    "giao dich",
];

// These almost never appear in data rows.
const STRONG_INDICATORS: &[&str] = &["stt", "no.", "#", "mã thanh toán", "ma thanh toan"];

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}").unwrap())
}

fn bare_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#?\d{5,}$").unwrap())
}

/// Everything a scoring rule may look at, precomputed per candidate row.
struct RowFacts {
    index: usize,
    non_empty: usize,
    keyword_cells: usize,
    strong_hits: usize,
    has_date_cell: bool,
    has_bare_id: bool,
    has_long_text: bool,
    looks_like_kv_metadata: bool,
    numeric_fraction: f64,
}

struct Rule {
    #[allow(dead_code)]
    name: &'static str,
    apply: fn(&RowFacts) -> i32,
}

/// The locator's heuristics as data: each rule inspects the facts and
/// contributes a weight. New bank layouts are handled by extending this
/// table, not by branching in the scan loop.
const RULES: &[Rule] = &[
    Rule {
        name: "keyword-cells",
        apply: |f| 3 * f.keyword_cells as i32,
    },
    Rule {
        name: "strong-indicator",
        apply: |f| if f.strong_hits > 0 { 15 } else { 0 },
    },
    Rule {
        name: "too-few-keywords",
        apply: |f| if f.keyword_cells < 2 { -20 } else { 0 },
    },
    Rule {
        name: "date-valued-cell",
        apply: |f| if f.has_date_cell { -30 } else { 0 },
    },
    Rule {
        name: "bare-id-cell",
        apply: |f| if f.has_bare_id { -25 } else { 0 },
    },
    Rule {
        name: "long-free-text",
        apply: |f| if f.has_long_text { -15 } else { 0 },
    },
    Rule {
        name: "wide-row",
        apply: |f| {
            let mut s = 0;
            if f.non_empty >= 5 {
                s += 3;
            }
            if f.non_empty >= 8 {
                s += 3;
            }
            s
        },
    },
    Rule {
        name: "first-row-bonus",
        apply: |f| {
            if f.index == 0 && f.keyword_cells >= 2 {
                5
            } else {
                0
            }
        },
    },
    Rule {
        name: "kv-metadata-row",
        apply: |f| if f.looks_like_kv_metadata { -10 } else { 0 },
    },
    Rule {
        name: "mostly-numeric",
        apply: |f| if f.numeric_fraction > 0.5 { -10 } else { 0 },
    },
];

#[derive(Debug, Clone, Copy)]
pub struct HeaderLocation {
    pub index: usize,
    pub score: i32,
    /// True when no row qualified and index 0 was returned as a guess.
    pub fallback: bool,
}

/// Pick the row most likely to hold column headers within the scan window.
/// Rows need at least 3 non-empty cells to be considered; ties keep the
/// earliest row.
pub fn locate_header_row(rows: &[Vec<Cell>], scan_limit: usize) -> HeaderLocation {
    let mut best: Option<(i32, usize)> = None;

    for (index, row) in rows.iter().take(scan_limit).enumerate() {
        let facts = gather_facts(index, row);
        if facts.non_empty < 3 {
            continue;
        }
        let score: i32 = RULES.iter().map(|r| (r.apply)(&facts)).sum();
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, index));
        }
    }

    match best {
        Some((score, index)) => HeaderLocation {
            index,
            score,
            fallback: false,
        },
        None => HeaderLocation {
            index: 0,
            score: 0,
            fallback: true,
        },
    }
}

fn gather_facts(index: usize, row: &[Cell]) -> RowFacts {
    let texts: Vec<String> = row
        .iter()
        .map(|c| c.display().trim().to_lowercase())
        .collect();
    let non_empty: Vec<&String> = texts.iter().filter(|t| !t.is_empty()).collect();

    let keyword_cells = non_empty
        .iter()
        .filter(|t| matches_keyword(t.as_str()))
        .count();
    let strong_hits = non_empty
        .iter()
        .filter(|t| STRONG_INDICATORS.contains(&t.as_str()))
        .count();
    let has_date_cell = row.iter().any(|c| matches!(c, Cell::Date(_)))
        || non_empty.iter().any(|t| date_pattern().is_match(t));
    let has_bare_id = non_empty.iter().any(|t| bare_id_pattern().is_match(t));
    let has_long_text = non_empty.iter().any(|t| t.chars().count() > 40);
    let numeric_cells = row
        .iter()
        .filter(|c| match c {
            Cell::Number(_) => true,
            Cell::Text(s) => s.trim().replace(',', "").parse::<f64>().is_ok(),
            _ => false,
        })
        .count();
    let numeric_fraction = if non_empty.is_empty() {
        0.0
    } else {
        numeric_cells as f64 / non_empty.len() as f64
    };

    // Metadata blocks read as alternating label/value pairs: an even number
    // of cells where every value position is short and matches no keyword.
    let looks_like_kv_metadata = non_empty.len() >= 4
        && non_empty.len() % 2 == 0
        && non_empty
            .iter()
            .skip(1)
            .step_by(2)
            .all(|t| t.chars().count() <= 20 && !matches_keyword(t.as_str()));

    RowFacts {
        index,
        non_empty: non_empty.len(),
        keyword_cells,
        strong_hits,
        has_date_cell,
        has_bare_id,
        has_long_text,
        looks_like_kv_metadata,
        numeric_fraction,
    }
}

/// A cell matches when it equals a keyword or is a close superset of one
/// (at most 10 extra characters), e.g. "ngày giao dịch" over "ngày".
fn matches_keyword(text: &str) -> bool {
    HEADER_KEYWORDS.iter().any(|kw| {
        text == *kw
            || (text.contains(*kw) && text.chars().count() <= kw.chars().count() + 10)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text((*s).to_string())
                }
            })
            .collect()
    }

    #[test]
    fn test_picks_vietnamese_header_after_metadata() {
        let rows = vec![
            row(&["SAO KÊ TÀI KHOẢN - BANK STATEMENT", "", "", "", ""]),
            row(&["Chủ tài khoản:", "CÔNG TY TNHH ABC", "Số TK:", "19035281"]),
            row(&["Từ ngày:", "01/01/2024", "Đến ngày:", "31/01/2024"]),
            row(&["Ngày", "Diễn giải", "Ghi nợ", "Ghi có", "Số dư"]),
            row(&["02/01/2024", "Thanh toán hóa đơn", "500.000", "", "12.500.000"]),
        ];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 3);
        assert!(!loc.fallback);
    }

    #[test]
    fn test_title_blank_then_kv_rows_before_headers() {
        // Row 0 title, row 1 blank, row 2 metadata pairs, row 3 headers.
        let rows = vec![
            row(&["VIETCOMBANK", "", ""]),
            row(&["", "", ""]),
            row(&["Account:", "0071000123456", "Branch:", "HCM"]),
            row(&["Ngày", "Diễn giải", "Ghi nợ", "Ghi có", "Số dư"]),
            row(&["02/01/2024", "NAP TIEN", "", "1.000.000", "5.000.000"]),
        ];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 3);
    }

    #[test]
    fn test_english_header_first_row() {
        let rows = vec![
            row(&["Date", "Description", "Amount", "Running Bal."]),
            row(&["01/15/2025", "ADOBE CREATIVE", "-50.00", "950.00"]),
        ];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 0);
    }

    #[test]
    fn test_data_rows_score_below_headers() {
        let rows = vec![
            row(&["Ngày", "Số bút toán", "Ghi nợ", "Ghi có"]),
            row(&["02/01/2024", "90211-00233", "500.000", ""]),
            row(&["03/01/2024", "90211-00234", "", "200.000"]),
        ];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 0);
    }

    #[test]
    fn test_strong_indicator_wins() {
        let rows = vec![
            row(&["Báo cáo", "tháng 01", "năm 2024"]),
            row(&["STT", "Ngày", "Nội dung", "Số tiền"]),
            row(&["1", "02/01/2024", "Chuyển khoản", "1.500.000"]),
        ];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 1);
    }

    #[test]
    fn test_fallback_when_nothing_qualifies() {
        let rows = vec![row(&["only", "two"]), row(&["cells", "here"])];
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert_eq!(loc.index, 0);
        assert!(loc.fallback);
    }

    #[test]
    fn test_scan_limit_respected() {
        let mut rows: Vec<Vec<Cell>> = (0..40)
            .map(|i| row(&["x", &format!("{i}"), "y"]))
            .collect();
        rows.push(row(&["Ngày", "Diễn giải", "Ghi nợ", "Ghi có"]));
        let loc = locate_header_row(&rows, CSV_SCAN_LIMIT);
        assert!(loc.index < CSV_SCAN_LIMIT);
    }
}
