use rust_decimal::Decimal;
use serde::Serialize;

use crate::amount::parse_cell_amount;
use crate::dates;
use crate::table::{Cell, RowMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Date,
    Description,
    Debit,
    Credit,
    Balance,
    Reference,
    Branch,
    /// Single signed column carrying both directions.
    Amount,
    Ignore,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Description => "description",
            Self::Debit => "debit",
            Self::Credit => "credit",
            Self::Balance => "balance",
            Self::Reference => "reference",
            Self::Branch => "branch",
            Self::Amount => "amount",
            Self::Ignore => "ignore",
        }
    }
}

/// Role keyword sets in classification priority order. A header is assigned
/// the first role whose vocabulary it matches; everything else falls through
/// to the content heuristics.
const ROLE_KEYWORDS: &[(ColumnRole, &[&str])] = &[
    (
        ColumnRole::Date,
        &[
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
            "effective date",
            "txn date",
        ],
    ),
    (
        ColumnRole::Description,
        &[
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
            "transaction details",
        ],
    ),
    (
        ColumnRole::Debit,
        &[
            "debit",
            "ghi nợ",
            "ghi no",
            "phát sinh nợ",
            "phat sinh no",
            "withdrawal",
            "tiền ra",
            "tien ra",
            "debit amount",
            "số tiền ghi nợ",
        ],
    ),
    (
        ColumnRole::Credit,
        &[
            "credit",
            "ghi có",
            "ghi co",
            "phát sinh có",
            "phat sinh co",
            "deposit",
            "tiền vào",
            "tien vao",
            "credit amount",
            "số tiền ghi có",
        ],
    ),
    (
        ColumnRole::Balance,
        &[
            "balance",
            "số dư",
            "so du",
            "running balance",
            "số dư cuối",
            "closing balance",
            "available balance",
            "running bal",
        ],
    ),
    (
        ColumnRole::Reference,
        &[
            "reference",
            "ref",
            "ref no",
            "mã giao dịch",
            "ma giao dich",
            "số bút toán",
            "so but toan",
            "transaction id",
            "mã thanh toán",
            "ma thanh toan",
            "số tham chiếu",
            "so tham chieu",
        ],
    ),
    (
        ColumnRole::Branch,
        &[
            "branch",
            "chi nhánh",
            "chi nhanh",
            "đơn vị",
            "don vi",
            "office",
            "điểm giao dịch",
        ],
    ),
    (
        ColumnRole::Amount,
        &[
            "amount",
            "số tiền",
            "so tien",
            "giá trị",
            "gia tri",
            "transaction amount",
            "value",
        ],
    ),
];

const SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnClassification {
    pub name: String,
    pub role: ColumnRole,
    /// 0..=1. Advisory only; a manual override always wins.
    pub confidence: f64,
    pub justification: String,
    pub sample_values: Vec<String>,
}

/// Assign each header a semantic role from its wording, adjusted by what the
/// column actually contains.
pub fn classify_columns(headers: &[String], rows: &[RowMap]) -> Vec<ColumnClassification> {
    headers
        .iter()
        .map(|name| classify_column(name, rows))
        .collect()
}

fn classify_column(name: &str, rows: &[RowMap]) -> ColumnClassification {
    let normalized = normalize_header(name);
    let samples: Vec<Cell> = rows
        .iter()
        .filter_map(|r| r.get(name))
        .filter(|c| !c.is_blank())
        .take(SAMPLE_LIMIT)
        .cloned()
        .collect();
    let sample_values: Vec<String> = samples.iter().map(Cell::display).collect();

    for (role, keywords) in ROLE_KEYWORDS {
        if let Some((keyword, exact)) = match_keyword(&normalized, keywords) {
            let mut confidence = if exact { 0.9 } else { 0.75 };
            let mut justification = if exact {
                format!("header \"{name}\" equals keyword \"{keyword}\"")
            } else {
                format!("header \"{name}\" contains keyword \"{keyword}\"")
            };
            adjust_by_content(*role, &samples, &mut confidence, &mut justification);
            return ColumnClassification {
                name: name.to_string(),
                role: *role,
                confidence,
                justification,
                sample_values,
            };
        }
    }

    // No vocabulary hit: a mostly-numeric column is probably money or an id,
    // but without a recognizable header it stays unmapped for manual review.
    let numeric = samples
        .iter()
        .filter(|c| parse_cell_amount(c).is_some())
        .count();
    if !samples.is_empty() && numeric * 10 >= samples.len() * 8 {
        return ColumnClassification {
            name: name.to_string(),
            role: ColumnRole::Ignore,
            confidence: 0.3,
            justification: format!(
                "header \"{name}\" matches no keyword but {numeric}/{} samples are numeric; map manually if this column matters",
                samples.len()
            ),
            sample_values,
        };
    }

    ColumnClassification {
        name: name.to_string(),
        role: ColumnRole::Ignore,
        confidence: 0.2,
        justification: format!("header \"{name}\" matches no known keyword"),
        sample_values,
    }
}

fn adjust_by_content(role: ColumnRole, samples: &[Cell], confidence: &mut f64, justification: &mut String) {
    match role {
        ColumnRole::Date => {
            let already_typed = samples.iter().any(|c| matches!(c, Cell::Date(_)));
            let texts: Vec<&str> = samples.iter().filter_map(Cell::as_text).collect();
            if already_typed {
                justification.push_str("; cells carry spreadsheet dates");
            } else if !texts.is_empty() {
                let det = dates::detect_date_format(&texts, false);
                match det.format {
                    Some(tag) => {
                        *confidence = confidence.max(det.confidence.min(0.95));
                        justification.push_str(&format!("; samples parse as {tag}"));
                    }
                    None => {
                        *confidence *= 0.5;
                        justification.push_str("; no sample parsed as a date");
                    }
                }
            }
        }
        ColumnRole::Debit | ColumnRole::Credit | ColumnRole::Balance | ColumnRole::Amount => {
            let parsed: Vec<Decimal> =
                samples.iter().filter_map(parse_cell_amount).collect();
            if samples.is_empty() {
                // Nothing to check against; leave the keyword confidence.
            } else if parsed.is_empty() {
                *confidence *= 0.5;
                justification.push_str("; no sample parsed as an amount");
            } else if role == ColumnRole::Amount {
                let pos = parsed.iter().any(|v| v.is_sign_positive() && !v.is_zero());
                let neg = parsed.iter().any(|v| v.is_sign_negative());
                if pos && neg {
                    *confidence = (*confidence + 0.1).min(1.0);
                    justification.push_str("; both signs observed, signed amount column");
                }
            }
        }
        _ => {}
    }
}

fn match_keyword<'a>(normalized: &str, keywords: &[&'a str]) -> Option<(&'a str, bool)> {
    for kw in keywords {
        if normalized == *kw {
            return Some((kw, true));
        }
    }
    for kw in keywords {
        if normalized.contains(*kw) && normalized.chars().count() <= kw.chars().count() + 10 {
            return Some((kw, false));
        }
    }
    None
}

/// Lower-case, trim, and drop the `" (n)"` dedup suffix so duplicated merged
/// headers classify like their base name.
fn normalize_header(name: &str) -> String {
    let n = name.trim().to_lowercase();
    if let Some(pos) = n.rfind(" (") {
        if n.ends_with(')') && n[pos + 2..n.len() - 1].chars().all(|c| c.is_ascii_digit()) {
            return n[..pos].trim().to_string();
        }
    }
    n
}
