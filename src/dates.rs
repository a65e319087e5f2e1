use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fields {
    DayMonthYear,
    MonthDayYear,
    YearMonthDay,
    DayNamedMonthYear,
}

struct FormatSpec {
    tag: &'static str,
    fields: Fields,
    with_time: bool,
    regex: Regex,
}

const DMY_TAG: &str = "dd/mm/yyyy";
const MDY_TAG: &str = "mm/dd/yyyy";

const NUMERIC_DATE: &str = r"(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})";
const ISO_DATE: &str = r"(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})";
const TIME_SUFFIX: &str = r"[ T](\d{1,2}):(\d{2})(?::(\d{2}))?";

/// Ordered catalogue: datetime variants before date-only variants, and the
/// ambiguous day-first / month-first orderings kept as distinct tags so
/// detection can report which one it chose.
fn catalogue() -> &'static [FormatSpec] {
    static CATALOGUE: OnceLock<Vec<FormatSpec>> = OnceLock::new();
    CATALOGUE.get_or_init(|| {
        let date_time = |body: &str| Regex::new(&format!("^{body}{TIME_SUFFIX}$")).unwrap();
        let date_only = |body: &str| Regex::new(&format!("^{body}$")).unwrap();
        vec![
            FormatSpec {
                tag: "dd/mm/yyyy hh:mm",
                fields: Fields::DayMonthYear,
                with_time: true,
                regex: date_time(NUMERIC_DATE),
            },
            FormatSpec {
                tag: "mm/dd/yyyy hh:mm",
                fields: Fields::MonthDayYear,
                with_time: true,
                regex: date_time(NUMERIC_DATE),
            },
            FormatSpec {
                tag: "yyyy-mm-dd hh:mm",
                fields: Fields::YearMonthDay,
                with_time: true,
                regex: date_time(ISO_DATE),
            },
            FormatSpec {
                tag: DMY_TAG,
                fields: Fields::DayMonthYear,
                with_time: false,
                regex: date_only(NUMERIC_DATE),
            },
            FormatSpec {
                tag: MDY_TAG,
                fields: Fields::MonthDayYear,
                with_time: false,
                regex: date_only(NUMERIC_DATE),
            },
            FormatSpec {
                tag: "yyyy-mm-dd",
                fields: Fields::YearMonthDay,
                with_time: false,
                regex: date_only(ISO_DATE),
            },
            FormatSpec {
                tag: "dd-mmm-yyyy",
                fields: Fields::DayNamedMonthYear,
                with_time: false,
                regex: date_only(r"(\d{1,2})[ /\-]([A-Za-z]{3,9})[ /\-,]+(\d{2,4})"),
            },
            FormatSpec {
                tag: "yyyymmdd",
                fields: Fields::YearMonthDay,
                with_time: false,
                regex: date_only(r"(\d{4})(\d{2})(\d{2})"),
            },
        ]
    })
}

/// Two-digit years: 00-29 are 2000s, 30-99 are 1900s.
fn expand_year(y: i32) -> i32 {
    match y {
        0..=29 => 2000 + y,
        30..=99 => 1900 + y,
        _ => y,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn parse_with(entry: &FormatSpec, value: &str) -> Option<NaiveDate> {
    let caps = entry.regex.captures(value.trim())?;
    let int = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());

    let (y, m, d) = match entry.fields {
        Fields::DayMonthYear => (int(3)?, int(2)?, int(1)?),
        Fields::MonthDayYear => (int(3)?, int(1)?, int(2)?),
        Fields::YearMonthDay => (int(1)?, int(2)?, int(3)?),
        Fields::DayNamedMonthYear => {
            let month = month_from_name(caps.get(2)?.as_str())? as i64;
            (int(3)?, month, int(1)?)
        }
    };

    if entry.with_time {
        let hour = int(4)? as u32;
        let minute = int(5)? as u32;
        let second = int(6).unwrap_or(0) as u32;
        NaiveTime::from_hms_opt(hour, minute, second)?;
    }

    NaiveDate::from_ymd_opt(expand_year(y as i32), m as u32, d as u32)
}

#[derive(Debug, Clone)]
pub struct DateDetection {
    pub format: Option<&'static str>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

/// Infer the date format from sample values.
///
/// Every catalogue entry whose regex matches a sample attempts to parse it;
/// tags are scored by successes/tried, tie-broken by tried descending, then
/// catalogue order (day-first wins an exact tie unless `prefer_month_first`).
/// A warning is attached when the winner is one of the two ambiguous numeric
/// orderings and some sample fits either reading.
pub fn detect_date_format(samples: &[&str], prefer_month_first: bool) -> DateDetection {
    let samples: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(10)
        .collect();
    if samples.is_empty() {
        return DateDetection {
            format: None,
            confidence: 0.0,
            warnings: vec!["no date samples to inspect".into()],
        };
    }

    struct Tally {
        tag: &'static str,
        tried: usize,
        succeeded: usize,
    }

    let mut tallies: Vec<Tally> = Vec::new();
    for entry in catalogue() {
        let mut tried = 0;
        let mut succeeded = 0;
        for sample in &samples {
            if entry.regex.is_match(sample) {
                tried += 1;
                if parse_with(entry, sample).is_some() {
                    succeeded += 1;
                }
            }
        }
        tallies.push(Tally {
            tag: entry.tag,
            tried,
            succeeded,
        });
    }

    let score = |t: &Tally| -> f64 {
        if t.tried == 0 {
            0.0
        } else {
            t.succeeded as f64 / t.tried as f64
        }
    };

    let mut winner: Option<&Tally> = None;
    for t in &tallies {
        if t.tried == 0 || t.succeeded == 0 {
            continue;
        }
        let better = match winner {
            None => true,
            Some(w) => {
                score(t) > score(w) || (score(t) == score(w) && t.tried > w.tried)
            }
        };
        if better {
            winner = Some(t);
        }
    }

    // The settings hint may flip an exact tie between the two ambiguous tags.
    if prefer_month_first {
        if let Some(w) = winner {
            if w.tag == DMY_TAG || w.tag == "dd/mm/yyyy hh:mm" {
                let other_tag = if w.tag == DMY_TAG { MDY_TAG } else { "mm/dd/yyyy hh:mm" };
                if let Some(other) = tallies.iter().find(|t| t.tag == other_tag) {
                    if score(other) == score(w) && other.tried == w.tried {
                        winner = Some(other);
                    }
                }
            }
        }
    }

    let Some(winner) = winner else {
        return DateDetection {
            format: None,
            confidence: 0.0,
            warnings: vec!["no catalogue format matched the samples".into()],
        };
    };

    let mut warnings = Vec::new();
    if winner.tag.starts_with(DMY_TAG) || winner.tag.starts_with(MDY_TAG) {
        let ambiguous = samples.iter().any(|s| {
            let mut nums = s
                .split(|c: char| !c.is_ascii_digit())
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<u32>().unwrap_or(99));
            matches!((nums.next(), nums.next()), (Some(a), Some(b)) if a <= 12 && b <= 12)
        });
        if ambiguous {
            warnings.push(format!(
                "day and month are ambiguous in the samples; interpreting as {}",
                winner.tag
            ));
        }
    }

    DateDetection {
        format: Some(winner.tag),
        confidence: score(winner),
        warnings,
    }
}

/// Re-parse a single value under an explicitly chosen format tag.
///
/// Tries the tag's datetime and date-only variants first, then falls back to
/// the whole catalogue. Returns None for unparseable input; never errors.
pub fn parse_date(value: &str, format: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for entry in catalogue() {
        let same_family = entry.tag.starts_with(format) || format.starts_with(entry.tag);
        if same_family {
            if let Some(d) = parse_with(entry, value) {
                return Some(d);
            }
        }
    }
    parse_date_any(value)
}

/// Try every catalogue entry in order. For values with no detected format.
pub fn parse_date_any(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    catalogue().iter().find_map(|entry| parse_with(entry, value))
}
