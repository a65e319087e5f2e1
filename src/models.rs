use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub bank: Option<String>,
    pub number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }
}

/// Ledger entry. `amount` is signed: credits positive, debits negative, so a
/// plain sum over `(date, id)` order yields the running balance.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub is_adjustment: bool,
    pub reference: Option<String>,
    pub branch: Option<String>,
    pub import_id: Option<i64>,
}

/// Declared-balance snapshot anchoring reconciliation at a date.
/// `adjustment = declared_balance - calculated_balance` holds after every
/// recalculation; `import_id` marks checkpoints owned by an import batch,
/// which only a rollback may remove.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub declared_balance: Decimal,
    pub calculated_balance: Decimal,
    pub adjustment: Decimal,
    pub is_reconciled: bool,
    pub import_id: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    RolledBack,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::RolledBack => "rolled_back",
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub id: i64,
    pub account_id: i64,
    pub file_name: String,
    pub record_count: i64,
    pub date_range_start: Option<NaiveDate>,
    pub date_range_end: Option<NaiveDate>,
    pub checksum: Option<String>,
    pub status: BatchStatus,
}

/// Intermediate representation of one statement row before DB insert.
/// Unparseable fields resolve to None rather than errors; `problem()` marks
/// rows the commit step quarantines instead of inserting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateTransaction {
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub running_balance: Option<Decimal>,
    pub reference: Option<String>,
    pub branch: Option<String>,
    pub row_number: usize,
}

impl CandidateTransaction {
    pub fn problem(&self) -> Option<&'static str> {
        if self.date.is_none() {
            return Some("no parseable date");
        }
        if self.debit.is_none() && self.credit.is_none() {
            return Some("no debit or credit amount");
        }
        None
    }

    /// Signed ledger amount: credits positive, debits negative.
    pub fn signed_amount(&self) -> Option<(Decimal, Direction)> {
        match (self.debit, self.credit) {
            (Some(d), None) => Some((-d.abs(), Direction::Debit)),
            (None, Some(c)) => Some((c.abs(), Direction::Credit)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_problem_flags_missing_date() {
        let c = CandidateTransaction {
            debit: Some(dec!(100)),
            ..Default::default()
        };
        assert_eq!(c.problem(), Some("no parseable date"));
    }

    #[test]
    fn test_problem_flags_missing_amount() {
        let c = CandidateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        assert_eq!(c.problem(), Some("no debit or credit amount"));
    }

    #[test]
    fn test_signed_amount_directions() {
        let c = CandidateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 15),
            debit: Some(dec!(250)),
            ..Default::default()
        };
        assert_eq!(c.signed_amount(), Some((dec!(-250), Direction::Debit)));

        let c = CandidateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 15),
            credit: Some(dec!(250)),
            ..Default::default()
        };
        assert_eq!(c.signed_amount(), Some((dec!(250), Direction::Credit)));
    }
}
