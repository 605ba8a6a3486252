//! Fiscal-quarter calendar
//!
//! Renewal concentration is tracked per fiscal quarter. The fiscal year does
//! not follow the calendar year: by default it begins February 1, so Q1 is
//! Feb–Apr, Q2 is May–Jul, Q3 is Aug–Oct and Q4 is Nov–Jan.

use crate::{TamError, TamResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One fiscal quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    /// Zero-based index, for quarterly ledger arrays.
    pub fn index(&self) -> usize {
        match self {
            Quarter::Q1 => 0,
            Quarter::Q2 => 1,
            Quarter::Q3 => 2,
            Quarter::Q4 => 3,
        }
    }

    pub fn from_index(i: usize) -> Quarter {
        match i % 4 {
            0 => Quarter::Q1,
            1 => Quarter::Q2,
            2 => Quarter::Q3,
            _ => Quarter::Q4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps calendar dates to fiscal quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalCalendar {
    start_month: u32,
}

impl FiscalCalendar {
    /// Build a calendar with the fiscal year starting in `start_month`
    /// (1 = January .. 12 = December).
    pub fn new(start_month: u32) -> TamResult<Self> {
        if !(1..=12).contains(&start_month) {
            return Err(TamError::Config(format!(
                "fiscal_year_start_month must be 1..=12, got {start_month}"
            )));
        }
        Ok(FiscalCalendar { start_month })
    }

    /// Fiscal quarter containing `date`.
    pub fn quarter_of(&self, date: NaiveDate) -> Quarter {
        let offset = (date.month() + 12 - self.start_month) % 12;
        Quarter::from_index((offset / 3) as usize)
    }
}

impl Default for FiscalCalendar {
    /// Fiscal year begins February 1.
    fn default() -> Self {
        FiscalCalendar { start_month: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_calendar_starts_in_february() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.quarter_of(date(2025, 2, 1)), Quarter::Q1);
        assert_eq!(cal.quarter_of(date(2025, 4, 30)), Quarter::Q1);
        assert_eq!(cal.quarter_of(date(2025, 5, 1)), Quarter::Q2);
        assert_eq!(cal.quarter_of(date(2025, 8, 15)), Quarter::Q3);
        assert_eq!(cal.quarter_of(date(2025, 11, 1)), Quarter::Q4);
        // January belongs to the previous fiscal year's Q4
        assert_eq!(cal.quarter_of(date(2026, 1, 31)), Quarter::Q4);
    }

    #[test]
    fn test_calendar_year_start() {
        let cal = FiscalCalendar::new(1).unwrap();
        assert_eq!(cal.quarter_of(date(2025, 1, 1)), Quarter::Q1);
        assert_eq!(cal.quarter_of(date(2025, 12, 31)), Quarter::Q4);
    }

    #[test]
    fn test_invalid_start_month() {
        assert!(FiscalCalendar::new(0).is_err());
        assert!(FiscalCalendar::new(13).is_err());
    }

    #[test]
    fn test_quarter_index_roundtrip() {
        for q in [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4] {
            assert_eq!(Quarter::from_index(q.index()), q);
        }
    }
}
