/// Search date range handling
///
/// The portal filters documents by an inclusive `dd.mm.yyyy - dd.mm.yyyy`
/// period. Without explicit dates the range rolls: from the same day one
/// month back up to today, recomputed on every cycle.
use crate::error::{SignerError, SignerResult};
use chrono::{Datelike, Local, NaiveDate};
use std::fmt;

/// Date format used by the portal
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Inclusive search period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> SignerResult<Self> {
        if start > end {
            return Err(SignerError::Config(format!(
                "Start date {} is after end date {}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// Rolling default ending on `today`
    pub fn month_back_from(today: NaiveDate) -> Self {
        Self {
            start: month_back(today),
            end: today,
        }
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// Value of the portal's period filter field
    pub fn period(&self) -> String {
        format!("{} - {}", self.start_str(), self.end_str())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_str(), self.end_str())
    }
}

/// Where the search range comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelection {
    /// One month back to today, recomputed each cycle
    Rolling,
    /// Fixed range given on the command line
    Fixed(DateRange),
}

impl DateSelection {
    /// Build from positional command-line dates: none, one (single day)
    /// or two (range).
    pub fn from_args(args: &[String]) -> SignerResult<Self> {
        match args {
            [] => Ok(DateSelection::Rolling),
            [day] => {
                let day = parse_date(day)?;
                Ok(DateSelection::Fixed(DateRange::new(day, day)?))
            }
            [start, end] => Ok(DateSelection::Fixed(DateRange::new(
                parse_date(start)?,
                parse_date(end)?,
            )?)),
            _ => Err(SignerError::Config(
                "Expected at most two dates: [START [END]]".to_string(),
            )),
        }
    }

    /// Range to search in the cycle starting now
    pub fn current(&self) -> DateRange {
        self.resolve(Local::now().date_naive())
    }

    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        match self {
            DateSelection::Rolling => DateRange::month_back_from(today),
            DateSelection::Fixed(range) => *range,
        }
    }
}

/// Parse a `dd.mm.yyyy` date
pub fn parse_date(value: &str) -> SignerResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| SignerError::Config(format!("Invalid date '{}': {}", value, e)))
}

/// Same day of the previous month, or the last day of the previous month
/// when that day does not exist there (e.g. 31.03 -> 29.02).
fn month_back(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };

    NaiveDate::from_ymd_opt(year, month, today.day()).unwrap_or_else(|| {
        // day 1 of the current month always exists
        today.with_day(1).unwrap_or(today) - chrono::Duration::days(1)
    })
}
