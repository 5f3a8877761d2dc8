use std::fmt;
use std::str::FromStr;

use jiff::civil::{date, Date};
use jiff::Zoned;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// A calendar month, e.g. 2017-07.  Parsed from the compact `YYYYMM` form
/// used in the SAM extract file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i16,
    month: i8,
}

impl Month {
    pub fn new(year: i16, month: i8) -> Result<Month, ParseError> {
        if !(0..=9999).contains(&year) {
            return Err(ParseError(format!("Year {} is out of range", year)));
        }
        if !(1..=12).contains(&month) {
            return Err(ParseError(format!("Month of year {} is not in 1..12", month)));
        }
        Ok(Month { year, month })
    }

    /// The month containing the current system time.
    pub fn current() -> Month {
        Month::containing(Zoned::now().date())
    }

    pub fn containing(date: Date) -> Month {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i16 {
        self.year
    }

    pub fn month(&self) -> i8 {
        self.month
    }

    pub fn start_date(&self) -> Date {
        date(self.year, self.month, 1)
    }

    /// The compact form, e.g. "201707"
    pub fn yyyymm(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ParseError;

    /// Parse exactly six ASCII digits, the last two being a month in 1..12.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError(format!("Failed parsing {} as a YYYYMM month", s)));
        }
        let year = s[..4]
            .parse::<i16>()
            .map_err(|e| ParseError(format!("Failed parsing year of {}: {}", s, e)))?;
        let month = s[4..]
            .parse::<i8>()
            .map_err(|e| ParseError(format!("Failed parsing month of {}: {}", s, e)))?;
        Month::new(year, month)
    }
}
