use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::mapping::local_midnight;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn from_bounds(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err("Start date cannot be after end date.".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn label(&self) -> String {
        if self.start == self.end {
            format!("{}", self.start.format("%Y-%m-%d"))
        } else {
            format!(
                "{} → {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            )
        }
    }

    /// Midnight of the first day through midnight after the last day, in `tz`.
    pub fn as_rfc3339(&self, tz: &Tz) -> (String, String) {
        let after_end = self.end.succ_opt().unwrap_or(self.end);
        (
            local_midnight(self.start, tz).to_rfc3339(),
            local_midnight(after_end, tz).to_rfc3339(),
        )
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| "Invalid date format. Use YYYY-MM-DD.".to_string())
}
