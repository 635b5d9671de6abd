use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingPeriodError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must use MM-YYYY format, got {value:?}")]
    Malformed { field: &'static str, value: String },
}

/// Closed timestamp range `[from, to]` covering whole calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl BillingPeriod {
    /// Builds the range from the first instant of the `from` month to the last
    /// second of the `to` month.
    ///
    /// An inverted range (`from` after `to`) is accepted and simply matches
    /// nothing.
    pub fn from_month_range(from: &str, to: &str) -> Result<Self, BillingPeriodError> {
        let from_month = parse_month_start("from", from)?;
        let to_month = parse_month_start("to", to)?;

        let to = to_month
            .checked_add_months(Months::new(1))
            .map(|next_month| next_month - Duration::seconds(1))
            .ok_or_else(|| BillingPeriodError::Malformed {
                field: "to",
                value: to.to_string(),
            })?;

        Ok(Self {
            from: from_month,
            to,
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }
}

fn parse_month_start(field: &'static str, raw: &str) -> Result<DateTime<Utc>, BillingPeriodError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BillingPeriodError::Missing { field });
    }

    let malformed = || BillingPeriodError::Malformed {
        field,
        value: raw.to_string(),
    };

    // chrono accepts single-digit months and longer years, so pin the shape first.
    let (month, year) = raw.split_once('-').ok_or_else(malformed)?;
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if month.len() != 2 || year.len() != 4 || !all_digits(month) || !all_digits(year) {
        return Err(malformed());
    }

    let first_day =
        NaiveDate::parse_from_str(&format!("01-{raw}"), "%d-%m-%Y").map_err(|_| malformed())?;

    Ok(first_day.and_time(NaiveTime::MIN).and_utc())
}
