use chrono::{Local, Months, NaiveDate};

use super::error::ProjectionError;

const LABEL_FORMAT: &str = "%B %Y";

/// Parses a `"March 2024"` style label into the first day of that month.
pub fn parse_month_label(label: &str) -> Result<NaiveDate, ProjectionError> {
    let trimmed = label.trim();
    NaiveDate::parse_from_str(&format!("1 {trimmed}"), "%d %B %Y")
        .map_err(|_| ProjectionError::InvalidMonthLabel(label.to_string()))
}

pub fn format_month_label(date: NaiveDate) -> String {
    date.format(LABEL_FORMAT).to_string()
}

/// Label for a row appended after `last`, or for the month containing
/// `today` when the history is empty.
pub fn next_month_label(last: Option<&str>, today: NaiveDate) -> Result<String, ProjectionError> {
    let Some(last) = last else {
        return Ok(format_month_label(today));
    };
    let next = parse_month_label(last)?
        .checked_add_months(Months::new(1))
        .ok_or_else(|| ProjectionError::InvalidMonthLabel(last.to_string()))?;
    Ok(format_month_label(next))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
