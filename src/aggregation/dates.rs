// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction date range validation.

use chrono::NaiveDate;

/// A validated inclusive date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// `YYYY-MM-DD`: exactly ten characters, digits apart from the two dashes.
fn has_iso_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    if !has_iso_shape(value) {
        return Err(format!("{field} must use the YYYY-MM-DD format"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field} is not a valid calendar date"))
}

/// Parse both bounds and check their order.
pub fn parse_range(start_date: &str, end_date: &str) -> Result<DateRange, String> {
    let start = parse_date("startDate", start_date)?;
    let end = parse_date("endDate", end_date)?;
    if start > end {
        return Err("startDate must not be after endDate".to_string());
    }
    Ok(DateRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordered_range() {
        let range = parse_range("2024-01-01", "2024-03-31").unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn accepts_single_day() {
        assert!(parse_range("2024-02-29", "2024-02-29").is_ok());
    }

    #[test]
    fn rejects_wrong_shape() {
        for bad in ["2024/01/01", "24-01-01", "2024-1-01", "2024-01-01T00:00", "", "abcd-ef-gh"] {
            assert!(parse_range(bad, "2024-12-31").is_err(), "{bad}");
        }
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        assert!(parse_range("2024-13-40", "2024-12-31").is_err());
        assert!(parse_range("2024-01-01", "2023-02-29").is_err());
    }

    #[test]
    fn rejects_reversed_range() {
        let err = parse_range("2024-12-31", "2024-01-01").unwrap_err();
        assert!(err.contains("after"));
    }
}
