/// Dates as they appear in log file names and report file names.
///
/// Log files carry an 8-digit stamp, `log-20230630`, and the report for that log is named after
/// the same day, `report-2023.06.30.html`.  Only the calendar date matters; there is no time zone.
use anyhow::{bail, Result};
use chrono::NaiveDate;

/// Parse a YYYYMMDD stamp.  The stamp must be exactly eight ASCII digits and name a real day.

pub fn parse_log_date(s: &str) -> Result<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|c| c.is_ascii_digit()) {
        bail!("Bad date stamp '{s}'")
    }
    match NaiveDate::parse_from_str(s, "%Y%m%d") {
        Ok(d) => Ok(d),
        Err(_) => bail!("Not a calendar date '{s}'"),
    }
}

pub fn report_date(d: NaiveDate) -> String {
    d.format("%Y.%m.%d").to_string()
}

#[test]
fn test_parse_log_date() {
    let d = parse_log_date("20230228").unwrap();
    assert!(d == NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    assert!(parse_log_date("20240229").is_ok());

    // Not a leap year
    assert!(parse_log_date("20230229").is_err());
    assert!(parse_log_date("20231301").is_err());
    assert!(parse_log_date("2023011").is_err());
    assert!(parse_log_date("202301011").is_err());
    assert!(parse_log_date("2023-1-01").is_err());
    assert!(parse_log_date("").is_err());
}

#[test]
fn test_report_date() {
    let d = NaiveDate::from_ymd_opt(2017, 6, 30).unwrap();
    assert!(report_date(d) == "2017.06.30");
    let d = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    assert!(report_date(d) == "2023.01.02");
}
