/// Bucket the records of one log file by request path.
///
/// Every record whose request names a path (the first blank-separated part of the request that
/// starts with `/`) contributes one sample, its request_time, to the bucket for that path.
/// Records without a path are skipped, as are records whose request_time is missing or not a
/// finite, nonnegative number; the latter are counted as unusable and logged since they indicate a broken log format
/// rather than an odd request.
///
/// Buckets are kept in the order in which their paths were first seen.  Ranking later depends on
/// this order to break ties.
use accesslog::{LogEntry, LogfileReader, ParseSummary};

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use ustr::Ustr;

pub struct UrlBucket {
    pub url: Ustr,
    pub count: usize,

    /// In insertion order.
    pub latencies: Vec<f64>,
}

#[derive(Default)]
pub struct Aggregation {
    pub buckets: Vec<UrlBucket>,
    pub overall_count: usize,
    pub overall_time_sum: f64,
    pub unusable: usize,
}

#[derive(Default)]
pub struct Aggregator {
    index: HashMap<Ustr, usize>,
    agg: Aggregation,
}

impl Aggregator {
    pub fn new() -> Aggregator {
        Default::default()
    }

    pub fn add(&mut self, e: &LogEntry) {
        let Some(url) = request_path(e.request.as_deref()) else {
            return;
        };
        let time = match e.request_time.as_deref().map(f64::from_str) {
            Some(Ok(t)) if t.is_finite() && t >= 0.0 => t,
            _ => {
                tracing::warn!(url, request_time = ?e.request_time, "unusable request time");
                self.agg.unusable += 1;
                return;
            }
        };
        let url = Ustr::from(url);
        let ix = match self.index.get(&url) {
            Some(ix) => *ix,
            None => {
                self.agg.buckets.push(UrlBucket {
                    url,
                    count: 0,
                    latencies: vec![],
                });
                self.index.insert(url, self.agg.buckets.len() - 1);
                self.agg.buckets.len() - 1
            }
        };
        let bucket = &mut self.agg.buckets[ix];
        bucket.count += 1;
        bucket.latencies.push(time);
        self.agg.overall_count += 1;
        self.agg.overall_time_sum += time;
    }

    pub fn finish(self) -> Aggregation {
        self.agg
    }
}

/// The path part of a request line, eg `/api/v2/banner/25019354` from
/// `GET /api/v2/banner/25019354 HTTP/1.1`.

pub fn request_path(request: Option<&str>) -> Option<&str> {
    request?.split_whitespace().find(|p| p.starts_with('/'))
}

pub enum Aggregated {
    Complete(Aggregation, ParseSummary),

    /// Too large a share of the lines were bad, the data were discarded.
    TooManyErrors(ParseSummary),
}

/// Drain the reader into an aggregation.  I/O errors from the reader are returned as errors.
/// Once the reader is exhausted, if `error_threshold` is Some(t) and the share of bad lines is t
/// or more then the aggregation is dropped.

pub fn aggregate_log<R: BufRead>(
    reader: &mut LogfileReader<R>,
    error_threshold: Option<f64>,
) -> Result<Aggregated> {
    let mut aggregator = Aggregator::new();
    for entry in reader.by_ref() {
        aggregator.add(&entry?);
    }
    let Some(summary) = reader.summary() else {
        bail!("Log reader stopped before the end of the input")
    };
    if let Some(threshold) = error_threshold {
        let error_ratio = summary.error_ratio();
        if error_ratio >= threshold {
            tracing::error!(
                error_ratio,
                threshold,
                lines = summary.lines,
                failed = summary.failed,
                "error ratio too high"
            );
            return Ok(Aggregated::TooManyErrors(summary));
        }
    }
    Ok(Aggregated::Complete(aggregator.finish(), summary))
}

#[cfg(test)]
pub fn entry(request: Option<&str>, request_time: Option<&str>) -> LogEntry {
    LogEntry {
        request: request.map(|s| s.to_string()),
        request_time: request_time.map(|s| s.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
pub fn logline(request: &str, request_time: &str) -> String {
    format!(
        r#"1.169.137.128 -  - [29/Jun/2017:03:50:23 +0300] "{request}" 200 1002 "-" "Configovod" "-" "1498697423-2118016444-4708-9752777" "712e90144abee9" {request_time}"#
    )
}

#[test]
fn test_request_path() {
    assert!(request_path(Some("GET /api/v2/banner/1 HTTP/1.1")) == Some("/api/v2/banner/1"));
    assert!(request_path(Some("/only")) == Some("/only"));
    assert!(request_path(Some("POST  http://x/y /z HTTP/1.0")) == Some("/z"));
    assert!(request_path(Some("0")).is_none());
    assert!(request_path(Some("")).is_none());
    assert!(request_path(None).is_none());
}

#[test]
fn test_aggregator() {
    let mut a = Aggregator::new();
    a.add(&entry(Some("GET /b HTTP/1.1"), Some("0.2")));
    a.add(&entry(Some("GET /a HTTP/1.1"), Some("0.3")));
    a.add(&entry(Some("GET /b HTTP/1.1"), Some("0.1")));
    // No path, no request, no time, bad time
    a.add(&entry(Some("\\x16\\x03\\x01"), Some("0.5")));
    a.add(&entry(None, Some("0.5")));
    a.add(&entry(Some("GET /a HTTP/1.1"), None));
    a.add(&entry(Some("GET /a HTTP/1.1"), Some("fast")));
    let agg = a.finish();

    assert!(agg.buckets.len() == 2);
    assert!(agg.buckets[0].url.as_str() == "/b");
    assert!(agg.buckets[0].count == 2);
    assert!(agg.buckets[0].latencies == vec![0.2, 0.1]);
    assert!(agg.buckets[1].url.as_str() == "/a");
    assert!(agg.buckets[1].count == 1);
    assert!(agg.overall_count == 3);
    assert!((agg.overall_time_sum - 0.6).abs() < 1e-9);
    assert!(agg.unusable == 2);
}

#[test]
fn test_aggregator_bad_times() {
    // Parseable as f64 but not a duration
    let mut a = Aggregator::new();
    a.add(&entry(Some("GET /a HTTP/1.1"), Some("0.5")));
    a.add(&entry(Some("GET /b HTTP/1.1"), Some("nan")));
    a.add(&entry(Some("GET /c HTTP/1.1"), Some("-0.25")));
    a.add(&entry(Some("GET /d HTTP/1.1"), Some("inf")));
    a.add(&entry(Some("GET /a HTTP/1.1"), Some("0")));
    let agg = a.finish();

    assert!(agg.unusable == 3);
    assert!(agg.buckets.len() == 1);
    assert!(agg.buckets[0].url.as_str() == "/a");
    assert!(agg.buckets[0].latencies == vec![0.5, 0.0]);
    assert!(agg.overall_count == 2);
    assert!(agg.overall_time_sum == 0.5);
}

#[test]
fn test_aggregate_log() {
    let text = [
        logline("GET /a HTTP/1.1", "0.1"),
        "this is not a log line".to_string(),
        logline("GET /b HTTP/1.1", "0.2"),
        logline("GET /a HTTP/1.1", "0.3"),
    ]
    .join("\n");
    let mut reader = LogfileReader::new(text.as_bytes(), "test");
    match aggregate_log(&mut reader, None).unwrap() {
        Aggregated::Complete(agg, summary) => {
            assert!(summary.lines == 4);
            assert!(summary.failed == 1);
            assert!(agg.overall_count == 3);
            assert!(agg.buckets.len() == 2);
        }
        Aggregated::TooManyErrors(_) => assert!(false),
    }

    // 1 of 4 is 0.25, right at the threshold
    let mut reader = LogfileReader::new(text.as_bytes(), "test");
    match aggregate_log(&mut reader, Some(0.25)).unwrap() {
        Aggregated::Complete(_, _) => assert!(false),
        Aggregated::TooManyErrors(summary) => assert!(summary.error_ratio() == 0.25),
    }

    let mut reader = LogfileReader::new(text.as_bytes(), "test");
    assert!(matches!(
        aggregate_log(&mut reader, Some(0.3)).unwrap(),
        Aggregated::Complete(_, _)
    ));
}

#[test]
fn test_aggregate_log_threshold() {
    // 3 bad lines of 5 is 0.6, over a threshold of 0.5
    let text = [
        logline("GET /a HTTP/1.1", "0.1"),
        "bad".to_string(),
        "bad".to_string(),
        logline("GET /a HTTP/1.1", "0.1"),
        "bad".to_string(),
    ]
    .join("\n");
    let mut reader = LogfileReader::new(text.as_bytes(), "test");
    match aggregate_log(&mut reader, Some(0.5)).unwrap() {
        Aggregated::Complete(_, _) => assert!(false),
        Aggregated::TooManyErrors(summary) => {
            assert!(summary.failed == 3);
            assert!((summary.error_ratio() - 0.6).abs() < 1e-9);
        }
    }
}
