/// Compute the report rows from an aggregation: per-URL statistics, ranked by total time.
use crate::aggregate::{Aggregation, UrlBucket};

use serde::Serialize;

/// One row of the report.  The field names and order are part of the report format: the HTML
/// template reads them from the JSON.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub url: String,
    pub count: usize,

    /// Share of all counted requests, in percent.
    pub count_perc: f64,

    /// Sum of request times, in seconds.
    pub time_sum: f64,

    /// Share of the total request time, in percent.
    pub time_perc: f64,

    pub time_avg: f64,
    pub time_max: f64,
    pub time_med: f64,
}

/// Compute a row for every bucket, sort by time_sum descending, and keep the first
/// `report_size` rows.  Buckets with equal time_sum keep their relative order from the
/// aggregation, which is the order in which the URLs were first seen.
///
/// The percentages are not clamped or adjusted, so they need not sum to exactly 100.  With no
/// requests at all the report is empty.

pub fn compute_report(agg: &Aggregation, report_size: usize) -> Vec<ReportRow> {
    if agg.overall_count == 0 {
        return vec![];
    }
    let mut rows = agg
        .buckets
        .iter()
        .map(|b| compute_row(b, agg.overall_count, agg.overall_time_sum))
        .collect::<Vec<ReportRow>>();
    // sort_by is stable
    rows.sort_by(|a, b| b.time_sum.total_cmp(&a.time_sum));
    rows.truncate(report_size);
    rows
}

fn compute_row(bucket: &UrlBucket, overall_count: usize, overall_time_sum: f64) -> ReportRow {
    let mut times = bucket.latencies.clone();
    times.sort_by(f64::total_cmp);
    let time_sum = times.iter().sum::<f64>();
    ReportRow {
        url: bucket.url.to_string(),
        count: bucket.count,
        count_perc: bucket.count as f64 / overall_count as f64 * 100.0,
        time_sum,
        // Zero if every request took no time
        time_perc: if overall_time_sum > 0.0 {
            time_sum / overall_time_sum * 100.0
        } else {
            0.0
        },
        time_avg: time_sum / times.len() as f64,
        time_max: times.last().copied().unwrap_or(0.0),
        time_med: median(&times),
    }
}

// The midpoint of a sorted, nonempty sample: the middle element for odd lengths, the mean of the
// two middle elements for even lengths.

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

#[cfg(test)]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[cfg(test)]
fn aggregation(samples: &[(&str, f64)]) -> Aggregation {
    use crate::aggregate::{entry, Aggregator};
    let mut a = Aggregator::new();
    for (url, t) in samples {
        let request = format!("GET {url} HTTP/1.1");
        let time = t.to_string();
        a.add(&entry(Some(request.as_str()), Some(time.as_str())));
    }
    a.finish()
}

#[test]
fn test_median() {
    assert!(close(median(&[0.1, 0.2, 0.3]), 0.2));
    assert!(close(median(&[0.1, 0.2, 0.3, 0.4]), 0.25));
    assert!(close(median(&[0.7]), 0.7));
    assert!(close(median(&[0.1, 0.3]), 0.2));
}

// Three requests: /a takes 0.1 and 0.3, /b takes 0.2.

#[test]
fn test_compute_report1() {
    let agg = aggregation(&[("/a", 0.1), ("/b", 0.2), ("/a", 0.3)]);
    let rows = compute_report(&agg, 1000);
    assert!(rows.len() == 2);

    assert!(rows[0].url == "/a");
    assert!(rows[0].count == 2);
    assert!(close(rows[0].time_sum, 0.4));
    assert!(close(rows[0].time_avg, 0.2));
    assert!(close(rows[0].time_med, 0.2));
    assert!(close(rows[0].time_max, 0.3));
    assert!(close(rows[0].count_perc, 200.0 / 3.0));
    assert!(close(rows[0].time_perc, 0.4 / 0.6 * 100.0));

    assert!(rows[1].url == "/b");
    assert!(rows[1].count == 1);
    assert!(close(rows[1].time_sum, 0.2));
    assert!(close(rows[1].time_med, 0.2));
    assert!(close(rows[1].time_max, 0.2));
}

#[test]
fn test_compute_report_percentages() {
    let agg = aggregation(&[
        ("/x", 1.5),
        ("/y", 0.25),
        ("/x", 0.5),
        ("/z", 3.0),
        ("/y", 0.125),
        ("/w", 0.0),
        ("/x", 2.0),
    ]);
    let rows = compute_report(&agg, 1000);
    let count_perc = rows.iter().map(|r| r.count_perc).sum::<f64>();
    let time_perc = rows.iter().map(|r| r.time_perc).sum::<f64>();
    assert!((count_perc - 100.0).abs() < 1e-6);
    assert!((time_perc - 100.0).abs() < 1e-6);
    let urls = rows.iter().map(|r| r.url.as_str()).collect::<Vec<&str>>();
    assert!(urls == vec!["/x", "/z", "/y", "/w"]);
    // Latencies are sorted before max and median
    assert!(close(rows[0].time_max, 2.0));
    assert!(close(rows[0].time_med, 1.5));
}

#[test]
fn test_compute_report_ties_and_truncation() {
    // Equal time_sum keeps first-seen order
    let agg = aggregation(&[("/c", 0.5), ("/a", 0.25), ("/b", 0.5), ("/a", 0.25), ("/d", 1.0)]);
    let rows = compute_report(&agg, 1000);
    let urls = rows.iter().map(|r| r.url.as_str()).collect::<Vec<&str>>();
    assert!(urls == vec!["/d", "/c", "/a", "/b"]);

    let rows = compute_report(&agg, 2);
    assert!(rows.len() == 2);
    assert!(rows[0].url == "/d" && rows[1].url == "/c");

    assert!(compute_report(&agg, 0).is_empty());
}

#[test]
fn test_compute_report_empty() {
    assert!(compute_report(&Aggregation::default(), 1000).is_empty());

    // Requests with zero time give zero time_perc, not NaN
    let agg = aggregation(&[("/a", 0.0), ("/b", 0.0)]);
    let rows = compute_report(&agg, 1000);
    assert!(rows.len() == 2);
    assert!(rows.iter().all(|r| r.time_perc == 0.0 && close(r.count_perc, 50.0)));
}

#[test]
fn test_serialize_row() {
    let agg = aggregation(&[("/a", 0.5)]);
    let rows = compute_report(&agg, 1000);
    let s = serde_json::to_string(&rows).unwrap();
    assert!(
        s == r#"[{"url":"/a","count":1,"count_perc":100.0,"time_sum":0.5,"time_perc":100.0,"time_avg":0.5,"time_max":0.5,"time_med":0.5}]"#
    );
}
