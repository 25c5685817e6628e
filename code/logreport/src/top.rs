/// The `top` command: rank the URLs of one log file as for the report, but print the rows to
/// stdout instead of rendering HTML.  The log is the one given by `--logfile` or else the latest
/// one in the log directory; an existing report does not matter here.
use crate::aggregate::{aggregate_log, Aggregated};
use crate::format;
use crate::stats::{compute_report, ReportRow};

use accesslog::{find_latest_log, open_logfile, Codec};
use anyhow::Result;
use rustutils::Config;
use std::collections::HashMap;
use std::io;
use std::path::Path;

pub fn print_top(output: &mut dyn io::Write, fmt: &Option<String>, rows: &[ReportRow]) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, rows)
}

/// Aggregate and print.  Nothing is printed if there is no log or if the log has too many bad
/// lines; both are logged.

pub fn run_top(
    output: &mut dyn io::Write,
    config: &Config,
    logfile: Option<&Path>,
    fmt: &Option<String>,
) -> Result<()> {
    let mut reader = match logfile {
        Some(p) => open_logfile(p, Codec::from_path(p))?,
        None => match find_latest_log(&config.log_dir)? {
            Some(log) => log.open()?,
            None => {
                tracing::info!(log_dir = %config.log_dir.display(), "no log found");
                return Ok(());
            }
        },
    };
    match aggregate_log(&mut reader, config.error_threshold)? {
        Aggregated::TooManyErrors(_) => Ok(()),
        Aggregated::Complete(agg, _) => {
            print_top(output, fmt, &compute_report(&agg, config.report_size))
        }
    }
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "url,count,time_sum,time_avg,time_med";

type RowFormatter = &'static dyn Fn(&ReportRow) -> String;

fn my_formatters() -> (HashMap<String, RowFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, RowFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("url".to_string(), &format_url);
    formatters.insert("count".to_string(), &format_count);
    formatters.insert("count_perc".to_string(), &format_count_perc);
    formatters.insert("count%".to_string(), &format_count_perc);
    formatters.insert("time_sum".to_string(), &format_time_sum);
    formatters.insert("time_perc".to_string(), &format_time_perc);
    formatters.insert("time%".to_string(), &format_time_perc);
    formatters.insert("time_avg".to_string(), &format_time_avg);
    formatters.insert("time_max".to_string(), &format_time_max);
    formatters.insert("time_med".to_string(), &format_time_med);

    aliases.insert(
        "all".to_string(),
        vec![
            "url".to_string(),
            "count".to_string(),
            "count_perc".to_string(),
            "time_sum".to_string(),
            "time_perc".to_string(),
            "time_avg".to_string(),
            "time_max".to_string(),
            "time_med".to_string(),
        ],
    );
    aliases.insert(
        "default".to_string(),
        FMT_DEFAULTS.split(',').map(|s| s.to_string()).collect(),
    );

    (formatters, aliases)
}

fn format_url(r: &ReportRow) -> String {
    r.url.clone()
}

fn format_count(r: &ReportRow) -> String {
    r.count.to_string()
}

fn format_count_perc(r: &ReportRow) -> String {
    format!("{:.3}", r.count_perc)
}

fn format_time_sum(r: &ReportRow) -> String {
    format!("{:.3}", r.time_sum)
}

fn format_time_perc(r: &ReportRow) -> String {
    format!("{:.3}", r.time_perc)
}

fn format_time_avg(r: &ReportRow) -> String {
    format!("{:.3}", r.time_avg)
}

fn format_time_max(r: &ReportRow) -> String {
    format!("{:.3}", r.time_max)
}

fn format_time_med(r: &ReportRow) -> String {
    format!("{:.3}", r.time_med)
}

#[cfg(test)]
fn rows() -> Vec<ReportRow> {
    vec![
        ReportRow {
            url: "/a".to_string(),
            count: 2,
            count_perc: 200.0 / 3.0,
            time_sum: 0.4,
            time_perc: 0.4 / 0.6 * 100.0,
            time_avg: 0.2,
            time_max: 0.3,
            time_med: 0.2,
        },
        ReportRow {
            url: "/b".to_string(),
            count: 1,
            count_perc: 100.0 / 3.0,
            time_sum: 0.2,
            time_perc: 0.2 / 0.6 * 100.0,
            time_avg: 0.2,
            time_max: 0.2,
            time_med: 0.2,
        },
    ]
}

#[cfg(test)]
fn run_print(fmt: Option<&str>, rows: &[ReportRow]) -> String {
    let mut out = Vec::new();
    print_top(&mut out, &fmt.map(|s| s.to_string()), rows).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_print_top() {
    let rows = rows();
    assert!(
        run_print(None, &rows)
            == "url  count  time_sum  time_avg  time_med\n\
                /a   2      0.400     0.200     0.200\n\
                /b   1      0.200     0.200     0.200\n"
    );
    assert!(run_print(Some("url,count%,time%,csv"), &rows) == "/a,66.667,66.667\n/b,33.333,33.333\n");
    assert!(
        run_print(Some("default,csv,header"), &rows)
            == "url,count,time_sum,time_avg,time_med\n/a,2,0.400,0.200,0.200\n/b,1,0.200,0.200,0.200\n"
    );
    assert!(run_print(Some("url,time_max,json"), &rows[1..]) == "[{\"url\":\"/b\",\"time_max\":\"0.200\"}]\n");
    assert!(run_print(Some("all,noheader"), &[]) == "");
}

#[test]
fn test_print_top_bad_fmt() {
    let mut out = Vec::new();
    assert!(print_top(&mut out, &Some("csv,nothing".to_string()), &rows()).is_err());
}

#[test]
fn test_fmt_help() {
    let help = fmt_help();
    assert!(help.fields.len() == 10);
    assert!(help.aliases.iter().any(|(k, _)| k == "all"));
    assert!(help.defaults == FMT_DEFAULTS);
}

#[test]
fn test_run_top() {
    use crate::aggregate::logline;
    use std::fs;

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        log_dir: dir.path().join("log"),
        report_size: 1,
        ..Default::default()
    };
    fs::create_dir_all(&config.log_dir).unwrap();
    let text = [
        logline("GET /a HTTP/1.1", "0.1"),
        logline("GET /b HTTP/1.1", "0.5"),
        logline("GET /a HTTP/1.1", "0.3"),
    ]
    .join("\n");
    fs::write(config.log_dir.join("log-20170630"), &text).unwrap();

    let mut out = Vec::new();
    run_top(&mut out, &config, None, &Some("url,count,csv".to_string())).unwrap();
    assert!(String::from_utf8(out).unwrap() == "/b,1\n");

    // An explicit log file need not be in the log directory, nor be named for a date
    let other = dir.path().join("access.log");
    fs::write(&other, logline("GET /c HTTP/1.1", "1.0")).unwrap();
    let mut out = Vec::new();
    run_top(&mut out, &config, Some(&other), &Some("url,csv".to_string())).unwrap();
    assert!(String::from_utf8(out).unwrap() == "/c\n");

    // No log, no output, no error
    let empty = Config {
        log_dir: dir.path().join("empty"),
        ..Default::default()
    };
    fs::create_dir_all(&empty.log_dir).unwrap();
    let mut out = Vec::new();
    run_top(&mut out, &empty, None, &None).unwrap();
    assert!(out.is_empty());

    // A missing explicit log file is an error
    let mut out = Vec::new();
    assert!(run_top(&mut out, &config, Some(&dir.path().join("nope")), &None).is_err());
}
