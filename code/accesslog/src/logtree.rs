/// Find the log file to process in a log directory.
use crate::{Codec, LogFileRef};

use anyhow::{Context, Result};
use regex::Regex;
use rustutils::parse_log_date;
use std::path::Path;

/// Return the log file with the latest date stamp in `log_dir`, or None if there is none.
///
/// A log file name ends with `log-YYYYMMDD` or `log-YYYYMMDD.gz`; anything may precede the `log-`
/// (nginx-access-ui.log-20170630.gz is a typical name).  Other names are ignored, as are names
/// that are not representable as UTF8 and stamps that are not calendar dates.
///
/// The stamps are fixed-width and zero-padded so they are compared as strings.  If a plain and a
/// compressed file have the same stamp then the plain file is chosen: it is usually the one that
/// is still being written, and it is cheaper to read.
///
/// This returns an error if `log_dir` cannot be read.  Bad directory entries are ignored.

pub fn find_latest_log(log_dir: &Path) -> Result<Option<LogFileRef>> {
    let re = Regex::new(r"log-([0-9]{8})(\.gz)?$")?;
    let rd = log_dir
        .read_dir()
        .with_context(|| format!("Could not list log directory {}", log_dir.display()))?;

    // (stamp, is_gzip, file name)
    let mut best: Option<(String, bool, String)> = None;
    for entry in rd {
        let Ok(entry) = entry else {
            continue;
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(caps) = re.captures(name) else {
            continue;
        };
        let stamp = &caps[1];
        let gzip = caps.get(2).is_some();
        if parse_log_date(stamp).is_err() {
            tracing::warn!(file = name, "ignoring log file with bad date");
            continue;
        }
        let better = match best {
            None => true,
            Some((ref s, g, _)) => stamp > s.as_str() || (stamp == s.as_str() && g && !gzip),
        };
        if better {
            best = Some((stamp.to_string(), gzip, name.to_string()));
        }
    }

    match best {
        None => Ok(None),
        Some((stamp, gzip, name)) => Ok(Some(LogFileRef {
            path: log_dir.join(name),
            date: parse_log_date(&stamp)?,
            codec: if gzip { Codec::Gzip } else { Codec::Plain },
        })),
    }
}

#[cfg(test)]
fn make_tree(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    dir
}

#[test]
fn test_find_latest_log1() {
    let dir = make_tree(&["log-20230101", "log-20230228.gz", "log-20221231"]);
    let log = find_latest_log(dir.path()).unwrap().unwrap();
    assert!(log.path == dir.path().join("log-20230228.gz"));
    assert!(log.date == chrono::NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    assert!(log.codec == Codec::Gzip);
}

#[test]
fn test_find_latest_log2() {
    // Prefixes are allowed; other suffixes, other digit counts and bad dates are not.
    let dir = make_tree(&[
        "nginx-access-ui.log-20170630",
        "nginx-access-ui.log-20170701.bz2",
        "log-201707020",
        "log-2017070",
        "log-20171399",
        "log-20170702.gz.tmp",
        "report-2017.07.03.html",
    ]);
    let log = find_latest_log(dir.path()).unwrap().unwrap();
    assert!(log.path == dir.path().join("nginx-access-ui.log-20170630"));
    assert!(log.codec == Codec::Plain);
}

#[test]
fn test_find_latest_log3() {
    // Same day, plain and compressed
    let dir = make_tree(&["log-20230301.gz", "log-20230301"]);
    let log = find_latest_log(dir.path()).unwrap().unwrap();
    assert!(log.path == dir.path().join("log-20230301"));
    assert!(log.codec == Codec::Plain);
}

#[test]
fn test_find_latest_log4() {
    // Nothing to do is not an error
    let dir = make_tree(&["README", "log-abc"]);
    assert!(find_latest_log(dir.path()).unwrap().is_none());

    // Nonexistent directory is
    assert!(find_latest_log(&dir.path().join("nope")).is_err());
}
