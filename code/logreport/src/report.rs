/// Produce the HTML report for the latest access log.
///
/// The report is a template with the marker `$table_json` (or `${table_json}`) somewhere in it;
/// the marker is replaced by the report rows as a JSON array and the result is written to
/// `$REPORT_DIR/report-YYYY.MM.DD.html`, dated by the log.  As in a shell-style template, `$$`
/// stands for a single `$`; every other `$` is left alone.
///
/// A report that already exists is never recomputed or overwritten.  The report is written to a
/// temporary file and renamed into place, so an existing report is always a complete one.
use crate::aggregate::{aggregate_log, Aggregated};
use crate::stats::{compute_report, ReportRow};

use accesslog::find_latest_log;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use rustutils::{report_date, Config};
use std::fs;
use std::path::{Path, PathBuf};

const TABLE_MARKER: &str = "table_json";

/// How a run ended, when it did not fail.

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// There was no log file to process.
    NoLog,

    /// The report for the latest log was already there.
    Existing(PathBuf),

    /// A new report was written.
    Generated(PathBuf),

    /// Too many log lines were bad, carries the share of bad lines.
    ErrorRatioExceeded(f64),
}

pub fn report_path(report_dir: &Path, date: NaiveDate) -> PathBuf {
    report_dir.join(format!("report-{}.html", report_date(date)))
}

/// Substitute the rows into the template text.

pub fn render(template: &str, rows: &[ReportRow]) -> Result<String> {
    let table = serde_json::to_string(rows)?;
    let re = Regex::new(r"\$(?:(\$)|\{([_A-Za-z][_A-Za-z0-9]*)\}|([_A-Za-z][_A-Za-z0-9]*))")?;
    let text = re.replace_all(template, |caps: &Captures| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let name = caps.get(2).or(caps.get(3)).map(|m| m.as_str());
        if name == Some(TABLE_MARKER) {
            table.clone()
        } else {
            caps[0].to_string()
        }
    });
    Ok(text.into_owned())
}

/// Render and write the report.  The report directory is created if necessary.

pub fn write_report(path: &Path, template: &str, rows: &[ReportRow]) -> Result<()> {
    let text = render(template, rows)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create report directory {}", dir.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, text).with_context(|| format!("Could not write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Could not write report {}", path.display()))?;
    Ok(())
}

/// Find the latest log in the configured log directory and produce its report, unless the report
/// already exists or there is no log.

pub fn generate_report(config: &Config) -> Result<Outcome> {
    let Some(log) = find_latest_log(&config.log_dir)? else {
        tracing::info!(log_dir = %config.log_dir.display(), "no log found");
        return Ok(Outcome::NoLog);
    };

    let path = report_path(&config.report_dir, log.date);
    if path.exists() {
        tracing::info!(report = %path.display(), "report exists");
        return Ok(Outcome::Existing(path));
    }

    // Read the template first so that a missing template fails before the log is read.
    let template_path = config.template_path();
    let template = fs::read_to_string(&template_path)
        .with_context(|| format!("Could not read template {}", template_path.display()))?;

    tracing::info!(log = %log.path.display(), "reading log");
    let mut reader = log.open()?;
    match aggregate_log(&mut reader, config.error_threshold)? {
        Aggregated::TooManyErrors(summary) => {
            Ok(Outcome::ErrorRatioExceeded(summary.error_ratio()))
        }
        Aggregated::Complete(agg, summary) => {
            let rows = compute_report(&agg, config.report_size);
            write_report(&path, &template, &rows)?;
            tracing::info!(
                report = %path.display(),
                rows = rows.len(),
                lines = summary.lines,
                failed = summary.failed,
                unusable = agg.unusable,
                "report computed"
            );
            Ok(Outcome::Generated(path))
        }
    }
}

#[cfg(test)]
fn row(url: &str) -> ReportRow {
    ReportRow {
        url: url.to_string(),
        count: 1,
        count_perc: 100.0,
        time_sum: 0.5,
        time_perc: 100.0,
        time_avg: 0.5,
        time_max: 0.5,
        time_med: 0.5,
    }
}

#[cfg(test)]
fn test_config(dir: &Path) -> Config {
    Config {
        report_dir: dir.join("reports"),
        log_dir: dir.join("log"),
        template_path: Some(PathBuf::from("../tests/logreport/report.html")),
        ..Default::default()
    }
}

#[test]
fn test_report_path() {
    let d = NaiveDate::from_ymd_opt(2017, 6, 30).unwrap();
    assert!(
        report_path(Path::new("./reports"), d)
            == PathBuf::from("./reports/report-2017.06.30.html")
    );
}

#[test]
fn test_render() {
    let rows = vec![row("/a")];
    let json = serde_json::to_string(&rows).unwrap();

    let t = render("var table = $table_json;", &rows).unwrap();
    assert!(t == format!("var table = {json};"));
    let t = render("${table_json}${table_json}", &rows).unwrap();
    assert!(t == format!("{json}{json}"));

    // Other names, `$$` and a lone `$` at the end
    let t = render("$(x) $$ $table_jsonx ${other} $table_json$", &rows).unwrap();
    assert!(t == format!("$(x) $ $table_jsonx ${{other}} {json}$"));

    let t = render("[$table_json]", &[]).unwrap();
    assert!(t == "[[]]");
}

#[test]
fn test_write_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new").join("report-2017.06.30.html");
    write_report(&path, "<script>var table = $table_json;</script>\n", &[row("/z")]).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("<script>var table = [{\"url\":\"/z\""));
    assert!(text.ends_with(";</script>\n"));
    // No temporary left behind
    assert!(fs::read_dir(path.parent().unwrap()).unwrap().count() == 1);
}

#[cfg(test)]
const LOG_TEXT: &str = r#"1.196.116.32 -  - [29/Jun/2017:03:50:22 +0300] "GET /a HTTP/1.1" 200 927 "-" "Lynx/2.8.8dev.9" "-" "1498697422-2190034393-4708-9752759" "dc7161be3" 0.1
1.99.174.176 3b81f63526fa8  - [29/Jun/2017:03:50:22 +0300] "GET /b HTTP/1.1" 200 12 "-" "Python-urllib/2.7" "-" "1498697422-32900793-4708-9752770" "-" 0.2
this line is broken
1.169.137.128 -  - [29/Jun/2017:03:50:22 +0300] "GET /a HTTP/1.1" 200 19415 "-" "Slotovod" "-" "1498697422-2118016444-4708-9752769" "712e90144abee9" 0.3
"#;

// End to end: 4 lines, one bad, /a twice and /b once.

#[test]
fn test_generate_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    fs::create_dir_all(&config.log_dir).unwrap();
    fs::write(config.log_dir.join("log-20170629"), LOG_TEXT).unwrap();
    fs::write(config.log_dir.join("log-20170630"), LOG_TEXT).unwrap();

    let expected = config.report_dir.join("report-2017.06.30.html");
    let outcome = generate_report(&config).unwrap();
    assert!(outcome == Outcome::Generated(expected.clone()));

    let text = fs::read_to_string(&expected).unwrap();
    let start = text.find("var table = ").unwrap() + "var table = ".len();
    let end = start + text[start..].find(";\n").unwrap();
    let rows: serde_json::Value = serde_json::from_str(&text[start..end]).unwrap();
    let rows = rows.as_array().unwrap();
    assert!(rows.len() == 2);
    assert!(rows[0]["url"] == "/a");
    assert!(rows[0]["count"] == 2);
    assert!((rows[0]["time_sum"].as_f64().unwrap() - 0.4).abs() < 1e-9);
    assert!((rows[0]["time_avg"].as_f64().unwrap() - 0.2).abs() < 1e-9);
    assert!((rows[0]["time_med"].as_f64().unwrap() - 0.2).abs() < 1e-9);
    assert!(rows[1]["url"] == "/b");
    assert!(rows[1]["count"] == 1);
    assert!((rows[1]["time_sum"].as_f64().unwrap() - 0.2).abs() < 1e-9);

    // Second run finds the report and does not touch it, even if the log changes
    fs::write(config.log_dir.join("log-20170630"), "garbage\n").unwrap();
    let outcome = generate_report(&config).unwrap();
    assert!(outcome == Outcome::Existing(expected.clone()));
    assert!(fs::read_to_string(&expected).unwrap() == text);
}

#[test]
fn test_generate_report_gzip() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    fs::create_dir_all(&config.log_dir).unwrap();
    fs::write(config.log_dir.join("log-20230101"), "").unwrap();
    let gz = fs::File::create(config.log_dir.join("log-20230228.gz")).unwrap();
    let mut enc = GzEncoder::new(gz, Compression::default());
    enc.write_all(LOG_TEXT.as_bytes()).unwrap();
    enc.finish().unwrap();

    let outcome = generate_report(&config).unwrap();
    let expected = config.report_dir.join("report-2023.02.28.html");
    assert!(outcome == Outcome::Generated(expected.clone()));
    assert!(fs::read_to_string(&expected).unwrap().contains("\"url\":\"/b\""));
}

#[test]
fn test_generate_report_no_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    fs::create_dir_all(&config.log_dir).unwrap();
    fs::write(config.log_dir.join("notes.txt"), "").unwrap();
    assert!(generate_report(&config).unwrap() == Outcome::NoLog);
    assert!(!config.report_dir.exists());

    // No log directory at all is an error
    let config = test_config(&dir.path().join("nope"));
    assert!(generate_report(&config).is_err());
}

#[test]
fn test_generate_report_error_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    fs::create_dir_all(&config.log_dir).unwrap();

    // 3 bad of 5 is 0.6
    let mut text = LOG_TEXT.lines().take(2).collect::<Vec<&str>>().join("\n");
    text += "\nbad\nbad\nbad\n";
    fs::write(config.log_dir.join("log-20170630"), text).unwrap();
    config.error_threshold = Some(0.5);
    match generate_report(&config).unwrap() {
        Outcome::ErrorRatioExceeded(r) => assert!((r - 0.6).abs() < 1e-9),
        _ => assert!(false),
    }
    assert!(!config.report_dir.join("report-2017.06.30.html").exists());

    config.error_threshold = Some(0.7);
    assert!(matches!(generate_report(&config).unwrap(), Outcome::Generated(_)));
}

#[test]
fn test_generate_report_empty_log() {
    // Nothing usable is an empty report, not a failure
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    fs::create_dir_all(&config.log_dir).unwrap();
    fs::write(config.log_dir.join("log-20170630"), "").unwrap();
    let outcome = generate_report(&config).unwrap();
    let expected = config.report_dir.join("report-2017.06.30.html");
    assert!(outcome == Outcome::Generated(expected.clone()));
    assert!(fs::read_to_string(&expected).unwrap().contains("var table = [];"));
}

#[test]
fn test_generate_report_no_template() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.template_path = None;
    fs::create_dir_all(&config.log_dir).unwrap();
    fs::write(config.log_dir.join("log-20170630"), LOG_TEXT).unwrap();
    assert!(generate_report(&config).is_err());
}
