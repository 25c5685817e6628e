/// Simple parser for access log files.
///
/// NOTE:
///
/// - It's an important feature of this reader that a corrupted record does not stop the stream.
///   Log files are written by a server that may be restarted, rotated or killed at any point, and
///   there will be truncated or garbled lines.  Such a line yields no record, but it is counted,
///   and the count is available from the reader once the input is exhausted, so that the client
///   can decide whether the data as a whole can be trusted.
///
/// - A line that is not UTF-8 is a corrupted line like any other.
///
/// - I/O errors are not corrupted lines.  They are returned to the client and end the stream.
///
/// - The reader is lazy: it reads one line when asked for a record and holds no other data.
use crate::{Codec, LogEntry, Tokenizer};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::cmp::max;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const FIELD_NAMES: [&str; NUM_FIELDS] = [
    "remote_addr",
    "remote_user",
    "http_x_real_ip",
    "time_local",
    "request",
    "status",
    "body_bytes_sent",
    "http_referer",
    "http_user_agent",
    "http_x_forwarded_for",
    "request_id",
    "rb_user",
    "request_time",
];

const NUM_FIELDS: usize = 13;

// The value nginx writes for a variable that is not set.
const ABSENT: &str = "-";

/// Parse one line.  The line must have at least NUM_FIELDS tokens, extra tokens are ignored.

pub fn parse_line(line: &str) -> Option<LogEntry> {
    let mut fields: [Option<String>; NUM_FIELDS] = Default::default();
    let mut tokens = Tokenizer::new(line);
    for field in fields.iter_mut() {
        let tok = tokens.next()?;
        if tok != ABSENT {
            *field = Some(tok.to_string());
        }
    }
    let [
        remote_addr,
        remote_user,
        http_x_real_ip,
        time_local,
        request,
        status,
        body_bytes_sent,
        http_referer,
        http_user_agent,
        http_x_forwarded_for,
        request_id,
        rb_user,
        request_time,
    ] = fields;
    Some(LogEntry {
        remote_addr,
        remote_user,
        http_x_real_ip,
        time_local,
        request,
        status,
        body_bytes_sent,
        http_referer,
        http_user_agent,
        http_x_forwarded_for,
        request_id,
        rb_user,
        request_time,
    })
}

// The name of the first field that a line has no token for, or None if it has all of them.

fn first_missing_field(line: &str) -> Option<&'static str> {
    FIELD_NAMES.get(Tokenizer::new(line).count()).copied()
}

/// Line accounting for one log file.

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// All lines read, good and bad
    pub lines: usize,

    /// Lines that did not yield a record
    pub failed: usize,
}

impl ParseSummary {
    pub fn parsed(&self) -> usize {
        self.lines - self.failed
    }

    /// Fraction of lines that failed to parse.  This is zero for an empty file.

    pub fn error_ratio(&self) -> f64 {
        self.failed as f64 / max(1, self.lines) as f64
    }
}

/// A lazy stream of records from one log file.  Iterate to get the records; when the iterator
/// has returned None, summary() returns the line accounting for the file.

pub struct LogfileReader<R: BufRead> {
    reader: R,
    name: String,
    buf: Vec<u8>,
    summary: ParseSummary,
    exhausted: bool,
    broken: bool,
}

impl<R: BufRead> LogfileReader<R> {
    /// `name` is used for messages only.

    pub fn new(reader: R, name: &str) -> LogfileReader<R> {
        LogfileReader {
            reader,
            name: name.to_string(),
            buf: vec![],
            summary: Default::default(),
            exhausted: false,
            broken: false,
        }
    }

    /// The line accounting, available only once the input has been read to the end.  After an
    /// I/O error it is never available.

    pub fn summary(&self) -> Option<ParseSummary> {
        if self.exhausted {
            Some(self.summary)
        } else {
            None
        }
    }
}

impl<R: BufRead> Iterator for LogfileReader<R> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Result<LogEntry>> {
        while !self.exhausted && !self.broken {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.exhausted = true;
                }
                Ok(_) => {
                    self.summary.lines += 1;
                    let lineno = self.summary.lines;
                    let parsed = match std::str::from_utf8(&self.buf) {
                        Ok(s) => parse_line(s),
                        Err(_) => None,
                    };
                    if let Some(entry) = parsed {
                        tracing::debug!(file = %self.name, line = lineno, "line parsed");
                        return Some(Ok(entry));
                    }
                    self.summary.failed += 1;
                    let text = String::from_utf8_lossy(&self.buf);
                    tracing::warn!(
                        file = %self.name,
                        line = lineno,
                        missing = first_missing_field(&text).unwrap_or("-"),
                        text = %text.trim_end(),
                        "line parse failed"
                    );
                }
                Err(e) => {
                    self.broken = true;
                    return Some(
                        Err(e).with_context(|| format!("Could not read log file {}", self.name)),
                    );
                }
            }
        }
        None
    }
}

/// Open a log file for reading.  The codec decides whether the contents are decompressed; either
/// way the reader produces records from decoded text lines.

pub fn open_logfile(path: &Path, codec: Codec) -> Result<LogfileReader<Box<dyn BufRead>>> {
    let name = path.display().to_string();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(file = %name, "file not found");
            return Err(e).with_context(|| format!("Could not open log file {name}"));
        }
    };
    let reader: Box<dyn BufRead> = match codec {
        Codec::Plain => Box::new(BufReader::new(file)),
        Codec::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
    };
    Ok(LogfileReader::new(reader, &name))
}

#[cfg(test)]
const GOOD_LINE: &str = r#"1.196.116.32 -  - [29/Jun/2017:03:50:22 +0300] "GET /api/v2/banner/25019354 HTTP/1.1" 200 927 "-" "Lynx/2.8.8dev.9 libwww-FM/2.14 SSL-MM/1.4.1 GNUTLS/2.10.5" "-" "1498697422-2190034393-4708-9752759" "dc7161be3" 0.390"#;

#[test]
fn test_parse_line() {
    assert!(FIELD_NAMES[4] == "request" && FIELD_NAMES[NUM_FIELDS - 1] == "request_time");
    let e = parse_line(GOOD_LINE).unwrap();
    assert!(e.remote_addr.as_deref() == Some("1.196.116.32"));
    assert!(e.time_local.as_deref() == Some("29/Jun/2017:03:50:22 +0300"));
    assert!(e.request.as_deref() == Some("GET /api/v2/banner/25019354 HTTP/1.1"));
    assert!(e.status.as_deref() == Some("200"));
    assert!(e.body_bytes_sent.as_deref() == Some("927"));
    assert!(
        e.http_user_agent.as_deref()
            == Some("Lynx/2.8.8dev.9 libwww-FM/2.14 SSL-MM/1.4.1 GNUTLS/2.10.5")
    );
    assert!(e.request_id.as_deref() == Some("1498697422-2190034393-4708-9752759"));
    assert!(e.rb_user.as_deref() == Some("dc7161be3"));
    assert!(e.request_time.as_deref() == Some("0.390"));

    // `-` means absent, never the value "-"
    assert!(e.remote_user.is_none());
    assert!(e.http_x_real_ip.is_none());
    assert!(e.http_referer.is_none());
    assert!(e.http_x_forwarded_for.is_none());

    // Quoted `-` is absent too, but a quoted empty string is a present empty value
    let e = parse_line(r#"a b c [d] "-" f g "" i j k l m"#).unwrap();
    assert!(e.request.is_none());
    assert!(e.http_referer.as_deref() == Some(""));
}

#[test]
fn test_first_missing_field() {
    assert!(first_missing_field("") == Some("remote_addr"));
    assert!(first_missing_field("1.2.3.4 - - [29/Jun/2017:03:50:22 +0300]") == Some("request"));
    assert!(first_missing_field(r#"a b c [d] "e" f g "h" "i" "j" "k" "l""#) == Some("request_time"));
    assert!(first_missing_field(GOOD_LINE).is_none());
}

#[test]
fn test_parse_line_short() {
    // Twelve fields
    assert!(parse_line(r#"a b c [d] "e" f g "h" "i" "j" "k" "l""#).is_none());
    assert!(parse_line("").is_none());
    assert!(parse_line("garbage").is_none());

    // Fourteen are fine, the last is ignored
    let e = parse_line(r#"a b c [d] "e" f g "h" "i" "j" "k" "l" 0.5 extra"#).unwrap();
    assert!(e.request_time.as_deref() == Some("0.5"));
}

// This tests:
//  - N lines with K bad ones yield N-K records and the ratio K/N
//  - a blank line is a bad line
//  - a bad UTF-8 line is a bad line
//  - no summary until the reader is exhausted

#[test]
fn test_reader_accounting() {
    let mut text = Vec::new();
    text.extend_from_slice(GOOD_LINE.as_bytes());
    text.extend_from_slice(b"\nthis line is too short\n\n");
    text.extend_from_slice(GOOD_LINE.as_bytes());
    text.extend_from_slice(b"\n\xff\xfe broken\n");
    text.extend_from_slice(GOOD_LINE.as_bytes());
    let mut reader = LogfileReader::new(&text[..], "test");
    assert!(reader.summary().is_none());
    let first = reader.next().unwrap().unwrap();
    assert!(first.request_time.as_deref() == Some("0.390"));
    assert!(reader.summary().is_none());
    let rest = reader.by_ref().collect::<Result<Vec<LogEntry>>>().unwrap();
    assert!(rest.len() == 2);
    let summary = reader.summary().unwrap();
    assert!(summary.lines == 6);
    assert!(summary.failed == 3);
    assert!(summary.parsed() == 3);
    assert!(summary.error_ratio() == 0.5);
    assert!(reader.next().is_none());
}

#[test]
fn test_reader_empty() {
    let mut reader = LogfileReader::new(&b""[..], "test");
    assert!(reader.next().is_none());
    let summary = reader.summary().unwrap();
    assert!(summary.lines == 0);
    assert!(summary.error_ratio() == 0.0);
}

#[test]
fn test_open_logfile() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();

    let plain = dir.path().join("log-20230101");
    std::fs::write(&plain, format!("{GOOD_LINE}\nbad\n")).unwrap();
    let mut reader = open_logfile(&plain, Codec::Plain).unwrap();
    assert!(reader.by_ref().count() == 1);
    assert!(reader.summary().unwrap() == ParseSummary { lines: 2, failed: 1 });

    let gz = dir.path().join("log-20230102.gz");
    let mut enc = GzEncoder::new(std::fs::File::create(&gz).unwrap(), Compression::default());
    enc.write_all(format!("{GOOD_LINE}\n{GOOD_LINE}\nbad\n").as_bytes()).unwrap();
    enc.finish().unwrap();
    let mut reader = open_logfile(&gz, Codec::Gzip).unwrap();
    let entries = reader.by_ref().collect::<Result<Vec<LogEntry>>>().unwrap();
    assert!(entries.len() == 2);
    assert!(entries[1].rb_user.as_deref() == Some("dc7161be3"));
    assert!(reader.summary().unwrap() == ParseSummary { lines: 3, failed: 1 });

    assert!(open_logfile(&dir.path().join("log-20230103"), Codec::Plain).is_err());
}

#[test]
fn test_open_logfile_bad_gzip() {
    // A plain file read as gzip is an I/O error, which ends the stream without a summary.
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("log-20230101.gz");
    std::fs::write(&p, format!("{GOOD_LINE}\n")).unwrap();
    let mut reader = open_logfile(&p, Codec::Gzip).unwrap();
    assert!(reader.next().unwrap().is_err());
    assert!(reader.next().is_none());
    assert!(reader.summary().is_none());
}
