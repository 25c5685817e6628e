/// An access log is a text log written by a web server (nginx, here) with one *log record* per
/// line, one line per served request.  Log records are found in *log files*, which are rotated
/// daily into a *log directory* and named after the day they cover, `log-YYYYMMDD`, possibly
/// gzip-compressed as `log-YYYYMMDD.gz`.
///
/// The record format is nginx's `ui_short`:
///
///   $remote_addr $remote_user $http_x_real_ip [$time_local] "$request" $status
///   $body_bytes_sent "$http_referer" "$http_user_agent" "$http_x_forwarded_for"
///   "$http_X_REQUEST_ID" "$http_X_RB_USER" $request_time
///
/// Fields are separated by blanks; a field that may contain blanks is enclosed in `[...]` or
/// `"..."`; a field with no value is written as `-`.
///
/// This library has as its fundamental task to turn a log directory into a stream of typed
/// records.  This task breaks down into a number of subtasks:
///
/// - Find the most recent log file in the log directory.
///
/// - Decode the file (plain or gzip) into lines and tokenize each line into fields.
///
/// - Map the fields onto a record, dropping absent values, and count the lines that could not be
///   parsed without stopping the stream.
mod logfile;
mod logtree;
mod tokenizer;

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

// Split a log line into its raw field tokens.

pub use tokenizer::Tokenizer;

// Parse a single line into a LogEntry, or None if the line is malformed.

pub use logfile::parse_line;

// Open a log file (plain or gzip) and return a lazy reader of LogEntry records.

pub use logfile::open_logfile;

// The lazy record reader and the line accounting that it provides once it has been exhausted.

pub use logfile::LogfileReader;
pub use logfile::ParseSummary;

// Find the log file with the latest date in a log directory.

pub use logtree::find_latest_log;

/// Storage encoding of a log file.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Codec {
    Plain,
    Gzip,
}

impl Codec {
    /// Gzip iff the file name ends in `.gz`.

    pub fn from_path(p: &Path) -> Codec {
        match p.extension() {
            Some(ext) if ext == "gz" => Codec::Gzip,
            _ => Codec::Plain,
        }
    }
}

/// One log file selected for processing: where it is, what day it covers, and how it is stored.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileRef {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub codec: Codec,
}

impl LogFileRef {
    pub fn open(&self) -> anyhow::Result<LogfileReader<Box<dyn std::io::BufRead>>> {
        open_logfile(&self.path, self.codec)
    }
}

/// The LogEntry structure holds the fields of one log record.  Every field is a raw string from
/// the log line with brackets or quotes removed; a field is None iff the log had `-` for it.
/// Interpretation (parsing numbers, picking the path out of the request) is left to the client.
///
/// The field order here is the field order on the log line.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    /// Client address.
    pub remote_addr: Option<String>,

    /// Authenticated user, usually absent.
    pub remote_user: Option<String>,

    /// Client address as reported by a fronting proxy.
    pub http_x_real_ip: Option<String>,

    /// Local time of the request, eg `29/Jun/2017:03:50:22 +0300`.
    pub time_local: Option<String>,

    /// The request line, eg `GET /api/v2/banner/25019354 HTTP/1.1`.
    pub request: Option<String>,

    pub status: Option<String>,
    pub body_bytes_sent: Option<String>,
    pub http_referer: Option<String>,
    pub http_user_agent: Option<String>,
    pub http_x_forwarded_for: Option<String>,
    pub request_id: Option<String>,
    pub rb_user: Option<String>,

    /// Time taken to serve the request, in seconds with millisecond resolution, eg `0.390`.
    pub request_time: Option<String>,
}

#[test]
fn test_codec_from_path() {
    assert!(Codec::from_path(Path::new("/var/log/nginx/log-20170630.gz")) == Codec::Gzip);
    assert!(Codec::from_path(Path::new("log-20170630")) == Codec::Plain);
    assert!(Codec::from_path(Path::new("log-20170630.gz.tmp")) == Codec::Plain);
    assert!(Codec::from_path(Path::new("gz")) == Codec::Plain);
}
