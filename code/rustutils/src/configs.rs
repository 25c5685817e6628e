/// Read the run configuration from a YAML (or JSON) file.
///
/// File format:
///
/// A mapping with the following named fields and value types, all optional:
///
///   REPORT_SIZE - integer, the maximum number of rows in a report (default 1000)
///   REPORT_DIR - string, the directory that reports are written to (default ./reports)
///   LOG_DIR - string, the directory that is searched for access logs (default ./log)
///   ERROR_THRESHOLD - number in [0,1], optional, the fraction of unparseable log lines at or
///      above which no report is produced.  If absent, no report is ever withheld.
///   TEMPLATE_PATH - string, optional, the HTML template that the report table is substituted
///      into (default $REPORT_DIR/report.html)
///   LOG_FILE - string, optional, a file that receives the program's own log output, as JSON
///      lines (default stderr)
///
/// Fields present in the file override the defaults; everything else keeps its default.  Any
/// other field is ignored, so that one file can carry settings for other tools.  JSON is accepted
/// because it is a subset of YAML.
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_REPORT_SIZE: usize = 1000;
pub const DEFAULT_REPORT_DIR: &str = "./reports";
pub const DEFAULT_LOG_DIR: &str = "./log";

// See above comment block for field documentation.

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub report_size: usize,
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
    pub error_threshold: Option<f64>,
    pub template_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            report_size: DEFAULT_REPORT_SIZE,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            error_threshold: None,
            template_path: None,
            log_file: None,
        }
    }
}

impl Config {
    /// The template to render, which lives next to the reports unless configured otherwise.

    pub fn template_path(&self) -> PathBuf {
        if let Some(ref p) = self.template_path {
            p.clone()
        } else {
            self.report_dir.join("report.html")
        }
    }
}

/// Since the input is human-generated and every field is optional, I've opted to use the generic
/// parser followed by explicit decoding of the fields, rather than a (derived) strongly-typed
/// parser.  That also lets us name the offending key when a value has the wrong type.

pub fn read_config(filename: &Path) -> Result<Config> {
    let file = File::open(filename)
        .with_context(|| format!("Could not open config file {}", filename.display()))?;
    let reader = BufReader::new(file);
    let v: Value = serde_yaml::from_reader(reader)
        .with_context(|| format!("Could not parse config file {}", filename.display()))?;
    config_from_value(v)
}

fn config_from_value(v: Value) -> Result<Config> {
    let mut cfg: Config = Default::default();
    let fields = match v {
        Value::Object(fields) => fields,
        // An empty file
        Value::Null => return Ok(cfg),
        _ => bail!("Expected a mapping at the top level of the config"),
    };
    if let Some(n) = grab_usize_opt(&fields, "REPORT_SIZE")? {
        cfg.report_size = n;
    }
    if let Some(s) = grab_string_opt(&fields, "REPORT_DIR")? {
        cfg.report_dir = PathBuf::from(s);
    }
    if let Some(s) = grab_string_opt(&fields, "LOG_DIR")? {
        cfg.log_dir = PathBuf::from(s);
    }
    if let Some(x) = grab_f64_opt(&fields, "ERROR_THRESHOLD")? {
        if !(0.0..=1.0).contains(&x) {
            bail!("Field 'ERROR_THRESHOLD' must be in the range [0,1]")
        }
        cfg.error_threshold = Some(x);
    }
    cfg.template_path = grab_string_opt(&fields, "TEMPLATE_PATH")?.map(PathBuf::from);
    cfg.log_file = grab_string_opt(&fields, "LOG_FILE")?.map(PathBuf::from);
    Ok(cfg)
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.to_string())),
        Some(_) => bail!("Field '{name}' must have a string value"),
    }
}

fn grab_usize_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<usize>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(n) = n.as_u64() {
                match usize::try_from(n) {
                    Ok(n) => Ok(Some(n)),
                    Err(_e) => bail!("Field '{name}' must have unsigned integer value"),
                }
            } else {
                bail!("Field '{name}' must have unsigned integer value")
            }
        }
        Some(_) => bail!("Field '{name}' must have unsigned integer value"),
    }
}

fn grab_f64_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(x) => Ok(Some(x)),
            None => bail!("Field '{name}' must have a numeric value"),
        },
        Some(_) => bail!("Field '{name}' must have a numeric value"),
    }
}

#[cfg(test)]
fn config_from_str(s: &str) -> Result<Config> {
    config_from_value(serde_yaml::from_str(s)?)
}

#[test]
fn test_config_defaults() {
    let c = Config::default();
    assert!(c.report_size == 1000);
    assert!(c.report_dir == PathBuf::from("./reports"));
    assert!(c.log_dir == PathBuf::from("./log"));
    assert!(c.error_threshold.is_none());
    assert!(c.template_path() == PathBuf::from("./reports/report.html"));

    // An explicitly empty document is all defaults
    assert!(config_from_str("~").unwrap() == c);
}

// Basic whitebox test that reading a file works and that settings are merged over defaults.

#[test]
fn test_config_file() {
    let c = read_config(Path::new("../tests/rustutils/whitebox-config.yaml")).unwrap();
    assert!(c.report_size == 10);
    assert!(c.report_dir == PathBuf::from("./out"));
    // Not in the file
    assert!(c.log_dir == PathBuf::from("./log"));
    assert!(c.error_threshold == Some(0.5));
    assert!(c.template_path() == PathBuf::from("./templates/report.html"));
    assert!(c.log_file.is_none());

    assert!(read_config(Path::new("../tests/rustutils/no-such-config.yaml")).is_err());
}

#[test]
fn test_config_json() {
    let c = config_from_str(r#"{"LOG_DIR": "/var/log/nginx", "ERROR_THRESHOLD": 1}"#).unwrap();
    assert!(c.log_dir == PathBuf::from("/var/log/nginx"));
    assert!(c.error_threshold == Some(1.0));
    assert!(c.template_path() == PathBuf::from("./reports/report.html"));
}

#[test]
fn test_config_errors() {
    assert!(config_from_str("REPORT_SIZE: -3").is_err());
    assert!(config_from_str("REPORT_SIZE: lots").is_err());
    assert!(config_from_str("REPORT_DIR: 17").is_err());
    assert!(config_from_str("ERROR_THRESHOLD: 1.5").is_err());
    assert!(config_from_str("ERROR_THRESHOLD: high").is_err());
    assert!(config_from_str("- a\n- b\n").is_err());

    // Unknown fields are ignored
    let c = config_from_str("REPORT_SIZE: 3\nSOMETHING_ELSE: true").unwrap();
    assert!(c.report_size == 3);
}
