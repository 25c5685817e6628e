/// `logreport` -- Report on request latency per URL from web server access logs
///
/// Run with --help for brief help.
///
/// `logreport report` finds the latest log in the log directory and writes the HTML report for
/// it, unless that report already exists.  The path of the report is printed on stdout.  A
/// missing log and a log with too many bad lines are not failures; they are logged and nothing is
/// printed.
///
/// `logreport top` does the same analysis but prints the ranked rows on stdout and writes no
/// report.
///
/// The exit status is 1 on failure (bad config, unreadable directory or file) and 0 otherwise.
mod aggregate;
mod format;
mod logging;
mod report;
mod stats;
mod top;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rustutils::{read_config, Config};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Write the HTML report for the latest log, if it is not there already
    Report(ReportCmdArgs),

    /// Print the top URLs by total request time for the latest log or a given log file
    Top(TopCmdArgs),
}

#[derive(Args, Debug)]
pub struct ReportCmdArgs {
    #[command(flatten)]
    config_args: ConfigArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct TopCmdArgs {
    #[command(flatten)]
    config_args: ConfigArgs,

    /// Read this log file instead of the latest one in the log directory, gzip if named *.gz
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Select fields and format for the output, "help" for a list [default: url,count,time_sum,time_avg,time_med]
    #[arg(long)]
    fmt: Option<String>,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML (or JSON) file with REPORT_SIZE, REPORT_DIR, LOG_DIR, ERROR_THRESHOLD, TEMPLATE_PATH,
    /// and LOG_FILE settings [default: none, use built-in defaults]
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Log at debug level, including every parsed line
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Log JSON lines to stderr (always the case with LOG_FILE)
    #[arg(long, default_value_t = false)]
    json_log: bool,
}

fn main() {
    match logreport() {
        Ok(()) => {}
        Err(msg) => {
            let text = format!("{msg:#}");
            tracing::error!(error = text.as_str(), "failed to compute report");
            eprintln!("ERROR: {}", text);
            process::exit(1);
        }
    }
}

fn logreport() -> Result<()> {
    let cli = Cli::parse();

    let (config_args, meta_args) = match cli.command {
        Commands::Version => {
            println!("{}", version_text());
            return Ok(());
        }
        Commands::Report(ref args) => (&args.config_args, &args.meta_args),
        Commands::Top(ref args) => {
            if format::maybe_help(&args.fmt, &top::fmt_help) {
                return Ok(());
            }
            (&args.config_args, &args.meta_args)
        }
    };

    let config = match config_args.config {
        Some(ref path) => read_config(path)?,
        None => Config::default(),
    };
    logging::init_logging(config.log_file.as_deref(), meta_args.verbose, meta_args.json_log)?;

    match cli.command {
        Commands::Report(_) => match report::generate_report(&config)? {
            report::Outcome::Generated(path) | report::Outcome::Existing(path) => {
                println!("{}", path.display());
            }
            report::Outcome::NoLog | report::Outcome::ErrorRatioExceeded(_) => {}
        },
        Commands::Top(ref args) => {
            let mut output = io::stdout();
            top::run_top(&mut output, &config, args.logfile.as_deref(), &args.fmt)?;
            output.flush()?;
        }
        Commands::Version => {}
    }
    Ok(())
}

fn version_text() -> String {
    format!("logreport version({})", env!("CARGO_PKG_VERSION"))
}

#[test]
fn test_version_text() {
    assert!(version_text() == format!("logreport version({})", env!("CARGO_PKG_VERSION")));
    assert!(!version_text().contains("features"));
}

#[test]
fn test_cli() {
    let cli = Cli::try_parse_from(["logreport", "top", "--config", "x.yaml", "--fmt", "all,csv", "-v"])
        .unwrap();
    let Commands::Top(args) = cli.command else {
        panic!("Expected top");
    };
    assert!(args.config_args.config == Some(PathBuf::from("x.yaml")));
    assert!(args.fmt.as_deref() == Some("all,csv"));
    assert!(args.logfile.is_none());
    assert!(args.meta_args.verbose && !args.meta_args.json_log);

    let cli = Cli::try_parse_from(["logreport", "report", "--json-log"]).unwrap();
    let Commands::Report(args) = cli.command else {
        panic!("Expected report");
    };
    assert!(args.config_args.config.is_none());
    assert!(args.meta_args.json_log);

    assert!(Cli::try_parse_from(["logreport", "report", "--fmt", "csv"]).is_err());
}
