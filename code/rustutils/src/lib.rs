// Misc utilities useful to both accesslog and logreport.

mod configs;
mod dates;

// The run configuration: named settings with documented defaults.

pub use configs::Config;

// Read a configuration file and merge its settings over the defaults.

pub use configs::read_config;

// Parse the YYYYMMDD date stamp found in log file names.

pub use dates::parse_log_date;

// Format a date the way report file names want it, YYYY.MM.DD.

pub use dates::report_date;
