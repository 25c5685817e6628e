/// Generic formatting code for a set of rows to be presented columnar, as csv, or as json, and
/// (except for json) with or without a header.
///
/// A client provides a table of named formatters, each turning one datum into a string, and a
/// table of aliases naming groups of formatters.  The user's field spec is a comma-separated list
/// of formatter names, alias names, and control words.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

/// If the spec asks for help, print it and return true.

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    let Some(s) = fmt else {
        return false;
    };
    if !s.starts_with("help") {
        return false;
    }
    let mut help = f();
    println!("Syntax:\n  --fmt=(field|alias|control),...");
    println!("\nFields:");
    help.fields.sort();
    for f in help.fields {
        println!("  {f}");
    }
    if !help.aliases.is_empty() {
        println!("\nAliases:");
        help.aliases.sort();
        for (name, fields) in help.aliases {
            println!("  {name} --> {}", fields.join(","));
        }
    }
    println!("\nDefaults:\n  {}", help.defaults);
    println!("\nControl:\n  csv\n  fixed\n  json\n  header\n  noheader");
    true
}

/// Return a vector of the known fields in `spec` wrt the formatters, in order, and a HashSet of
/// any other strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, FmtT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)>
where
    FmtT: Fn(&DataT) -> String,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(expansion) = aliases.get(x) {
            for name in expansion {
                if formatters.contains_key(name) {
                    fields.push(name.as_str());
                } else {
                    others.insert(name.as_str());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv explicitly requested
    pub header: bool, // fixed gets a header by default, csv only on request, json never
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csv = others.contains("csv");
    let json = others.contains("json") && !csv;
    let header = (!csv && !json && !others.contains("noheader")) || (csv && others.contains("header"));
    FormatOptions { csv, json, header }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data` to produce a table of strings, which is then printed according to
/// `opts`.

pub fn format_data<DataT, FmtT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: &[DataT],
) -> Result<()>
where
    FmtT: Fn(&DataT) -> String,
{
    // Look the formatters up once, not once per datum.
    let mut fmts = Vec::with_capacity(fields.len());
    for kwd in fields {
        match formatters.get(*kwd) {
            Some(f) => fmts.push(f),
            None => bail!("Unknown field {kwd}"),
        }
    }
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        format_csv(output, fields, opts, rows)
    } else if opts.json {
        format_json(output, fields, rows)
    } else {
        format_fixed_width(output, fields, opts, rows);
        Ok(())
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) {
    // The column width is the max across all the entries in the column (including header,
    // if present).
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (w, kwd) in widths.iter_mut().zip(fields) {
            *w = usize::max(*w, kwd.len());
        }
    }
    for row in &rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.chars().count());
        }
    }

    let mut lines = vec![];
    if opts.header {
        lines.push(fields.iter().map(|s| s.to_string()).collect::<Vec<String>>());
    }
    lines.extend(rows);
    for line in lines {
        let mut s = "".to_string();
        for (val, w) in line.iter().zip(&widths) {
            s += format!("{:w$}  ", val).as_str();
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write_all(s.trim_end().as_bytes());
        let _ = output.write_all(b"\n");
    }
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_writer(output);
    if opts.header {
        writer.write_record(fields)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
    let objects = rows
        .into_iter()
        .map(|row| {
            fields
                .iter()
                .map(|f| f.to_string())
                .zip(row.into_iter().map(serde_json::Value::String))
                .collect::<serde_json::Map<String, serde_json::Value>>()
        })
        .collect::<Vec<_>>();
    serde_json::to_writer(&mut *output, &objects)?;
    output.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
type TestFmt = &'static dyn Fn(&(u32, &'static str)) -> String;

#[cfg(test)]
fn test_formatters() -> (HashMap<String, TestFmt>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, TestFmt> = HashMap::new();
    formatters.insert("n".to_string(), &|d| d.0.to_string());
    formatters.insert("s".to_string(), &|d| d.1.to_string());
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["s".to_string(), "n".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn run_format(spec: &str, data: &[(u32, &'static str)]) -> String {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, data).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_parse_fields() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("n,all,csv,bogus", &formatters, &aliases).unwrap();
    assert!(fields == vec!["n", "s", "n"]);
    assert!(others.len() == 2 && others.contains("csv") && others.contains("bogus"));
    assert!(parse_fields("csv,header", &formatters, &aliases).is_err());
}

#[test]
fn test_format_data() {
    let data = [(7, "/a"), (12345, "/bb, c")];
    assert!(run_format("s,n", &data) == "s       n\n/a      7\n/bb, c  12345\n");
    assert!(run_format("s,n,noheader", &data) == "/a      7\n/bb, c  12345\n");
    assert!(run_format("n,s,csv", &data) == "7,/a\n12345,\"/bb, c\"\n");
    assert!(run_format("n,csv,header", &data) == "n\n7\n12345\n");
    assert!(run_format("all,json", &data) == "[{\"s\":\"/a\",\"n\":\"7\"},{\"s\":\"/bb, c\",\"n\":\"12345\"}]\n");
}
