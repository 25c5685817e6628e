/// Non-allocating tokenizer for access log lines.
///
/// Here is what we're parsing:
///
///  - the input is one line, without its terminator (a trailing newline is harmless, it is blank)
///  - tokens are separated by runs of blanks (Unicode whitespace)
///  - a token starting with `[` extends to the first following `]`, and the brackets are not part
///    of the token; the token can contain blanks and quotes, and it can be empty
///  - a token starting with `"` extends to the next `"`, and the quotes are not part of the token;
///    the token can contain blanks and brackets, and it can be empty
///  - any other token is a maximal run of non-blank characters
///  - an opening `[` or `"` that is never closed does not start a bracketed or quoted token; it
///    is the first character of a plain token
///  - a closing `]` or `"` need not be followed by a blank: `[a]b` is the two tokens `a` and `b`
///
/// There is no escaping.  nginx escapes `"` inside quoted fields as `\x22`, so this is sufficient
/// for logs written by nginx.
///
/// The tokenizer yields &str slices of the line in order.  It knows nothing about the number or
/// meaning of the fields.

pub struct Tokenizer<'a> {
    line: &'a str,
    ix: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(line: &'a str) -> Tokenizer<'a> {
        Tokenizer { line, ix: 0 }
    }

    // Try to take a token delimited by `open` at the start of `rest` and `close` further on.  The
    // delimiters are ASCII so byte offsets around them are char boundaries.
    fn delimited(&mut self, start: usize, rest: &'a str, open: char, close: char) -> Option<&'a str> {
        if !rest.starts_with(open) {
            return None;
        }
        let n = rest[1..].find(close)?;
        self.ix = start + 1 + n + 1;
        Some(&rest[1..1 + n])
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = &self.line[self.ix..];
        let start = self.ix + (rest.len() - rest.trim_start().len());
        let rest = &self.line[start..];
        if rest.is_empty() {
            self.ix = start;
            return None;
        }

        if let Some(tok) = self.delimited(start, rest, '[', ']') {
            return Some(tok);
        }
        if let Some(tok) = self.delimited(start, rest, '"', '"') {
            return Some(tok);
        }

        let n = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.ix = start + n;
        Some(&rest[..n])
    }
}

#[cfg(test)]
fn tokens(s: &str) -> Vec<&str> {
    Tokenizer::new(s).collect::<Vec<&str>>()
}

// This tests:
//  - a complete, typical line, all 13 fields
//  - blanks inside bracketed and quoted fields
//  - `-` is just a token to the tokenizer

#[test]
fn test_tokenizer1() {
    let line = r#"1.196.116.32 -  - [29/Jun/2017:03:50:22 +0300] "GET /api/v2/banner/25019354 HTTP/1.1" 200 927 "-" "Lynx/2.8.8dev.9 libwww-FM/2.14 SSL-MM/1.4.1 GNUTLS/2.10.5" "-" "1498697422-2190034393-4708-9752759" "dc7161be3" 0.390"#;
    let xs = tokens(line);
    assert!(xs.len() == 13);
    assert!(xs[0] == "1.196.116.32");
    assert!(xs[1] == "-");
    assert!(xs[2] == "-");
    assert!(xs[3] == "29/Jun/2017:03:50:22 +0300");
    assert!(xs[4] == "GET /api/v2/banner/25019354 HTTP/1.1");
    assert!(xs[5] == "200");
    assert!(xs[6] == "927");
    assert!(xs[7] == "-");
    assert!(xs[8] == "Lynx/2.8.8dev.9 libwww-FM/2.14 SSL-MM/1.4.1 GNUTLS/2.10.5");
    assert!(xs[9] == "-");
    assert!(xs[10] == "1498697422-2190034393-4708-9752759");
    assert!(xs[11] == "dc7161be3");
    assert!(xs[12] == "0.390");
}

// This tests:
//  - empty bracketed and quoted fields
//  - leading, trailing and repeated blanks, tabs, and a trailing newline
//  - brackets inside quotes and quotes inside brackets

#[test]
fn test_tokenizer2() {
    let xs = tokens("  a\t[] \"\"   \"x [y] z\" [p \"q\" r]  b \n");
    assert!(xs == vec!["a", "", "", "x [y] z", "p \"q\" r", "b"]);
}

// This tests:
//  - unterminated bracket and quote fall back to plain tokens
//  - a closing delimiter need not be followed by a blank
//  - a quote in the middle of a plain token does not start a quoted token

#[test]
fn test_tokenizer3() {
    assert!(tokens("a [b c") == vec!["a", "[b", "c"]);
    assert!(tokens("a \"b c") == vec!["a", "\"b", "c"]);
    assert!(tokens("[a]b \"c\"d") == vec!["a", "b", "c", "d"]);
    assert!(tokens("ab\"cd ef\"") == vec!["ab\"cd", "ef\""]);
}

// This tests:
//  - empty and blank lines have no tokens
//  - non-ASCII text

#[test]
fn test_tokenizer4() {
    assert!(tokens("").is_empty());
    assert!(tokens(" \t \n").is_empty());
    assert!(tokens("år [Ünïcode ß] \"日本 語\"") == vec!["år", "Ünïcode ß", "日本 語"]);

    // Exhausted stays exhausted
    let mut t = Tokenizer::new("x");
    assert!(t.next() == Some("x"));
    assert!(t.next().is_none());
    assert!(t.next().is_none());
}
