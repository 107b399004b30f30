//! Line oriented record splitter for Fortran namelist text.
//!
//! A record opens with a line starting with the open marker (`&NAME`) and closes with a line
//! starting with the close marker (`/`). Lines in between are kept verbatim. The first
//! meaningful line found outside of any record ends the scan, it and everything after it is
//! handed back as the residual.

use indexmap::IndexMap;
use regex::Regex;
use log::debug;


/// Record name -> blocks, each block is the raw lines of one occurrence of the record.
pub type Records = IndexMap<String, Vec<Vec<String>>>;


#[derive(Debug, Clone)]
pub struct RecordParser {
    open:  Regex,
    close: Regex,
}


impl Default for RecordParser {
    fn default() -> Self {
        Self::new("&", "/")
    }
}


#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedRecords {
    pub records:  Records,
    pub residual: Vec<String>,
}


impl RecordParser {
    pub fn new(open_marker: &str, close_marker: &str) -> Self {
        // Both patterns are built from escaped literals, they always compile.
        let open  = Regex::new(&format!(r"^\s*{}", regex::escape(open_marker))).unwrap();
        let close = Regex::new(&format!(r"^\s*{}", regex::escape(close_marker))).unwrap();
        Self { open, close }
    }

    /// Blank lines and comment lines are skipped between records instead of ending the scan.
    fn is_filler(line: &str) -> bool {
        let t = line.trim();
        t.is_empty() || t.starts_with('!') || t.starts_with('#')
    }

    pub fn parse<I, S>(&self, lines: I) -> ParsedRecords
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Records::new();
        let mut residual = vec![];
        let mut current: Option<(String, Vec<String>)> = None;

        let mut it = lines.into_iter();
        while let Some(line) = it.next() {
            let line = line.as_ref();

            if let Some(m) = self.open.find(line) {
                if let Some((name, block)) = current.take() {
                    debug!("Record `{}` reopened before being closed", name);
                    Self::flush(&mut records, name, block);
                }
                let name = line[m.end() ..].trim().to_string();
                current = Some((name, vec![]));
                continue;
            }

            if self.close.is_match(line) {
                if let Some((name, block)) = current.take() {
                    records.entry(name).or_insert_with(Vec::new).push(block);
                }
                continue;
            }

            match current.as_mut() {
                Some((_, block)) => block.push(line.to_string()),
                None if Self::is_filler(line) => continue,
                None => {
                    residual.push(line.to_string());
                    residual.extend(it.by_ref().map(|l| l.as_ref().to_string()));
                    break;
                }
            }
        }

        if let Some((name, block)) = current.take() {
            Self::flush(&mut records, name, block);
        }

        ParsedRecords { records, residual }
    }

    pub fn parse_str(&self, text: &str) -> ParsedRecords {
        self.parse(text.lines())
    }

    fn flush(records: &mut Records, name: String, block: Vec<String>) {
        if !block.is_empty() {
            records.entry(name).or_insert_with(Vec::new).push(block);
        }
    }
}


/// Split the assignments of one namelist line.
///
/// Each assignment is split once on its first `=` and both sides are trimmed. Several
/// assignments may share a line when separated by commas; a comma separated piece without
/// `=` continues the previous value (`celldm = 1.0, 2.0`). Inline `!` comments are dropped.
pub fn split_assignments(line: &str) -> Vec<(String, String)> {
    let mut ret: Vec<(String, String)> = vec![];
    for piece in split_top_level(strip_comment(line), ',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match piece.split_once('=') {
            Some((key, value)) => ret.push((key.trim().to_string(), value.trim().to_string())),
            None => if let Some((_, value)) = ret.last_mut() {
                value.push_str(", ");
                value.push_str(piece);
            },
        }
    }
    ret
}


/// Split on `sep` outside of quotes and parentheses.
pub(crate) fn split_top_level(line: &str, sep: char) -> Vec<&str> {
    let mut ret = vec![];
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'') | (None, '"') => quote = Some(c),
            (Some(q), c) if q == c     => quote = None,
            (None, '(')                => depth += 1,
            (None, ')')                => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                ret.push(&line[start .. i]);
                start = i + c.len_utf8();
            },
            _ => (),
        }
    }
    ret.push(&line[start ..]);
    ret
}


/// Remove a trailing `!` comment, ignoring `!` inside quoted strings.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'') | (None, '"') => quote = Some(c),
            (Some(q), c) if q == c     => quote = None,
            (None, '!')                => return &line[.. i],
            _ => (),
        }
    }
    line
}
