//! Delimited-text decoding for CLIs that print CSV or TSV instead of JSON.
//!
//! The first non-blank line is the header. Each later line becomes one row
//! keyed by header name; short rows are padded with empty strings and extra
//! cells beyond the header are dropped.

use std::collections::BTreeMap;

pub type Row = BTreeMap<String, String>;

/// Split one line into cells. Cells may be wrapped in double quotes; inside a
/// quoted cell `""` is a literal quote and the delimiter is not special.
fn split_line(line: &str, delim: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delim {
            cells.push(std::mem::take(&mut cell));
        } else {
            cell.push(c);
        }
    }
    cells.push(cell);
    cells
}

pub fn parse_delimited(text: &str, delim: char) -> Vec<Row> {
    let mut lines = text
        .lines()
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = split_line(header_line, delim)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    lines
        .map(|line| {
            let mut cells = split_line(line, delim).into_iter();
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect()
}

pub fn parse_csv(text: &str) -> Vec<Row> {
    parse_delimited(text, ',')
}

pub fn parse_tsv(text: &str) -> Vec<Row> {
    parse_delimited(text, '\t')
}
