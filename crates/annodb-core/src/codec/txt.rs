//! Plain text: one document per line
//!
//! Inside a document, a newline is written as the two characters `\n`, a
//! carriage return as `\r` and a backslash as `\\`. Any other backslash is
//! read back literally.

use crate::records::DocRecord;

pub fn parse_documents(input: &str) -> Vec<DocRecord> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| DocRecord::from_text(unescape(line)))
        .collect()
}

/// Records without text are left out
pub fn write_documents(records: &[DocRecord]) -> String {
    let mut out = String::new();
    for text in records.iter().filter_map(|r| r.content()) {
        escape_into(&mut out, text);
        out.push('\n');
    }
    out
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}
