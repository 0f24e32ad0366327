//! JSON Lines: one object per line

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CodecError;
use crate::records::{DocRecord, LabelRecord};

fn parse_lines<T: DeserializeOwned>(input: &str) -> Result<Vec<T>, CodecError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| CodecError::JsonLine {
                line: i + 1,
                source,
            })
        })
        .collect()
}

fn write_lines<T: Serialize>(records: &[T]) -> Result<String, CodecError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn parse_documents(input: &str) -> Result<Vec<DocRecord>, CodecError> {
    parse_lines(input)
}

pub fn parse_labels(input: &str) -> Result<Vec<LabelRecord>, CodecError> {
    parse_lines(input)
}

pub fn write_documents(records: &[DocRecord]) -> Result<String, CodecError> {
    write_lines(records)
}

pub fn write_labels(records: &[LabelRecord]) -> Result<String, CodecError> {
    write_lines(records)
}
