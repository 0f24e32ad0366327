//! JSON: one array holding every record

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::CodecError;
use crate::records::{DocRecord, LabelRecord};

fn parse_array<T: DeserializeOwned>(input: &str) -> Result<Vec<T>, CodecError> {
    let value: Value = serde_json::from_str(input)?;
    if !value.is_array() {
        return Err(CodecError::Invalid(
            "top-level JSON value must be an array (use a .jsonl file for one object per line)"
                .to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn parse_documents(input: &str) -> Result<Vec<DocRecord>, CodecError> {
    parse_array(input)
}

pub fn parse_labels(input: &str) -> Result<Vec<LabelRecord>, CodecError> {
    parse_array(input)
}

/// One compact document per line so large exports stay diffable
pub fn write_documents(records: &[DocRecord]) -> Result<String, CodecError> {
    if records.is_empty() {
        return Ok("[]\n".to_string());
    }
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[\n{}\n]\n", lines.join(",\n")))
}

pub fn write_labels(records: &[LabelRecord]) -> Result<String, CodecError> {
    let mut out = serde_json::to_string_pretty(records)?;
    out.push('\n');
    Ok(out)
}
