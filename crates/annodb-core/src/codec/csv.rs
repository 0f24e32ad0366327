//! CSV with a header row
//!
//! Documents are flattened to one row per annotation; the document columns
//! repeat on each of its rows and a document without annotations gets a
//! single row. Reading groups consecutive rows that describe the same
//! document back together.

use std::collections::HashMap;

use ::csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde_json::{Map, Value};

use super::CodecError;
use crate::records::{AnnotationRecord, DocRecord, LabelRecord, CHECKSUM_KEY};

const DOCUMENT_COLUMNS: [&str; 11] = [
    CHECKSUM_KEY,
    "metadata",
    "display_title",
    "list_title",
    "text",
    "start_char",
    "end_char",
    "start_byte",
    "end_byte",
    "label_name",
    "extra_data",
];

const LABEL_COLUMNS: [&str; 3] = ["name", "color", "shortcut_key"];

/// Non-empty cells of one row, keyed by header name
struct Row<'a> {
    cells: HashMap<&'a str, &'a str>,
}

impl<'a> Row<'a> {
    fn new(headers: &'a StringRecord, record: &'a StringRecord) -> Self {
        let cells = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .collect();
        Self { cells }
    }

    fn get(&self, column: &str) -> Option<&'a str> {
        self.cells.get(column).copied()
    }

    fn string(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }

    fn offset(&self, column: &str, line: u64) -> Result<Option<usize>, CodecError> {
        self.get(column)
            .map(|cell| {
                cell.trim().parse().map_err(|_| {
                    CodecError::Invalid(format!(
                        "line {}: {} must be a non-negative integer, got '{}'",
                        line, column, cell
                    ))
                })
            })
            .transpose()
    }

    fn metadata(&self, line: u64) -> Result<Option<Map<String, Value>>, CodecError> {
        let Some(cell) = self.get("metadata").or_else(|| self.get("meta")) else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(cell) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err(CodecError::Invalid(format!(
                "line {}: metadata must be a JSON object",
                line
            ))),
        }
    }

    fn annotation(&self, line: u64) -> Result<Option<AnnotationRecord>, CodecError> {
        let annotation = AnnotationRecord {
            start_char: self.offset("start_char", line)?,
            end_char: self.offset("end_char", line)?,
            start_byte: self.offset("start_byte", line)?,
            end_byte: self.offset("end_byte", line)?,
            label_name: self.string("label_name").unwrap_or_default(),
            extra_data: self.string("extra_data"),
        };
        if annotation == AnnotationRecord::default() {
            Ok(None)
        } else {
            Ok(Some(annotation))
        }
    }
}

fn reader(input: &str) -> ::csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .flexible(true)
        .from_reader(input.as_bytes())
}

pub fn parse_documents(input: &str) -> Result<Vec<DocRecord>, CodecError> {
    let mut reader = reader(input);
    let headers = reader.headers()?.clone();

    let mut docs: Vec<DocRecord> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row = Row::new(&headers, &record);

        let checksum = row.string(CHECKSUM_KEY);
        let text = row.string("text");
        let annotation = row.annotation(line)?;

        let continues_previous = docs.last().is_some_and(|prev| match &checksum {
            Some(checksum) => prev.checksum.as_ref() == Some(checksum),
            None => prev.checksum.is_none() && text.is_some() && prev.text == text,
        });

        if !continues_previous {
            docs.push(DocRecord {
                checksum,
                metadata: row.metadata(line)?,
                display_title: row.string("display_title"),
                list_title: row.string("list_title"),
                text,
                annotations: None,
            });
        }

        if let (Some(annotation), Some(doc)) = (annotation, docs.last_mut()) {
            doc.annotations.get_or_insert_with(Vec::new).push(annotation);
        }
    }
    Ok(docs)
}

/// Columns actually used by `records`, in canonical order
fn document_header(records: &[DocRecord]) -> Vec<&'static str> {
    let annotations = || records.iter().flat_map(|r| r.annotations());
    DOCUMENT_COLUMNS
        .into_iter()
        .filter(|column| match *column {
            CHECKSUM_KEY => records.iter().any(|r| r.checksum.is_some()),
            "metadata" => records.iter().any(|r| r.metadata.is_some()),
            "display_title" => records.iter().any(|r| r.display_title.is_some()),
            "list_title" => records.iter().any(|r| r.list_title.is_some()),
            "text" => records.iter().any(|r| r.text.is_some()),
            "start_char" => annotations().any(|a| a.start_char.is_some()),
            "end_char" => annotations().any(|a| a.end_char.is_some()),
            "start_byte" => annotations().any(|a| a.start_byte.is_some()),
            "end_byte" => annotations().any(|a| a.end_byte.is_some()),
            "label_name" => annotations().next().is_some(),
            "extra_data" => annotations().any(|a| a.extra_data.is_some()),
            _ => false,
        })
        .collect()
}

fn document_cell(
    column: &str,
    doc: &DocRecord,
    annotation: Option<&AnnotationRecord>,
) -> Result<String, CodecError> {
    let offset = |value: Option<usize>| value.map(|v| v.to_string()).unwrap_or_default();
    let cell = match column {
        CHECKSUM_KEY => doc.checksum.clone().unwrap_or_default(),
        "metadata" => match &doc.metadata {
            Some(map) => serde_json::to_string(map)?,
            None => String::new(),
        },
        "display_title" => doc.display_title.clone().unwrap_or_default(),
        "list_title" => doc.list_title.clone().unwrap_or_default(),
        "text" => doc.text.clone().unwrap_or_default(),
        "start_char" => offset(annotation.and_then(|a| a.start_char)),
        "end_char" => offset(annotation.and_then(|a| a.end_char)),
        "start_byte" => offset(annotation.and_then(|a| a.start_byte)),
        "end_byte" => offset(annotation.and_then(|a| a.end_byte)),
        "label_name" => annotation.map(|a| a.label_name.clone()).unwrap_or_default(),
        "extra_data" => annotation
            .and_then(|a| a.extra_data.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };
    Ok(cell)
}

fn finish(writer: ::csv::Writer<Vec<u8>>) -> Result<String, CodecError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| CodecError::Invalid(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CodecError::Invalid(e.to_string()))
}

pub fn write_documents(records: &[DocRecord]) -> Result<String, CodecError> {
    let header = document_header(records);
    if header.is_empty() {
        return Ok(String::new());
    }
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header)?;

    for doc in records {
        let annotations = doc.annotations();
        if annotations.is_empty() {
            let row = header
                .iter()
                .map(|column| document_cell(column, doc, None))
                .collect::<Result<Vec<_>, _>>()?;
            writer.write_record(&row)?;
            continue;
        }
        for annotation in annotations {
            let row = header
                .iter()
                .map(|column| document_cell(column, doc, Some(annotation)))
                .collect::<Result<Vec<_>, _>>()?;
            writer.write_record(&row)?;
        }
    }
    finish(writer)
}

pub fn parse_labels(input: &str) -> Result<Vec<LabelRecord>, CodecError> {
    let mut reader = reader(input);
    let headers = reader.headers()?.clone();

    let mut labels = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = Row::new(&headers, &record);
        let name = row.string("name").or_else(|| row.string("text"));
        if name.is_none() && row.cells.is_empty() {
            continue;
        }
        labels.push(LabelRecord {
            name: name.unwrap_or_default(),
            color: row.string("color"),
            shortcut_key: row.string("shortcut_key"),
        });
    }
    Ok(labels)
}

pub fn write_labels(records: &[LabelRecord]) -> Result<String, CodecError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(LABEL_COLUMNS)?;
    for label in records {
        writer.write_record([
            label.name.as_str(),
            label.color.as_deref().unwrap_or_default(),
            label.shortcut_key.as_deref().unwrap_or_default(),
        ])?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_grouped_into_documents() {
        let input = "\
text,start_char,end_char,label_name
hello world,0,5,Word
hello world,6,11,Word
other text,,,
";
        let docs = parse_documents(input).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].annotations().len(), 2);
        assert_eq!(docs[0].annotations()[1], AnnotationRecord::new(6, 11, "Word"));
        assert!(docs[1].annotations.is_none());
    }

    #[test]
    fn test_grouping_by_checksum() {
        let checksum = "a".repeat(32);
        let input = format!(
            "{key},start_char,end_char,label_name\n{c},0,1,A\n{c},1,2,B\n",
            key = CHECKSUM_KEY,
            c = checksum
        );
        let docs = parse_documents(&input).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].checksum.as_deref(), Some(checksum.as_str()));
        assert!(docs[0].text.is_none());
        assert_eq!(docs[0].annotations().len(), 2);
    }

    #[test]
    fn test_short_rows_and_meta_column() {
        let input = "text,meta,list_title\nfirst,\"{\"\"id\"\": 3}\"\nsecond\n";
        let docs = parse_documents(input).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.as_ref().unwrap()["id"], 3);
        assert!(docs[1].metadata.is_none());
        assert!(docs[1].list_title.is_none());
    }

    #[test]
    fn test_invalid_cells() {
        let err = parse_documents("text,start_char\nabc,-1\n").unwrap_err();
        assert!(err.to_string().contains("start_char"));

        let err = parse_documents("text,metadata\nabc,[1]\n").unwrap_err();
        assert!(err.to_string().contains("metadata"));
    }

    #[test]
    fn test_header_is_union_of_fields() {
        let docs = vec![
            DocRecord::from_text("plain"),
            DocRecord {
                text: Some("annotated".to_string()),
                annotations: Some(vec![AnnotationRecord::new(0, 3, "Word")]),
                ..DocRecord::default()
            },
        ];
        let out = write_documents(&docs).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("text,start_char,end_char,label_name"));
        assert_eq!(lines.next(), Some("plain,,,"));
        assert_eq!(lines.next(), Some("annotated,0,3,Word"));
    }

    #[test]
    fn test_labels() {
        let labels = parse_labels("name,color,shortcut_key\nWord,#ff0000,w\nNumber\n\n").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].shortcut_key.as_deref(), Some("w"));
        assert_eq!(labels[1], LabelRecord::new("Number"));

        let out = write_labels(&labels).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines, vec!["name,color,shortcut_key", "Word,#ff0000,w", "Number,,"]);
    }
}
