//! Identity and merge rules
//!
//! Applies parsed records to the store, in record order, on whatever
//! connection it is given (normally the transaction of one input file).
//! Documents are matched by content checksum and labels by name; nothing
//! already stored is ever overwritten.
//!
//! The precedence rules for shortcut keys, colors and spans are plain
//! functions so they can be checked without a store.

use std::borrow::Cow;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::char_indices::CharIndices;
use crate::checksum::normalize_checksum;
use crate::error::{Error, Result};
use crate::models::NewDocument;
use crate::records::{AnnotationRecord, DocRecord, LabelRecord};
use crate::storage::store::{
    document_content, find_document_by_checksum, find_label, label_count, put_annotation,
    put_document, put_label,
};

/// Colors handed out, in order, to labels that arrive without a usable one
pub const PALETTE: [&str; 10] = [
    "#aec7e8", "#ffbb78", "#98df8a", "#ff9896", "#c5b0d5", "#c49c94", "#f7b6d2", "#dbdb8d",
    "#9edae5", "#d3d3d3",
];

const NAMED_COLORS: &[(&str, &str)] = &[
    ("black", "#000000"),
    ("white", "#ffffff"),
    ("gray", "#808080"),
    ("grey", "#808080"),
    ("silver", "#c0c0c0"),
    ("red", "#ff0000"),
    ("maroon", "#800000"),
    ("orange", "#ffa500"),
    ("yellow", "#ffff00"),
    ("olive", "#808000"),
    ("lime", "#00ff00"),
    ("green", "#008000"),
    ("teal", "#008080"),
    ("cyan", "#00ffff"),
    ("aqua", "#00ffff"),
    ("blue", "#0000ff"),
    ("navy", "#000080"),
    ("purple", "#800080"),
    ("magenta", "#ff00ff"),
    ("fuchsia", "#ff00ff"),
    ("pink", "#ffc0cb"),
    ("brown", "#a52a2a"),
];

/// What a merge did to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub documents_created: usize,
    pub documents_matched: usize,
    pub annotations_created: usize,
    pub annotations_existing: usize,
    pub labels_created: usize,
    pub labels_matched: usize,
    pub shortcut_keys_dropped: usize,
    pub records_skipped: usize,
}

impl MergeCounts {
    pub fn add(&mut self, other: &MergeCounts) {
        self.documents_created += other.documents_created;
        self.documents_matched += other.documents_matched;
        self.annotations_created += other.annotations_created;
        self.annotations_existing += other.annotations_existing;
        self.labels_created += other.labels_created;
        self.labels_matched += other.labels_matched;
        self.shortcut_keys_dropped += other.shortcut_keys_dropped;
        self.records_skipped += other.records_skipped;
    }
}

// ==================== Resolution rules ====================

/// A shortcut key is kept only if it is a single lowercase ASCII letter
pub fn resolve_shortcut_key(requested: Option<&str>) -> Option<String> {
    let key = requested?;
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some(key.to_string()),
        _ => None,
    }
}

/// Normalize `requested` to `#rrggbb`, or pick the palette entry for the
/// `existing_labels`-th label
pub fn resolve_color(requested: Option<&str>, existing_labels: usize) -> String {
    requested
        .and_then(normalize_color)
        .unwrap_or_else(|| PALETTE[existing_labels % PALETTE.len()].to_string())
}

fn normalize_color(color: &str) -> Option<String> {
    let color = color.trim().to_ascii_lowercase();

    if let Some(hex) = color.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return match hex.len() {
            6 => Some(color),
            3 => Some(hex.chars().fold(String::from("#"), |mut out, c| {
                out.push(c);
                out.push(c);
                out
            })),
            _ => None,
        };
    }

    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == color)
        .map(|(_, hex)| hex.to_string())
}

/// Character span of an annotation within `text`
///
/// Character offsets win; a missing one is taken from the matching byte
/// offset, which must fall on a character boundary. Returns `None` unless
/// the result is a non-empty span inside the text.
pub fn resolve_span(annotation: &AnnotationRecord, text: &CharIndices) -> Option<(usize, usize)> {
    let start = annotation
        .start_char
        .or_else(|| annotation.start_byte.and_then(|b| text.byte_to_char(b)))?;
    let end = annotation
        .end_char
        .or_else(|| annotation.end_byte.and_then(|b| text.byte_to_char(b)))?;
    text.is_valid_span(start, end).then_some((start, end))
}

// ==================== Merges ====================

/// Merge document records (and their embedded annotations)
pub fn apply_documents(conn: &Connection, records: &[DocRecord]) -> Result<MergeCounts> {
    let mut counts = MergeCounts::default();

    for (index, record) in records.iter().enumerate() {
        let Some((document_id, content)) = resolve_document(conn, index, record, &mut counts)?
        else {
            counts.records_skipped += 1;
            continue;
        };

        let annotations = record.annotations();
        if annotations.is_empty() {
            continue;
        }

        let text = CharIndices::new(&content);
        for annotation in annotations {
            apply_annotation(conn, index, document_id, &text, annotation, &mut counts)?;
        }
    }

    Ok(counts)
}

/// Find or create the document a record describes
///
/// A record whose text is not stored but whose declared checksum is (text
/// altered on the way out, e.g. characters XML cannot carry) stands for the
/// stored document, and its spans are resolved against the stored content.
fn resolve_document<'r>(
    conn: &Connection,
    index: usize,
    record: &'r DocRecord,
    counts: &mut MergeCounts,
) -> Result<Option<(i64, Cow<'r, str>)>> {
    let declared = record.checksum.as_deref().and_then(normalize_checksum);

    if let Some(text) = record.content() {
        let doc = NewDocument::new(text)
            .with_titles(record.display_title.clone(), record.list_title.clone())
            .with_metadata(record.metadata.clone());

        if let Some(declared) = declared.as_deref() {
            if declared != doc.content_checksum()
                && find_document_by_checksum(conn, doc.content_checksum())?.is_none()
            {
                if let Some((id, content)) = stored_document(conn, declared)? {
                    debug!(
                        "Record {}: text differs from stored document {}, matched by declared checksum",
                        index, id
                    );
                    counts.documents_matched += 1;
                    return Ok(Some((id, Cow::Owned(content))));
                }
            }
        }
        if let Some(raw) = record.checksum.as_deref() {
            if declared.as_deref() != Some(doc.content_checksum()) {
                warn!(
                    "Record {}: declared checksum {} does not match its text, using {}",
                    index,
                    raw,
                    doc.content_checksum()
                );
            }
        }

        let put = put_document(conn, &doc)?;
        if put.created {
            counts.documents_created += 1;
        } else {
            counts.documents_matched += 1;
        }
        return Ok(Some((put.id, Cow::Borrowed(text))));
    }

    let Some(checksum) = declared else {
        warn!("Record {}: no text and no checksum, skipped", index);
        return Ok(None);
    };

    match stored_document(conn, &checksum)? {
        Some((id, content)) => {
            counts.documents_matched += 1;
            Ok(Some((id, Cow::Owned(content))))
        }
        None => {
            warn!(
                "Record {}: no stored document with checksum {}, skipped",
                index, checksum
            );
            Ok(None)
        }
    }
}

fn stored_document(conn: &Connection, checksum: &str) -> Result<Option<(i64, String)>> {
    match find_document_by_checksum(conn, checksum)? {
        Some(id) => Ok(document_content(conn, id)?.map(|content| (id, content))),
        None => Ok(None),
    }
}

fn apply_annotation(
    conn: &Connection,
    index: usize,
    document_id: i64,
    text: &CharIndices,
    annotation: &AnnotationRecord,
    counts: &mut MergeCounts,
) -> Result<()> {
    if annotation.label_name.is_empty() {
        return Err(Error::integrity(format!(
            "record {}: annotation has no label name",
            index
        )));
    }

    let (start, end) = resolve_span(annotation, text).ok_or_else(|| {
        Error::integrity(format!(
            "record {}: annotation for '{}' has no valid span within {} characters",
            index,
            annotation.label_name,
            text.char_len()
        ))
    })?;

    let label_id = ensure_label(conn, &annotation.label_name, counts)?;
    let put = put_annotation(
        conn,
        document_id,
        label_id,
        start,
        end,
        annotation.extra_data.as_deref(),
    )?;
    if put.created {
        counts.annotations_created += 1;
    } else {
        counts.annotations_existing += 1;
    }
    Ok(())
}

/// Label referenced from an annotation: created bare if unknown
fn ensure_label(conn: &Connection, name: &str, counts: &mut MergeCounts) -> Result<i64> {
    if let Some(id) = find_label(conn, name)? {
        return Ok(id);
    }
    let color = resolve_color(None, label_count(conn)? as usize);
    let put = put_label(conn, name, None, Some(&color))?;
    counts.labels_created += 1;
    Ok(put.put.id)
}

/// Merge label records
pub fn apply_labels(conn: &Connection, records: &[LabelRecord]) -> Result<MergeCounts> {
    let mut counts = MergeCounts::default();

    for record in records {
        if find_label(conn, &record.name)?.is_some() {
            counts.labels_matched += 1;
            continue;
        }

        let shortcut_key = resolve_shortcut_key(record.shortcut_key.as_deref());
        if let (Some(requested), None) = (record.shortcut_key.as_deref(), &shortcut_key) {
            warn!(
                "Label '{}': shortcut key '{}' is not a single letter a-z, dropped",
                record.name, requested
            );
            counts.shortcut_keys_dropped += 1;
        }

        let color = resolve_color(record.color.as_deref(), label_count(conn)? as usize);
        let put = put_label(conn, &record.name, shortcut_key.as_deref(), Some(&color))?;
        if put.shortcut_dropped {
            warn!(
                "Label '{}': shortcut key '{}' already in use, dropped",
                record.name,
                shortcut_key.as_deref().unwrap_or_default()
            );
            counts.shortcut_keys_dropped += 1;
        }
        counts.labels_created += 1;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::content_checksum;
    use crate::error::ErrorKind;
    use crate::storage::Store;

    #[test]
    fn test_resolve_shortcut_key() {
        assert_eq!(resolve_shortcut_key(Some("w")), Some("w".to_string()));
        assert_eq!(resolve_shortcut_key(Some("W")), None);
        assert_eq!(resolve_shortcut_key(Some("ab")), None);
        assert_eq!(resolve_shortcut_key(Some("1")), None);
        assert_eq!(resolve_shortcut_key(Some("é")), None);
        assert_eq!(resolve_shortcut_key(Some("")), None);
        assert_eq!(resolve_shortcut_key(None), None);
    }

    #[test]
    fn test_resolve_color() {
        assert_eq!(resolve_color(Some("#FF8800"), 0), "#ff8800");
        assert_eq!(resolve_color(Some("#f80"), 0), "#ff8800");
        assert_eq!(resolve_color(Some(" Orange "), 0), "#ffa500");
        assert_eq!(resolve_color(Some("not a color"), 1), PALETTE[1]);
        assert_eq!(resolve_color(Some("#12345"), 2), PALETTE[2]);
        assert_eq!(resolve_color(Some("#gggggg"), 3), PALETTE[3]);
        assert_eq!(resolve_color(None, 12), PALETTE[2]);
    }

    #[test]
    fn test_resolve_span_prefers_char_offsets() {
        let text = CharIndices::new("héllo wörld");
        let ann = AnnotationRecord {
            start_char: Some(6),
            end_char: Some(11),
            start_byte: Some(0),
            end_byte: Some(1),
            ..AnnotationRecord::default()
        };
        assert_eq!(resolve_span(&ann, &text), Some((6, 11)));
    }

    #[test]
    fn test_resolve_span_from_byte_offsets() {
        // "wörld" starts at byte 7, ends at byte 13
        let text = CharIndices::new("héllo wörld");
        let ann = AnnotationRecord {
            start_byte: Some(7),
            end_byte: Some(13),
            ..AnnotationRecord::default()
        };
        assert_eq!(resolve_span(&ann, &text), Some((6, 11)));

        // byte 2 is inside 'é'
        let inside = AnnotationRecord {
            start_byte: Some(2),
            end_byte: Some(4),
            ..AnnotationRecord::default()
        };
        assert_eq!(resolve_span(&inside, &text), None);
    }

    #[test]
    fn test_resolve_span_rejects_invalid() {
        let text = CharIndices::new("abc");
        assert_eq!(resolve_span(&AnnotationRecord::new(2, 2, "L"), &text), None);
        assert_eq!(resolve_span(&AnnotationRecord::new(1, 4, "L"), &text), None);
        assert_eq!(resolve_span(&AnnotationRecord::default(), &text), None);
    }

    #[test]
    fn test_apply_documents_creates_and_matches() {
        let store = Store::open_in_memory().unwrap();
        let records = vec![
            DocRecord::from_text("first"),
            DocRecord::from_text("second"),
            DocRecord::from_text("first"),
        ];

        let counts = apply_documents(store.connection(), &records).unwrap();
        assert_eq!(counts.documents_created, 2);
        assert_eq!(counts.documents_matched, 1);
        assert_eq!(store.document_count().unwrap(), 2);
    }

    #[test]
    fn test_apply_documents_creates_labels_for_annotations() {
        let store = Store::open_in_memory().unwrap();
        let record = DocRecord {
            text: Some("Some text here".to_string()),
            annotations: Some(vec![
                AnnotationRecord::new(0, 4, "Word").with_extra_data("first"),
                AnnotationRecord::new(5, 9, "Word"),
                AnnotationRecord::new(10, 14, "Noun"),
            ]),
            ..DocRecord::default()
        };

        let counts = apply_documents(store.connection(), &[record.clone()]).unwrap();
        assert_eq!(counts.annotations_created, 3);
        assert_eq!(counts.labels_created, 2);

        let labels = store.list_labels().unwrap();
        assert_eq!(labels[0].color.as_deref(), Some(PALETTE[0]));
        assert_eq!(labels[1].color.as_deref(), Some(PALETTE[1]));
        assert!(labels.iter().all(|l| l.shortcut_key.is_none()));

        // re-import is a no-op
        let again = apply_documents(store.connection(), &[record]).unwrap();
        assert_eq!(again.documents_matched, 1);
        assert_eq!(again.annotations_existing, 3);
        assert_eq!(again.annotations_created, 0);
        assert_eq!(store.annotation_count().unwrap(), 3);
    }

    #[test]
    fn test_duplicate_annotation_keeps_stored_extra_data() {
        let store = Store::open_in_memory().unwrap();
        let first = DocRecord {
            text: Some("abcdef".to_string()),
            annotations: Some(vec![AnnotationRecord::new(0, 3, "L").with_extra_data("old")]),
            ..DocRecord::default()
        };
        let second = DocRecord {
            annotations: Some(vec![AnnotationRecord::new(0, 3, "L").with_extra_data("new")]),
            ..first.clone()
        };

        apply_documents(store.connection(), &[first, second]).unwrap();

        let doc_id = store.list_documents().unwrap()[0].id;
        let annotations = store.list_annotations(doc_id).unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].annotation.extra_data.as_deref(), Some("old"));
    }

    #[test]
    fn test_textless_record_attaches_by_checksum() {
        let store = Store::open_in_memory().unwrap();
        apply_documents(store.connection(), &[DocRecord::from_text("stored text")]).unwrap();

        let textless = DocRecord {
            checksum: Some(content_checksum("stored text").to_uppercase()),
            annotations: Some(vec![AnnotationRecord::new(0, 6, "Word")]),
            ..DocRecord::default()
        };
        let counts = apply_documents(store.connection(), &[textless]).unwrap();

        assert_eq!(counts.documents_matched, 1);
        assert_eq!(counts.annotations_created, 1);
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[test]
    fn test_unmatched_or_empty_records_are_skipped() {
        let store = Store::open_in_memory().unwrap();
        let unmatched = DocRecord {
            checksum: Some(content_checksum("nothing stored")),
            ..DocRecord::default()
        };
        let empty = DocRecord::from_text("");

        let counts = apply_documents(store.connection(), &[unmatched, empty]).unwrap();
        assert_eq!(counts.records_skipped, 2);
        assert_eq!(store.document_count().unwrap(), 0);
    }

    #[test]
    fn test_mismatched_checksum_is_ignored() {
        let store = Store::open_in_memory().unwrap();
        let record = DocRecord {
            checksum: Some("0".repeat(32)),
            text: Some("actual text".to_string()),
            ..DocRecord::default()
        };

        apply_documents(store.connection(), &[record]).unwrap();
        let doc = &store.list_documents().unwrap()[0];
        assert_eq!(doc.content_checksum, content_checksum("actual text"));
    }

    #[test]
    fn test_altered_text_matches_by_declared_checksum() {
        let store = Store::open_in_memory().unwrap();
        let stored = "a\u{7}bcd";
        let first = DocRecord {
            text: Some(stored.to_string()),
            annotations: Some(vec![AnnotationRecord::new(3, 5, "L")]),
            ..DocRecord::default()
        };
        apply_documents(store.connection(), &[first]).unwrap();

        // what comes back from a format that drops the bell character
        let altered = DocRecord {
            checksum: Some(content_checksum(stored)),
            text: Some("abcd".to_string()),
            annotations: Some(vec![AnnotationRecord::new(3, 5, "L")]),
            ..DocRecord::default()
        };
        let counts = apply_documents(store.connection(), &[altered]).unwrap();

        assert_eq!(counts.documents_matched, 1);
        assert_eq!(counts.documents_created, 0);
        assert_eq!(counts.annotations_existing, 1);
        assert_eq!(store.document_count().unwrap(), 1);
        assert_eq!(store.list_documents().unwrap()[0].content, stored);
    }

    #[test]
    fn test_stored_text_wins_over_declared_checksum() {
        let store = Store::open_in_memory().unwrap();
        apply_documents(
            store.connection(),
            &[DocRecord::from_text("one"), DocRecord::from_text("two")],
        )
        .unwrap();

        // both checksums are stored: the text decides
        let record = DocRecord {
            checksum: Some(content_checksum("one")),
            text: Some("two".to_string()),
            annotations: Some(vec![AnnotationRecord::new(0, 3, "L")]),
            ..DocRecord::default()
        };
        apply_documents(store.connection(), &[record]).unwrap();

        let docs = store.list_documents().unwrap();
        assert!(store.list_annotations(docs[0].id).unwrap().is_empty());
        assert_eq!(store.list_annotations(docs[1].id).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_annotation_is_integrity_error() {
        let store = Store::open_in_memory().unwrap();
        let bad_span = DocRecord {
            text: Some("abc".to_string()),
            annotations: Some(vec![AnnotationRecord::new(1, 10, "Word")]),
            ..DocRecord::default()
        };
        let err = apply_documents(store.connection(), &[bad_span]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let no_label = DocRecord {
            text: Some("abc".to_string()),
            annotations: Some(vec![AnnotationRecord::new(0, 1, "")]),
            ..DocRecord::default()
        };
        let err = apply_documents(store.connection(), &[no_label]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_apply_labels_shortcut_rules() {
        let store = Store::open_in_memory().unwrap();
        let records = vec![
            LabelRecord::new("Word").with_shortcut_key("w"),
            LabelRecord::new("Wave").with_shortcut_key("w"),
            LabelRecord::new("Number").with_shortcut_key("N"),
            LabelRecord::new("Word").with_shortcut_key("x"),
        ];

        let counts = apply_labels(store.connection(), &records).unwrap();
        assert_eq!(counts.labels_created, 3);
        assert_eq!(counts.labels_matched, 1);
        assert_eq!(counts.shortcut_keys_dropped, 2);

        let labels = store.list_labels().unwrap();
        let keys: Vec<_> = labels.iter().map(|l| l.shortcut_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("w"), None, None]);
    }

    #[test]
    fn test_apply_labels_colors() {
        let store = Store::open_in_memory().unwrap();
        let records = vec![
            LabelRecord::new("A").with_color("#ABC"),
            LabelRecord::new("B"),
            LabelRecord::new("C").with_color("chartreuse-ish"),
        ];

        apply_labels(store.connection(), &records).unwrap();
        let colors: Vec<_> = store
            .list_labels()
            .unwrap()
            .into_iter()
            .filter_map(|l| l.color)
            .collect();
        assert_eq!(colors, vec!["#aabbcc", PALETTE[1], PALETTE[2]]);
    }

    #[test]
    fn test_merge_counts_add() {
        let mut total = MergeCounts::default();
        let one = MergeCounts {
            documents_created: 2,
            records_skipped: 1,
            ..MergeCounts::default()
        };
        total.add(&one);
        total.add(&one);
        assert_eq!(total.documents_created, 4);
        assert_eq!(total.records_skipped, 2);
    }
}
