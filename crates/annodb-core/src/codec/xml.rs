//! XML documents and labels
//!
//! ```text
//! <document_set>
//!   <document>
//!     <utf8_text_md5_checksum>...</utf8_text_md5_checksum>
//!     <meta id="doc-1" source="..."/>
//!     <display_title>...</display_title>
//!     <list_title>...</list_title>
//!     <text>...</text>
//!     <annotations>
//!       <annotation>
//!         <start_char>0</start_char>
//!         <end_char>4</end_char>
//!         <label_name>Word</label_name>
//!         <extra_data>...</extra_data>
//!       </annotation>
//!     </annotations>
//!   </document>
//! </document_set>
//! ```
//!
//! Labels use `<label_set>` and `<label>` with `name`, `color` and
//! `shortcut_key` children. Metadata values that are not strings are written
//! as their compact JSON text and read back as strings. Metadata keys that
//! are not plain XML names go into `<item key="..." value="..."/>` children
//! of `<meta>`.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use super::CodecError;
use crate::records::{AnnotationRecord, DocRecord, LabelRecord, CHECKSUM_KEY};

const INDENT: usize = 2;

fn xml_error(e: impl fmt::Display) -> CodecError {
    CodecError::Xml(e.to_string())
}

/// Characters allowed by XML 1.0
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn escape(value: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars().filter(|c| is_xml_char(*c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' => out.push_str("&#13;"),
            '\n' if in_attribute => out.push_str("&#10;"),
            '\t' if in_attribute => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

fn strip_illegal(value: &str) -> String {
    value.chars().filter(|c| is_xml_char(*c)).collect()
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// Whether `key` can be written as an attribute name and read back unchanged
///
/// Colons (namespace prefixes) and the reserved `xml` prefix are excluded.
fn is_attribute_name(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_name_start_char(first)
        && chars.all(is_name_char)
        && !key.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml"))
}

fn push_escaped_attribute(element: &mut BytesStart<'_>, key: &str, value: &str) {
    element.push_attribute(Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape(value, true).into_bytes()),
    });
}

fn local_name(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
}

// ==================== Writing ====================

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new(root: &str) -> Result<Self, CodecError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        let mut out = Self { writer };
        out.start(root)?;
        Ok(out)
    }

    fn start(&mut self, name: &str) -> Result<(), CodecError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_error)
    }

    fn end(&mut self, name: &str) -> Result<(), CodecError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    /// `<name>value</name>`, or `<name/>` for an empty value
    fn leaf(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        let escaped = escape(value, false);
        if escaped.is_empty() {
            return self.empty(name);
        }
        self.start(name)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(escaped)))
            .map_err(xml_error)?;
        self.end(name)
    }

    fn optional_leaf(&mut self, name: &str, value: Option<&str>) -> Result<(), CodecError> {
        match value {
            Some(value) => self.leaf(name, value),
            None => Ok(()),
        }
    }

    fn number_leaf(&mut self, name: &str, value: Option<usize>) -> Result<(), CodecError> {
        match value {
            Some(value) => self.leaf(name, &value.to_string()),
            None => Ok(()),
        }
    }

    /// `<meta key="value" .../>`, with `<item>` children for the other keys
    fn meta(&mut self, metadata: &Map<String, Value>) -> Result<(), CodecError> {
        let mut element = BytesStart::new("meta");
        let mut attribute_names = HashSet::new();
        let mut items = Vec::new();

        for (key, value) in metadata {
            let key = strip_illegal(key);
            let value = match value {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                other => Cow::Owned(other.to_string()),
            };
            // stripping can make two keys equal; attributes must stay unique
            if is_attribute_name(&key) && attribute_names.insert(key.clone()) {
                push_escaped_attribute(&mut element, &key, &value);
            } else {
                items.push((key, value));
            }
        }

        if items.is_empty() {
            return self
                .writer
                .write_event(Event::Empty(element))
                .map_err(xml_error);
        }

        self.writer
            .write_event(Event::Start(element))
            .map_err(xml_error)?;
        for (key, value) in &items {
            let mut item = BytesStart::new("item");
            push_escaped_attribute(&mut item, "key", key);
            push_escaped_attribute(&mut item, "value", value);
            self.writer
                .write_event(Event::Empty(item))
                .map_err(xml_error)?;
        }
        self.end("meta")
    }

    fn empty(&mut self, name: &str) -> Result<(), CodecError> {
        self.writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_error)
    }

    fn finish(mut self, root: &str) -> Result<String, CodecError> {
        self.end(root)?;
        let mut out = String::from_utf8(self.writer.into_inner()).map_err(xml_error)?;
        out.push('\n');
        Ok(out)
    }
}

pub fn write_documents(records: &[DocRecord]) -> Result<String, CodecError> {
    let mut out = XmlOut::new("document_set")?;
    for doc in records {
        out.start("document")?;
        out.optional_leaf(CHECKSUM_KEY, doc.checksum.as_deref())?;
        if let Some(metadata) = &doc.metadata {
            out.meta(metadata)?;
        }
        out.optional_leaf("display_title", doc.display_title.as_deref())?;
        out.optional_leaf("list_title", doc.list_title.as_deref())?;
        out.optional_leaf("text", doc.text.as_deref())?;

        if let Some(annotations) = doc.annotations.as_ref().filter(|a| !a.is_empty()) {
            out.start("annotations")?;
            for annotation in annotations {
                out.start("annotation")?;
                out.number_leaf("start_char", annotation.start_char)?;
                out.number_leaf("end_char", annotation.end_char)?;
                out.number_leaf("start_byte", annotation.start_byte)?;
                out.number_leaf("end_byte", annotation.end_byte)?;
                out.leaf("label_name", &annotation.label_name)?;
                out.optional_leaf("extra_data", annotation.extra_data.as_deref())?;
                out.end("annotation")?;
            }
            out.end("annotations")?;
        } else if doc.annotations.is_some() {
            out.empty("annotations")?;
        }
        out.end("document")?;
    }
    out.finish("document_set")
}

pub fn write_labels(records: &[LabelRecord]) -> Result<String, CodecError> {
    let mut out = XmlOut::new("label_set")?;
    for label in records {
        out.start("label")?;
        out.leaf("name", &label.name)?;
        out.optional_leaf("color", label.color.as_deref())?;
        out.optional_leaf("shortcut_key", label.shortcut_key.as_deref())?;
        out.end("label")?;
    }
    out.finish("label_set")
}

// ==================== Reading ====================

/// Walks the event stream, collecting the text of leaf elements
///
/// `on_start` sees every opening tag (with its attributes), `on_leaf` every
/// closed element with the text gathered since it opened.
fn walk<S, L>(input: &str, root: &str, mut on_start: S, mut on_leaf: L) -> Result<(), CodecError>
where
    S: FnMut(&str, &BytesStart<'_>) -> Result<(), CodecError>,
    L: FnMut(&str, String) -> Result<(), CodecError>,
{
    let mut reader = Reader::from_str(input);
    let mut depth = 0usize;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = local_name(e.name());
                if depth == 0 && name != root {
                    return Err(CodecError::Invalid(format!(
                        "expected <{}> as the root element, found <{}>",
                        root, name
                    )));
                }
                depth += 1;
                text.clear();
                on_start(&name, &e)?;
            }
            Event::Empty(e) => {
                let name = local_name(e.name());
                if depth == 0 {
                    if name != root {
                        return Err(CodecError::Invalid(format!(
                            "expected <{}> as the root element, found <{}>",
                            root, name
                        )));
                    }
                    continue;
                }
                on_start(&name, &e)?;
                on_leaf(&name, String::new())?;
            }
            Event::Text(e) => {
                text.push_str(&e.unescape().map_err(xml_error)?);
            }
            Event::CData(e) => {
                text.push_str(std::str::from_utf8(&e).map_err(xml_error)?);
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                on_leaf(&local_name(e.name()), std::mem::take(&mut text))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(CodecError::Xml("unexpected end of input".to_string()));
    }
    Ok(())
}

fn parse_offset(name: &str, value: &str) -> Result<usize, CodecError> {
    value.trim().parse().map_err(|_| {
        CodecError::Invalid(format!(
            "<{}> must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

fn meta_attributes(element: &BytesStart<'_>) -> Result<Map<String, Value>, CodecError> {
    let mut metadata = Map::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = local_name(attr.key);
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        metadata.insert(key, Value::String(value));
    }
    Ok(metadata)
}

/// `key` and `value` of a `<meta><item .../></meta>` entry
fn meta_item(element: &BytesStart<'_>) -> Result<Option<(String, Value)>, CodecError> {
    let mut key = None;
    let mut value = String::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        match local_name(attr.key).as_str() {
            "key" => key = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
            "value" => value = attr.unescape_value().map_err(xml_error)?.into_owned(),
            _ => {}
        }
    }
    Ok(key.map(|key| (key, Value::String(value))))
}

fn set_annotation_field(
    annotation: &mut AnnotationRecord,
    name: &str,
    value: String,
) -> Result<(), CodecError> {
    match name {
        "start_char" => annotation.start_char = Some(parse_offset(name, &value)?),
        "end_char" => annotation.end_char = Some(parse_offset(name, &value)?),
        "start_byte" => annotation.start_byte = Some(parse_offset(name, &value)?),
        "end_byte" => annotation.end_byte = Some(parse_offset(name, &value)?),
        "label_name" => annotation.label_name = value,
        "extra_data" => annotation.extra_data = Some(value),
        _ => {}
    }
    Ok(())
}

fn set_document_field(doc: &mut DocRecord, name: &str, value: String) {
    match name {
        CHECKSUM_KEY => doc.checksum = Some(value),
        "display_title" => doc.display_title = Some(value),
        "list_title" => doc.list_title = Some(value),
        "text" => doc.text = Some(value),
        _ => {}
    }
}

pub fn parse_documents(input: &str) -> Result<Vec<DocRecord>, CodecError> {
    #[derive(Default)]
    struct State {
        docs: Vec<DocRecord>,
        doc: Option<DocRecord>,
        annotation: Option<AnnotationRecord>,
        in_meta: bool,
    }

    let state = RefCell::new(State::default());

    walk(
        input,
        "document_set",
        |name, element| {
            let mut state = state.borrow_mut();
            let state = &mut *state;
            match name {
                "document" => state.doc = Some(DocRecord::default()),
                "annotation" => state.annotation = Some(AnnotationRecord::default()),
                "annotations" => {
                    if let Some(doc) = state.doc.as_mut() {
                        doc.annotations.get_or_insert_with(Vec::new);
                    }
                }
                "meta" | "metadata" => {
                    let attributes = meta_attributes(element)?;
                    if let Some(doc) = state.doc.as_mut() {
                        doc.metadata.get_or_insert_with(Map::new).extend(attributes);
                        state.in_meta = true;
                    }
                }
                "item" if state.in_meta => {
                    let item = meta_item(element)?;
                    if let (Some((key, value)), Some(doc)) = (item, state.doc.as_mut()) {
                        doc.metadata.get_or_insert_with(Map::new).insert(key, value);
                    }
                }
                _ => {}
            }
            Ok(())
        },
        |name, value| {
            let mut state = state.borrow_mut();
            let state = &mut *state;
            match name {
                "annotation" => {
                    if let (Some(annotation), Some(doc)) =
                        (state.annotation.take(), state.doc.as_mut())
                    {
                        doc.annotations.get_or_insert_with(Vec::new).push(annotation);
                    }
                }
                "document" => {
                    state.annotation = None;
                    if let Some(mut doc) = state.doc.take() {
                        if doc.metadata.as_ref().is_some_and(|m| m.is_empty()) {
                            doc.metadata = None;
                        }
                        state.docs.push(doc);
                    }
                }
                "meta" | "metadata" => state.in_meta = false,
                _ => {
                    if let Some(annotation) = state.annotation.as_mut() {
                        set_annotation_field(annotation, name, value)?;
                    } else if let Some(doc) = state.doc.as_mut() {
                        set_document_field(doc, name, value);
                    }
                }
            }
            Ok(())
        },
    )?;

    Ok(state.into_inner().docs)
}

pub fn parse_labels(input: &str) -> Result<Vec<LabelRecord>, CodecError> {
    let labels = RefCell::new(Vec::new());
    let current: RefCell<Option<LabelRecord>> = RefCell::new(None);

    walk(
        input,
        "label_set",
        |name, _| {
            if name == "label" {
                *current.borrow_mut() = Some(LabelRecord::default());
            }
            Ok(())
        },
        |name, value| {
            let mut current = current.borrow_mut();
            if name == "label" {
                labels.borrow_mut().extend(current.take());
            } else if let Some(label) = current.as_mut() {
                match name {
                    "name" | "text" => label.name = value,
                    "color" => label.color = Some(value),
                    "shortcut_key" => label.shortcut_key = Some(value),
                    _ => {}
                }
            }
            Ok(())
        },
    )?;

    Ok(labels.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_special_characters() {
        let doc = DocRecord {
            text: Some("a < b & c > d\r\n\"quoted\" 'single'\ttab".to_string()),
            ..DocRecord::default()
        };
        let out = write_documents(&[doc.clone()]).unwrap();
        assert!(out.contains("&#13;"));
        assert_eq!(parse_documents(&out).unwrap(), vec![doc]);
    }

    #[test]
    fn test_illegal_characters_are_stripped() {
        let doc = DocRecord {
            display_title: Some("bell\u{7}title".to_string()),
            text: Some("form\u{c}feed".to_string()),
            ..DocRecord::default()
        };
        let out = write_documents(&[doc]).unwrap();
        let parsed = parse_documents(&out).unwrap();
        assert_eq!(parsed[0].text.as_deref(), Some("formfeed"));
        assert_eq!(parsed[0].display_title.as_deref(), Some("belltitle"));
    }

    #[test]
    fn test_metadata_as_attributes() {
        let mut meta = Map::new();
        meta.insert("id".to_string(), Value::from("doc \"1\"\nx"));
        meta.insert("count".to_string(), Value::from(3));
        let doc = DocRecord {
            metadata: Some(meta),
            text: Some("abc".to_string()),
            ..DocRecord::default()
        };

        let out = write_documents(&[doc]).unwrap();
        assert!(out.contains("<meta id="));

        let parsed = parse_documents(&out).unwrap();
        let metadata = parsed[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["id"], "doc \"1\"\nx");
        assert_eq!(metadata["count"], "3");
    }

    #[test]
    fn test_metadata_keys_that_are_not_names() {
        let mut meta = Map::new();
        meta.insert("id".to_string(), Value::from("doc-1"));
        meta.insert("source file".to_string(), Value::from("x"));
        meta.insert("1st".to_string(), Value::from("y"));
        meta.insert("ns:key".to_string(), Value::from("z"));
        meta.insert("xmlish".to_string(), Value::from(true));
        meta.insert(String::new(), Value::from("empty key"));
        let doc = DocRecord {
            metadata: Some(meta),
            text: Some("abc".to_string()),
            ..DocRecord::default()
        };

        let out = write_documents(&[doc]).unwrap();
        assert!(out.contains("<meta id=\"doc-1\">"));
        assert!(out.contains("<item key=\"source file\" value=\"x\"/>"));

        let parsed = parse_documents(&out).unwrap();
        let metadata = parsed[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.len(), 6);
        assert_eq!(metadata["id"], "doc-1");
        assert_eq!(metadata["source file"], "x");
        assert_eq!(metadata["1st"], "y");
        assert_eq!(metadata["ns:key"], "z");
        assert_eq!(metadata["xmlish"], "true");
        assert_eq!(metadata[""], "empty key");
    }

    #[test]
    fn test_stripped_keys_stay_unique() {
        let mut meta = Map::new();
        meta.insert("a".to_string(), Value::from("1"));
        meta.insert("a\u{7}".to_string(), Value::from("2"));
        let doc = DocRecord {
            metadata: Some(meta),
            text: Some("abc".to_string()),
            ..DocRecord::default()
        };

        let out = write_documents(&[doc]).unwrap();
        assert!(parse_documents(&out).is_ok());
    }

    #[test]
    fn test_attribute_names() {
        assert!(is_attribute_name("id"));
        assert!(is_attribute_name("_private"));
        assert!(is_attribute_name("série-1.2"));
        assert!(!is_attribute_name(""));
        assert!(!is_attribute_name("1st"));
        assert!(!is_attribute_name("source file"));
        assert!(!is_attribute_name("ns:key"));
        assert!(!is_attribute_name("XMLns"));
        assert!(!is_attribute_name("-x"));
    }

    #[test]
    fn test_empty_annotation_list() {
        let doc = DocRecord {
            text: Some("abc".to_string()),
            annotations: Some(Vec::new()),
            ..DocRecord::default()
        };
        let out = write_documents(&[doc.clone()]).unwrap();
        assert!(out.contains("<annotations/>"));
        assert!(!out.contains("</annotations>"));
        assert_eq!(parse_documents(&out).unwrap(), vec![doc]);
    }

    #[test]
    fn test_parse_handwritten_documents() {
        let input = r#"<?xml version="1.0"?>
<document_set>
  <document>
    <text><![CDATA[some <raw> text]]></text>
    <annotations>
      <annotation><start_byte>0</start_byte><end_byte>4</end_byte><label_name>Word</label_name></annotation>
    </annotations>
    <unknown>ignored</unknown>
  </document>
  <document><text>second</text></document>
</document_set>"#;

        let docs = parse_documents(input).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text.as_deref(), Some("some <raw> text"));
        let ann = &docs[0].annotations()[0];
        assert_eq!(ann.start_byte, Some(0));
        assert_eq!(ann.end_byte, Some(4));
        assert_eq!(ann.start_char, None);
        assert_eq!(ann.label_name, "Word");
        assert_eq!(docs[1].content(), Some("second"));
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let err = parse_documents("<label_set><label><name>A</name></label></label_set>")
            .unwrap_err();
        assert!(err.to_string().contains("document_set"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_documents("<document_set><document></document_set>").is_err());
        assert!(parse_documents("<document_set><document>").is_err());
    }

    #[test]
    fn test_bad_offset() {
        let input = "<document_set><document><text>abc</text><annotations><annotation>\
                     <start_char>x</start_char></annotation></annotations></document></document_set>";
        assert!(matches!(parse_documents(input), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_labels() {
        let labels = vec![
            LabelRecord::new("Word").with_color("#aabbcc").with_shortcut_key("w"),
            LabelRecord::new("A & B"),
        ];
        let out = write_labels(&labels).unwrap();
        assert!(out.contains("<label_set>"));
        assert_eq!(parse_labels(&out).unwrap(), labels);
    }

    #[test]
    fn test_empty_sets() {
        let out = write_documents(&[]).unwrap();
        assert!(parse_documents(&out).unwrap().is_empty());
        assert!(parse_labels("<label_set/>").unwrap().is_empty());
    }
}
