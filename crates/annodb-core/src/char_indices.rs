//! Conversions between character offsets and UTF-8 byte offsets
//!
//! Annotation positions are stored as character offsets (one Unicode scalar
//! value counts as one character). Exports also report the matching offsets
//! into the UTF-8 encoded text, and imports accept either form.

/// Character boundary table for one text
#[derive(Debug, Clone)]
pub struct CharIndices {
    /// Byte offset of every character boundary, including the end of the text
    boundaries: Vec<usize>,
}

impl CharIndices {
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Number of characters in the text
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Byte offset of character offset `char_index` (which may equal `char_len`)
    pub fn char_to_byte(&self, char_index: usize) -> Option<usize> {
        self.boundaries.get(char_index).copied()
    }

    /// Character offset of `byte_index`, if it falls on a character boundary
    pub fn byte_to_char(&self, byte_index: usize) -> Option<usize> {
        self.boundaries.binary_search(&byte_index).ok()
    }

    /// Whether `[start, end)` is a non-empty span inside the text
    pub fn is_valid_span(&self, start: usize, end: usize) -> bool {
        start < end && end <= self.char_len()
    }
}
