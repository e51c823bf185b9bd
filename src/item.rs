use std::fmt;

use crate::error::LabelError;

/// Longest label in bytes. Matches a 100 byte buffer with room for a
/// terminator.
pub const MAX_LABEL_LEN: usize = 99;

/// Owned text of at most [`MAX_LABEL_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    /// Builds a label, cutting `text` at the last char boundary that fits.
    pub fn new(text: &str) -> Self {
        if text.len() <= MAX_LABEL_LEN {
            return Label(text.to_owned());
        }
        let mut end = MAX_LABEL_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Label(text[..end].to_owned())
    }

    /// Builds a label, rejecting text that does not fit.
    pub fn try_new(text: &str) -> Result<Self, LabelError> {
        if text.len() > MAX_LABEL_LEN {
            return Err(LabelError::TooLong {
                len: text.len(),
                max: MAX_LABEL_LEN,
            });
        }
        Ok(Label(text.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work handed from the producer to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    id: u32,
    label: Label,
}

impl QueueItem {
    pub fn new(id: u32, label: Label) -> Self {
        Self { id, label }
    }

    /// Item with the label `"{prefix} {id}"`.
    pub fn numbered(id: u32, prefix: &str) -> Self {
        Self::new(id, Label::new(&format!("{prefix} {id}")))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &Label {
        &self.label
    }
}
