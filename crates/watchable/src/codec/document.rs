#![forbid(unsafe_code)]

//! Framed binary documents.
//!
//! A stream is a sequence of top-level documents. Each document is laid out
//! the way BSON lays out a document of string elements:
//!
//! ```text
//! document := i32 total_len   (little endian, counts itself and the terminator)
//!             element*
//!             0x00
//! element  := 0x02 cstring(name) i32 str_len (bytes + 1) utf8_bytes 0x00
//! ```
//!
//! # Invariants
//!
//! 1. Writers and readers handle one open document at a time.
//! 2. A reader never moves its cursor when `read_start_document` fails, and
//!    [`DocumentReader::skip_document`] moves it exactly past the open
//!    document's terminator.
//! 3. A writer that abandons a document truncates everything written since
//!    the matching `write_start_document`.

use std::fmt;

const ELEMENT_STRING: u8 = 0x02;
const TERMINATOR: u8 = 0x00;
const LEN_PREFIX: usize = 4;
/// Smallest document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: usize = LEN_PREFIX + 1;

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The stream ended before `needed` more bytes at `offset`.
    UnexpectedEof { offset: usize, needed: usize },
    /// A length prefix is negative, too small, or overruns its container.
    InvalidLength { offset: usize, length: i64 },
    /// A document is already open.
    DocumentAlreadyOpen,
    /// No document is open.
    NoOpenDocument,
    /// An element of an unsupported type was found.
    UnexpectedElementType { offset: usize, found: u8 },
    /// A field other than the expected one was found.
    UnexpectedField { expected: String, found: String },
    /// The document ended before the expected field.
    MissingField { expected: String },
    /// Bytes remain between the last element and the end of the document.
    TrailingData { offset: usize },
    /// A string or name is not valid UTF-8 or lacks its NUL terminator.
    MalformedString { offset: usize },
    /// A field name contains a NUL byte.
    InvalidFieldName(String),
    /// The document would exceed the `i32` length range.
    TooLarge,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { offset, needed } => {
                write!(f, "unexpected end of stream at {offset} ({needed} more bytes needed)")
            }
            Self::InvalidLength { offset, length } => {
                write!(f, "invalid length {length} at {offset}")
            }
            Self::DocumentAlreadyOpen => f.write_str("a document is already open"),
            Self::NoOpenDocument => f.write_str("no document is open"),
            Self::UnexpectedElementType { offset, found } => {
                write!(f, "unexpected element type 0x{found:02x} at {offset}")
            }
            Self::UnexpectedField { expected, found } => {
                write!(f, "expected field '{expected}', found '{found}'")
            }
            Self::MissingField { expected } => write!(f, "missing field '{expected}'"),
            Self::TrailingData { offset } => write!(f, "trailing data in document at {offset}"),
            Self::MalformedString { offset } => write!(f, "malformed string at {offset}"),
            Self::InvalidFieldName(name) => write!(f, "invalid field name {name:?}"),
            Self::TooLarge => f.write_str("document exceeds the maximum length"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Sequential writer of framed documents.
pub trait DocumentWriter {
    /// Open a new top-level document.
    fn write_start_document(&mut self) -> Result<(), DocumentError>;
    /// Append a string field to the open document.
    fn write_string(&mut self, name: &str, value: &str) -> Result<(), DocumentError>;
    /// Close the open document.
    fn write_end_document(&mut self) -> Result<(), DocumentError>;
    /// Discard the open document, if any, as if it had never been started.
    fn abandon_document(&mut self);
}

/// Sequential reader of framed documents.
pub trait DocumentReader {
    /// Enter the next top-level document.
    fn read_start_document(&mut self) -> Result<(), DocumentError>;
    /// Read the next field, which must be a string named `name`.
    fn read_string(&mut self, name: &str) -> Result<String, DocumentError>;
    /// Leave the open document; no fields may remain.
    fn read_end_document(&mut self) -> Result<(), DocumentError>;
    /// Move past the end of the open document, whatever remains in it.
    fn skip_document(&mut self) -> Result<(), DocumentError>;
    /// Current byte offset in the stream.
    fn position(&self) -> usize;
}

/// In-memory [`DocumentWriter`].
#[derive(Debug, Default, Clone)]
pub struct BinaryDocumentWriter {
    buf: Vec<u8>,
    open: Option<usize>,
}

impl BinaryDocumentWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far (including any open, unfinished document).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer and return its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Whether a document is currently open.
    #[must_use]
    pub fn is_document_open(&self) -> bool {
        self.open.is_some()
    }

    fn write_cstring(&mut self, name: &str) -> Result<(), DocumentError> {
        if name.as_bytes().contains(&TERMINATOR) {
            return Err(DocumentError::InvalidFieldName(name.to_string()));
        }
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(TERMINATOR);
        Ok(())
    }
}

fn encode_len(len: usize) -> Result<[u8; 4], DocumentError> {
    i32::try_from(len)
        .map(i32::to_le_bytes)
        .map_err(|_| DocumentError::TooLarge)
}

impl DocumentWriter for BinaryDocumentWriter {
    fn write_start_document(&mut self) -> Result<(), DocumentError> {
        if self.open.is_some() {
            return Err(DocumentError::DocumentAlreadyOpen);
        }
        self.open = Some(self.buf.len());
        self.buf.extend_from_slice(&[0; LEN_PREFIX]);
        Ok(())
    }

    fn write_string(&mut self, name: &str, value: &str) -> Result<(), DocumentError> {
        if self.open.is_none() {
            return Err(DocumentError::NoOpenDocument);
        }
        let len = encode_len(value.len() + 1)?;
        let mark = self.buf.len();
        self.buf.push(ELEMENT_STRING);
        if let Err(err) = self.write_cstring(name) {
            self.buf.truncate(mark);
            return Err(err);
        }
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(TERMINATOR);
        Ok(())
    }

    fn write_end_document(&mut self) -> Result<(), DocumentError> {
        let start = self.open.ok_or(DocumentError::NoOpenDocument)?;
        self.buf.push(TERMINATOR);
        let len = match encode_len(self.buf.len() - start) {
            Ok(len) => len,
            Err(err) => {
                self.abandon_document();
                return Err(err);
            }
        };
        self.buf[start..start + LEN_PREFIX].copy_from_slice(&len);
        self.open = None;
        Ok(())
    }

    fn abandon_document(&mut self) {
        if let Some(start) = self.open.take() {
            self.buf.truncate(start);
        }
    }
}

/// [`DocumentReader`] over a byte slice.
#[derive(Debug, Clone)]
pub struct BinaryDocumentReader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Offset one past the open document's terminator.
    open_end: Option<usize>,
}

impl<'a> BinaryDocumentReader<'a> {
    /// Read documents from `buf`, starting at offset 0.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            open_end: None,
        }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn require(&self, needed: usize, limit: usize) -> Result<(), DocumentError> {
        if self.pos + needed > limit {
            return Err(DocumentError::UnexpectedEof {
                offset: self.pos,
                needed: self.pos + needed - limit,
            });
        }
        Ok(())
    }

    fn peek_i32(&self, limit: usize) -> Result<i32, DocumentError> {
        self.require(LEN_PREFIX, limit)?;
        let mut bytes = [0; LEN_PREFIX];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + LEN_PREFIX]);
        Ok(i32::from_le_bytes(bytes))
    }

    fn read_cstring(&mut self, limit: usize) -> Result<String, DocumentError> {
        let start = self.pos;
        let nul = self.buf[start..limit]
            .iter()
            .position(|&b| b == TERMINATOR)
            .ok_or(DocumentError::MalformedString { offset: start })?;
        let text = std::str::from_utf8(&self.buf[start..start + nul])
            .map_err(|_| DocumentError::MalformedString { offset: start })?;
        self.pos = start + nul + 1;
        Ok(text.to_string())
    }
}

impl DocumentReader for BinaryDocumentReader<'_> {
    fn read_start_document(&mut self) -> Result<(), DocumentError> {
        if self.open_end.is_some() {
            return Err(DocumentError::DocumentAlreadyOpen);
        }
        let length = self.peek_i32(self.buf.len())?;
        let len = usize::try_from(length)
            .ok()
            .filter(|&len| len >= MIN_DOCUMENT_LEN)
            .ok_or(DocumentError::InvalidLength {
                offset: self.pos,
                length: i64::from(length),
            })?;
        self.require(len, self.buf.len())?;
        self.open_end = Some(self.pos + len);
        self.pos += LEN_PREFIX;
        Ok(())
    }

    fn read_string(&mut self, name: &str) -> Result<String, DocumentError> {
        let end = self.open_end.ok_or(DocumentError::NoOpenDocument)?;
        // The last byte of the document is its terminator.
        let body_end = end - 1;
        if self.pos >= body_end {
            return Err(DocumentError::MissingField {
                expected: name.to_string(),
            });
        }

        let element_at = self.pos;
        let element_type = self.buf[element_at];
        if element_type != ELEMENT_STRING {
            return Err(DocumentError::UnexpectedElementType {
                offset: element_at,
                found: element_type,
            });
        }
        self.pos += 1;

        let found = self.read_cstring(body_end)?;
        if found != name {
            return Err(DocumentError::UnexpectedField {
                expected: name.to_string(),
                found,
            });
        }

        let len_at = self.pos;
        let length = self.peek_i32(body_end)?;
        let len = usize::try_from(length)
            .ok()
            .filter(|&len| len >= 1)
            .ok_or(DocumentError::InvalidLength {
                offset: len_at,
                length: i64::from(length),
            })?;
        self.pos += LEN_PREFIX;
        self.require(len, body_end)?;

        let bytes = &self.buf[self.pos..self.pos + len];
        let (text, terminator) = bytes.split_at(len - 1);
        if terminator != [TERMINATOR] {
            return Err(DocumentError::MalformedString { offset: self.pos });
        }
        let value = std::str::from_utf8(text)
            .map_err(|_| DocumentError::MalformedString { offset: self.pos })?
            .to_string();
        self.pos += len;
        Ok(value)
    }

    fn read_end_document(&mut self) -> Result<(), DocumentError> {
        let end = self.open_end.ok_or(DocumentError::NoOpenDocument)?;
        if self.pos != end - 1 {
            return Err(DocumentError::TrailingData { offset: self.pos });
        }
        if self.buf[self.pos] != TERMINATOR {
            return Err(DocumentError::UnexpectedElementType {
                offset: self.pos,
                found: self.buf[self.pos],
            });
        }
        self.pos = end;
        self.open_end = None;
        Ok(())
    }

    fn skip_document(&mut self) -> Result<(), DocumentError> {
        let end = self.open_end.take().ok_or(DocumentError::NoOpenDocument)?;
        self.pos = end;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }
}
