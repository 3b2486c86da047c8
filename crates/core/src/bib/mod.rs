//! Bibliography codec and record extraction.
//!
//! The merge engine only depends on the [`BibCodec`] trait: segment bytes
//! into records, and write a snapshot back out. [`BibtexCodec`] is the
//! `.bib` implementation.

pub mod extractor;
pub mod parser;
pub mod writer;

pub use extractor::RecordExtractor;
pub use parser::{parse_bibtex, ParsedLibrary};
pub use writer::{render_record, write_bibtex, WriterOptions};

use crate::errors::ParseError;
use crate::models::Snapshot;

/// Segmentation and serialization of bibliography content.
pub trait BibCodec {
    /// Split raw revision content into records and non-record blocks.
    fn parse(&self, content: &[u8]) -> Result<ParsedLibrary, ParseError>;

    /// Write a snapshot. Records unchanged since parsing must come out
    /// byte-identical.
    fn serialize(&self, snapshot: &Snapshot) -> Vec<u8>;
}

/// BibTeX codec.
#[derive(Debug, Clone, Default)]
pub struct BibtexCodec {
    options: WriterOptions,
}

impl BibtexCodec {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }
}

impl BibCodec for BibtexCodec {
    fn parse(&self, content: &[u8]) -> Result<ParsedLibrary, ParseError> {
        let text = std::str::from_utf8(content).map_err(|e| ParseError::InvalidEncoding {
            offset: e.valid_up_to(),
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        parse_bibtex(text)
    }

    fn serialize(&self, snapshot: &Snapshot) -> Vec<u8> {
        write_bibtex(snapshot, &self.options).into_bytes()
    }
}
