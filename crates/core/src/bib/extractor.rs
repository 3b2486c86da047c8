//! Raw revision content to keyed [`Snapshot`].

use tracing::debug;

use crate::bib::{BibCodec, BibtexCodec};
use crate::errors::ParseError;
use crate::models::Snapshot;

/// Turns revision content into a snapshot using a codec's record boundaries.
///
/// Extraction is deterministic and all-or-nothing: a syntax error or a
/// duplicate key yields no snapshot at all.
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor<C = BibtexCodec> {
    codec: C,
}

impl<C: BibCodec> RecordExtractor<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Extract the snapshot held in `content`.
    pub fn extract(&self, content: &[u8]) -> Result<Snapshot, ParseError> {
        let parsed = self.codec.parse(content)?;
        let snapshot =
            Snapshot::from_records(parsed.records)?.with_blocks(parsed.preamble, parsed.trailer);
        debug!(
            bytes = content.len(),
            records = snapshot.len(),
            "extracted snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY: &str = "@article{a,\n  author = {A},\n}\n\n@book{b,\n  title = {B},\n}\n";

    #[test]
    fn test_extract_preserves_order() {
        let extractor = RecordExtractor::new(BibtexCodec::default());
        let snapshot = extractor.extract(LIBRARY.as_bytes()).unwrap();
        let keys: Vec<&str> = snapshot.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(snapshot.get("b").unwrap().field("title"), Some("B"));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = RecordExtractor::new(BibtexCodec::default());
        let first = extractor.extract(LIBRARY.as_bytes()).unwrap();
        let second = extractor.extract(LIBRARY.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_key_aborts() {
        let extractor = RecordExtractor::new(BibtexCodec::default());
        let content = "@misc{dup, note = {1}}\n@misc{other,}\n@misc{dup, note = {2}}\n";
        let err = extractor.extract(content.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateKey {
                key: "dup".into(),
                first_line: 1,
                second_line: 3,
            }
        );
    }

    #[test]
    fn test_empty_content_is_empty_snapshot() {
        let extractor = RecordExtractor::new(BibtexCodec::default());
        let snapshot = extractor.extract(b"").unwrap();
        assert!(snapshot.is_empty());
    }
}
