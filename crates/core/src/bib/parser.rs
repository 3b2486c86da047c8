//! BibTeX segmentation.
//!
//! Splits a `.bib` file into entries and non-entry blocks. Each entry keeps
//! its verbatim text so it can be written back unchanged. The grammar is the
//! lenient one reference managers accept in practice: `{}` or `()` entry
//! delimiters, braced/quoted/numeric/macro values with `#` concatenation, and
//! missing commas between fields.

use tracing::{debug, warn};

use crate::errors::ParseError;
use crate::models::Record;

/// Raw segmentation of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLibrary {
    pub records: Vec<Record>,
    /// `@string`, `@preamble`, and blocks before the first entry.
    pub preamble: Vec<String>,
    /// `@comment` blocks and free text after the first entry.
    pub trailer: Vec<String>,
}

/// Parse `.bib` text into a [`ParsedLibrary`].
pub fn parse_bibtex(src: &str) -> Result<ParsedLibrary, ParseError> {
    let mut cursor = Cursor::new(src);
    let mut library = ParsedLibrary::default();

    loop {
        let start = cursor.pos;
        let Some((at, entry_type)) = cursor.next_entry(start) else {
            push_block(&mut library, src[start..].trim(), false);
            break;
        };
        push_block(&mut library, src[start..at].trim(), false);

        let open = cursor.pos;
        let close = if cursor.peek() == Some(b'(') { b')' } else { b'}' };

        match entry_type.to_ascii_lowercase().as_str() {
            "comment" | "string" | "preamble" => {
                let end = cursor.block_end(open)?;
                let raw = &src[at..end];
                let always_preamble = !entry_type.eq_ignore_ascii_case("comment");
                push_block(&mut library, raw, always_preamble);
                cursor.pos = end;
            }
            _ => {
                cursor.pos = open + 1;
                let line = cursor.line_of(at);
                let record = parse_entry(&mut cursor, &entry_type, close)?;
                let raw = &src[at..cursor.pos];
                library.records.push(record.with_source(raw, line));
            }
        }
    }

    debug!(
        records = library.records.len(),
        preamble = library.preamble.len(),
        trailer = library.trailer.len(),
        "segmented bibtex content"
    );
    Ok(library)
}

fn push_block(library: &mut ParsedLibrary, text: &str, always_preamble: bool) {
    if text.is_empty() {
        return;
    }
    if always_preamble || library.records.is_empty() {
        library.preamble.push(text.to_string());
    } else {
        library.trailer.push(text.to_string());
    }
}

/// Parse the body of an entry; the cursor sits just after the opening delimiter.
fn parse_entry(cursor: &mut Cursor<'_>, entry_type: &str, close: u8) -> Result<Record, ParseError> {
    let src = cursor.src;
    cursor.skip_ws();
    let key_start = cursor.pos;
    while let Some(b) = cursor.peek() {
        if b == b',' || b == close || b.is_ascii_whitespace() {
            break;
        }
        cursor.pos += 1;
    }
    let key = &src[key_start..cursor.pos];
    if key.is_empty() {
        return Err(cursor.error(key_start, "expected entry key"));
    }
    let mut record = Record::new(key, entry_type);

    loop {
        cursor.skip_ws();
        match cursor.peek() {
            None => return Err(cursor.error(key_start, "unterminated entry")),
            Some(b',') => {
                cursor.pos += 1;
                continue;
            }
            Some(b) if b == close => {
                cursor.pos += 1;
                return Ok(record);
            }
            Some(_) => {}
        }

        let name_start = cursor.pos;
        let name = cursor.take_field_name();
        if name.is_empty() {
            return Err(cursor.error(name_start, "expected field name"));
        }
        cursor.skip_ws();
        if cursor.peek() != Some(b'=') {
            return Err(cursor.error(cursor.pos, "expected '=' after field name"));
        }
        cursor.pos += 1;
        let value = parse_value(cursor)?;
        if record.field(&name).is_some() {
            warn!(key, field = %name, "duplicate field in entry, keeping the last value");
        }
        record.set_field(name, value);
    }
}

/// Parse a field value, joining `#` concatenations. Macros are stored as
/// `#name#`; literal parts lose their delimiters.
fn parse_value(cursor: &mut Cursor<'_>) -> Result<String, ParseError> {
    let mut value = String::new();
    loop {
        cursor.skip_ws();
        let start = cursor.pos;
        match cursor.peek() {
            Some(b'{') => {
                let end = cursor.block_end(start)?;
                value.push_str(&cursor.src[start + 1..end - 1]);
                cursor.pos = end;
            }
            Some(b'"') => {
                let end = cursor.quoted_end(start)?;
                value.push_str(&cursor.src[start + 1..end - 1]);
                cursor.pos = end;
            }
            Some(b) if b.is_ascii_digit() => {
                while cursor.peek().is_some_and(|b| b.is_ascii_digit()) {
                    cursor.pos += 1;
                }
                value.push_str(&cursor.src[start..cursor.pos]);
            }
            Some(_) => {
                let name = cursor.take_identifier();
                if name.is_empty() {
                    return Err(cursor.error(start, "expected field value"));
                }
                value.push('#');
                value.push_str(&name);
                value.push('#');
            }
            None => return Err(cursor.error(start, "unterminated field value")),
        }
        cursor.skip_ws();
        if cursor.peek() == Some(b'#') {
            cursor.pos += 1;
        } else {
            return Ok(value);
        }
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Byte cursor over the source. Every delimiter is ASCII, so slicing at the
/// positions it stops on always lands on a UTF-8 boundary.
struct Cursor<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line_mark: (usize, usize),
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line_mark: (0, 1),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Find the next `@type{` or `@type(` at or after `from` and leave the
    /// cursor on its opening delimiter. Any other `@` is plain text, as in
    /// `% contact: me@example.org`.
    fn next_entry(&mut self, from: usize) -> Option<(usize, String)> {
        let mut search = from;
        while let Some(rel) = self.src[search..].find('@') {
            let at = search + rel;
            self.pos = at + 1;
            let entry_type = self.take_identifier();
            self.skip_ws();
            if !entry_type.is_empty() && matches!(self.peek(), Some(b'{' | b'(')) {
                return Some((at, entry_type));
            }
            search = at + 1;
        }
        None
    }

    fn take_identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.' | b'+' | b'/'))
        {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    fn take_field_name(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|b| {
            !b.is_ascii_whitespace() && !matches!(b, b'=' | b',' | b'{' | b'}' | b'(' | b')' | b'"' | b'#')
        }) {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    /// End (exclusive) of the balanced block opening at `open`.
    fn block_end(&self, open: usize) -> Result<usize, ParseError> {
        let paren = self.bytes[open] == b'(';
        let mut braces = 0usize;
        let mut parens = 0usize;
        for (i, &b) in self.bytes.iter().enumerate().skip(open) {
            match b {
                b'{' => braces += 1,
                b'}' => {
                    if braces == 0 {
                        return Err(self.error(i, "unbalanced '}'"));
                    }
                    braces -= 1;
                    if !paren && braces == 0 {
                        return Ok(i + 1);
                    }
                }
                b'(' if paren && braces == 0 => parens += 1,
                b')' if paren && braces == 0 => {
                    parens -= 1;
                    if parens == 0 {
                        return Ok(i + 1);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(open, "unterminated block"))
    }

    /// End (exclusive) of the quoted string opening at `open`.
    fn quoted_end(&self, open: usize) -> Result<usize, ParseError> {
        let mut braces = 0usize;
        for (i, &b) in self.bytes.iter().enumerate().skip(open + 1) {
            match b {
                b'{' => braces += 1,
                b'}' => braces = braces.saturating_sub(1),
                b'"' if braces == 0 => return Ok(i + 1),
                _ => {}
            }
        }
        Err(self.error(open, "unterminated quoted value"))
    }

    /// 1-based line of `offset`. Offsets must be requested in increasing order.
    fn line_of(&mut self, offset: usize) -> usize {
        let (mark, line) = self.line_mark;
        let line = if offset >= mark {
            line + self.bytes[mark..offset].iter().filter(|&&b| b == b'\n').count()
        } else {
            1 + self.bytes[..offset].iter().filter(|&&b| b == b'\n').count()
        };
        self.line_mark = (offset, line);
        line
    }

    fn error(&self, offset: usize, detail: &str) -> ParseError {
        let before = &self.src[..offset.min(self.src.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.len() - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
        ParseError::Syntax {
            line,
            column,
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_entry() {
        let src = "@Article{knuth84,\n  author = {Donald Knuth},\n  year = 1984,\n}\n";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.records.len(), 1);
        let r = &lib.records[0];
        assert_eq!(r.key(), "knuth84");
        assert_eq!(r.entry_type(), "article");
        assert_eq!(r.field("author"), Some("Donald Knuth"));
        assert_eq!(r.field("year"), Some("1984"));
        assert_eq!(r.line(), 1);
        assert_eq!(r.source(), Some(src.trim_end()));
    }

    #[test]
    fn test_missing_commas_between_fields() {
        let src = "@article{a,\n  author = {don't know the author}\n  doi = {xya},\n}\n";
        let lib = parse_bibtex(src).unwrap();
        let r = &lib.records[0];
        assert_eq!(r.field("author"), Some("don't know the author"));
        assert_eq!(r.field("doi"), Some("xya"));
    }

    #[test]
    fn test_nested_braces_and_quotes() {
        let src = r#"@book{b, title = {The {TeX}book}, note = "a {"}quoted{"} note"}"#;
        let lib = parse_bibtex(src).unwrap();
        let r = &lib.records[0];
        assert_eq!(r.field("title"), Some("The {TeX}book"));
        assert_eq!(r.field("note"), Some(r#"a {"}quoted{"} note"#));
    }

    #[test]
    fn test_macros_and_concatenation() {
        let src = "@string{acm = {ACM}}\n@misc{m, month = jan, publisher = acm # { Press}}";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.preamble, vec!["@string{acm = {ACM}}".to_string()]);
        let r = &lib.records[0];
        assert_eq!(r.field("month"), Some("#jan#"));
        assert_eq!(r.field("publisher"), Some("#acm# Press"));
    }

    #[test]
    fn test_parenthesized_entry() {
        let src = "@misc(p, title = {Paren (style)})";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.records[0].field("title"), Some("Paren (style)"));
        assert_eq!(lib.records[0].source(), Some(src));
    }

    #[test]
    fn test_blocks_are_split_around_entries() {
        let src = "% header\n\n@misc{x, note = {n}}\n\n@Comment{jabref-meta: databaseType:bibtex;}\n";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.preamble, vec!["% header".to_string()]);
        assert_eq!(
            lib.trailer,
            vec!["@Comment{jabref-meta: databaseType:bibtex;}".to_string()]
        );
    }

    #[test]
    fn test_stray_at_signs_are_plain_text() {
        let src = "% contact: me@example.org\n% see @ref below\n\n@misc{x, note = {n}}\n\nmail us@lab.edu\n";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.records.len(), 1);
        assert_eq!(lib.records[0].key(), "x");
        assert_eq!(
            lib.preamble,
            vec!["% contact: me@example.org\n% see @ref below".to_string()]
        );
        assert_eq!(lib.trailer, vec!["mail us@lab.edu".to_string()]);
    }

    #[test]
    fn test_entry_lines() {
        let src = "@misc{a,}\n\n\n@misc{b,}\n";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.records[0].line(), 1);
        assert_eq!(lib.records[1].line(), 4);
    }

    #[test]
    fn test_unterminated_entry_is_error() {
        let err = parse_bibtex("@article{a,\n  title = {x},\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_missing_equals_is_error() {
        let err = parse_bibtex("@article{a,\n  title {x}\n}").unwrap_err();
        match err {
            ParseError::Syntax { line, detail, .. } => {
                assert_eq!(line, 2);
                assert!(detail.contains("'='"));
            }
            other => panic!("expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_non_ascii_values() {
        let src = "@misc{ü, author = {Jürgen Müller}}";
        let lib = parse_bibtex(src).unwrap();
        assert_eq!(lib.records[0].key(), "ü");
        assert_eq!(lib.records[0].field("author"), Some("Jürgen Müller"));
    }
}
