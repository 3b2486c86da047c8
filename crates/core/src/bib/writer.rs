//! BibTeX output.
//!
//! Records that still carry their parsed text are written verbatim; edited or
//! merged records are rendered in a canonical layout.

use crate::models::{Record, Snapshot};

/// Layout knobs for rendered records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Indentation placed before each field line.
    pub indent: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
        }
    }
}

/// Serialize a snapshot: preamble blocks, records, trailer blocks, separated
/// by blank lines.
pub fn write_bibtex(snapshot: &Snapshot, options: &WriterOptions) -> String {
    let items: Vec<String> = snapshot
        .preamble()
        .iter()
        .cloned()
        .chain(snapshot.records().iter().map(|r| render_record(r, options)))
        .chain(snapshot.trailer().iter().cloned())
        .collect();

    if items.is_empty() {
        return String::new();
    }
    let mut out = items.join("\n\n");
    out.push('\n');
    out
}

/// Render one record, reusing its source text when it has one.
pub fn render_record(record: &Record, options: &WriterOptions) -> String {
    if let Some(source) = record.source() {
        return source.to_string();
    }

    let mut out = format!("@{}{{{},\n", record.entry_type(), record.key());
    for field in record.fields() {
        out.push_str(&options.indent);
        out.push_str(&field.name);
        out.push_str(" = ");
        out.push_str(&render_value(&field.value));
        out.push_str(",\n");
    }
    out.push('}');
    out
}

/// Turn a stored value back into BibTeX syntax. `#name#` segments become bare
/// macro references joined with `#`; everything else is braced.
fn render_value(value: &str) -> String {
    let parts = split_macros(value);
    if !parts.iter().any(|p| matches!(p, Part::Macro(_))) {
        return format!("{{{}}}", value);
    }
    parts
        .iter()
        .map(|p| match p {
            Part::Literal(text) => format!("{{{}}}", text),
            Part::Macro(name) => name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" # ")
}

enum Part<'a> {
    Literal(&'a str),
    Macro(&'a str),
}

fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/'))
}

fn split_macros(value: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut literal_start = 0;
    let mut search = 0;
    while let Some(rel) = value[search..].find('#') {
        let open = search + rel;
        let Some(rel_close) = value[open + 1..].find('#') else {
            break;
        };
        let close = open + 1 + rel_close;
        let name = &value[open + 1..close];
        if is_macro_name(name) {
            if open > literal_start {
                parts.push(Part::Literal(&value[literal_start..open]));
            }
            parts.push(Part::Macro(name));
            literal_start = close + 1;
            search = close + 1;
        } else {
            search = open + 1;
        }
    }
    if literal_start < value.len() {
        parts.push(Part::Literal(&value[literal_start..]));
    }
    parts
}
