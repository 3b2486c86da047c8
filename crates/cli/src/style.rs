//! Terminal styling for merge reports.

use console::Style;

use bibsync_core::models::{DeltaKind, Origin};

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark before `msg`.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// Red cross before `msg`.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

/// Yellow warning sign before `msg`.
pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

/// Bold section title.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Label for which side a change came from.
pub fn origin(origin: Origin) -> String {
    let style = match origin {
        Origin::Local => Style::new().blue().bold(),
        Origin::Remote => Style::new().magenta().bold(),
        Origin::Both => Style::new().green().bold(),
    };
    style.apply_to(origin.to_string()).to_string()
}

/// Colored classification tag.
pub fn delta_kind(kind: DeltaKind) -> String {
    let style = match kind {
        DeltaKind::Unchanged => Style::new().dim(),
        DeltaKind::AddedLocal | DeltaKind::AddedRemote | DeltaKind::AddedBoth => {
            Style::new().green()
        }
        DeltaKind::RemovedLocal | DeltaKind::RemovedRemote | DeltaKind::RemovedBoth => {
            Style::new().red()
        }
        DeltaKind::Modified => Style::new().yellow(),
    };
    style.apply_to(kind.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_keep_their_text() {
        console::set_colors_enabled(false);
        assert_eq!(success("done"), "✓ done");
        assert_eq!(warn("careful"), "⚠ careful");
        assert_eq!(origin(Origin::Remote), "remote");
        assert_eq!(delta_kind(DeltaKind::AddedBoth), DeltaKind::AddedBoth.to_string());
    }
}
