// ABOUTME: Field checks a record must pass before any backend persists it.
// ABOUTME: Keeps values that the line-oriented file format cannot hold out of every store.

use thiserror::Error;

/// Separates fields in a persisted line.
pub const FIELD_DELIMITER: char = ';';

/// A line whose first non-blank character is this is a comment.
pub const COMMENT_MARKER: char = '#';

/// Why a record was refused before being written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecord {
    #[error("{field} contains a line break")]
    LineBreak { field: &'static str },

    #[error("{field} contains the field delimiter ';'")]
    Delimiter { field: &'static str },

    #[error("{field} starts with the comment marker '#'")]
    CommentMarker { field: &'static str },
}

/// Free text stored last on its line: anything except a line break.
pub fn free_text(field: &'static str, value: &str) -> Result<(), InvalidRecord> {
    if value.contains(['\n', '\r']) {
        return Err(InvalidRecord::LineBreak { field });
    }
    Ok(())
}

/// A field at a fixed position: no line break and no delimiter.
pub fn positional(field: &'static str, value: &str) -> Result<(), InvalidRecord> {
    free_text(field, value)?;
    if value.contains(FIELD_DELIMITER) {
        return Err(InvalidRecord::Delimiter { field });
    }
    Ok(())
}

/// The first field of a line, which also must not read back as a comment.
pub fn leading(field: &'static str, value: &str) -> Result<(), InvalidRecord> {
    positional(field, value)?;
    if value.trim_start().starts_with(COMMENT_MARKER) {
        return Err(InvalidRecord::CommentMarker { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_allows_delimiters_but_not_line_breaks() {
        assert_eq!(free_text("reason", "come by; bring torches"), Ok(()));
        assert_eq!(free_text("reason", "#1 base"), Ok(()));
        assert_eq!(
            free_text("reason", "line1\nline2"),
            Err(InvalidRecord::LineBreak { field: "reason" })
        );
        assert_eq!(
            free_text("reason", "trailing\r"),
            Err(InvalidRecord::LineBreak { field: "reason" })
        );
    }

    #[test]
    fn positional_rejects_delimiter() {
        assert_eq!(positional("name", "Base #2"), Ok(()));
        assert_eq!(
            positional("name", "my;base"),
            Err(InvalidRecord::Delimiter { field: "name" })
        );
    }

    #[test]
    fn leading_rejects_comment_marker_even_after_spaces() {
        assert_eq!(leading("owner", "Steve#1"), Ok(()));
        assert_eq!(leading("owner", ""), Ok(()));
        assert_eq!(
            leading("owner", "  #steve"),
            Err(InvalidRecord::CommentMarker { field: "owner" })
        );
    }
}
