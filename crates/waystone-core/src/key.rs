// ABOUTME: Canonicalizes identifier strings into case-insensitive lookup keys.
// ABOUTME: Every store lookup, insert, and duplicate check compares Normalized values.

use std::fmt;

/// Fold an identifier to its canonical lookup form. Unicode-aware lowercase;
/// empty strings are valid and stay empty.
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
}

/// A single identifier component in canonical form. Records keep their
/// original-case values for display; keys built from them hold these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Normalized(String);

impl Normalized {
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Normalized {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<&String> for Normalized {
    fn from(raw: &String) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differently_cased_identifiers_compare_equal() {
        assert_eq!(Normalized::new("Steve"), Normalized::new("sTEVE"));
        assert_eq!(Normalized::new("Base").as_str(), "base");
    }

    #[test]
    fn empty_identifier_is_a_valid_key() {
        let empty = Normalized::new("");
        assert_eq!(empty.as_str(), "");
        assert_eq!(empty, Normalized::from(""));
    }

    #[test]
    fn folds_non_ascii_letters() {
        assert_eq!(Normalized::new("ÄRGER"), Normalized::new("ärger"));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let once = normalize("MiXeD Name");
        assert_eq!(normalize(&once), once);
    }
}
