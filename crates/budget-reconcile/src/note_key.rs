use std::fmt;

use budget_model::CellValue;
use serde::{Deserialize, Serialize};

use crate::config::KeyStrategy;

/// Canonical key used to match a disbursement note across the two workbooks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteKey(String);

impl NoteKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty keys never match anything.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteKey {
    fn from(value: &str) -> Self {
        NoteKey(value.to_string())
    }
}

/// Derive the matching key for a raw identifier cell.
///
/// The value is rendered to its display text and trimmed; the suffix strategy then keeps the
/// trailing `len` characters (the whole string when it is shorter).
pub fn normalize_key(raw: &CellValue, strategy: &KeyStrategy) -> NoteKey {
    normalize_key_text(&raw.display_text(), strategy)
}

pub fn normalize_key_text(raw: &str, strategy: &KeyStrategy) -> NoteKey {
    let trimmed = raw.trim();
    match strategy {
        KeyStrategy::FullIdentifier => NoteKey(trimmed.to_string()),
        KeyStrategy::Suffix { len } => {
            let count = trimmed.chars().count();
            NoteKey(trimmed.chars().skip(count.saturating_sub(*len)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const SUFFIX8: KeyStrategy = KeyStrategy::Suffix { len: 8 };

    #[test]
    fn keeps_trailing_eight_characters() {
        assert_eq!(
            normalize_key_text("  2025NE00012345 ", &SUFFIX8).as_str(),
            "00012345"
        );
        assert_eq!(normalize_key_text("NE12", &SUFFIX8).as_str(), "NE12");
        assert_eq!(normalize_key_text("   ", &SUFFIX8).as_str(), "");
    }

    #[test]
    fn renders_non_text_values() {
        assert_eq!(normalize_key(&CellValue::Empty, &SUFFIX8).as_str(), "");
        assert!(normalize_key(&CellValue::Empty, &SUFFIX8).is_empty());
        assert_eq!(
            normalize_key(&CellValue::Number(2025000123456.0), &SUFFIX8).as_str(),
            "00123456"
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(
            normalize_key_text("NOTA-ÇÃO-ÉÊÍÓ", &KeyStrategy::Suffix { len: 4 }).as_str(),
            "ÉÊÍÓ"
        );
    }

    #[test]
    fn full_identifier_only_trims() {
        assert_eq!(
            normalize_key_text(" 2025NE000123 ", &KeyStrategy::FullIdentifier).as_str(),
            "2025NE000123"
        );
    }

    proptest! {
        #[test]
        fn suffix_is_bounded_and_trailing(raw in "\\PC{0,24}") {
            let key = normalize_key_text(&raw, &SUFFIX8);
            let trimmed = raw.trim();
            prop_assert!(key.as_str().chars().count() <= 8);
            prop_assert!(trimmed.ends_with(key.as_str()));
            if trimmed.chars().count() >= 8 {
                prop_assert_eq!(key.as_str().chars().count(), 8);
            } else {
                prop_assert_eq!(key.as_str(), trimmed);
            }
        }
    }
}
