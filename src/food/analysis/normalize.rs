use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_MAX_ITEMS: usize = 20;
pub const DEFAULT_MIN_LEN: usize = 2;
pub const DEFAULT_MAX_LEN: usize = 29;

/// Cleaned ingredient names: lowercase, trimmed, unique, bounded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct IngredientList(Vec<String>);

impl IngredientList {
    /// Wraps names that are already known to be clean (the canned fallback sets).
    pub(crate) fn from_static(names: &[&str]) -> Self {
        Self(names.iter().map(|name| name.to_string()).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bounds applied to every raw candidate list before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePolicy {
    pub max_items: usize,
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            min_len: DEFAULT_MIN_LEN,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl NormalizePolicy {
    /// Trim, lowercase, length-filter, dedup (first seen wins) and truncate.
    ///
    /// Never fails and never substitutes defaults: an empty result is valid.
    pub fn normalize<I, S>(&self, raw: I) -> IngredientList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for candidate in raw {
            if out.len() >= self.max_items {
                break;
            }
            let cleaned = candidate.as_ref().trim().to_lowercase();
            let len = cleaned.chars().count();
            if len < self.min_len || len > self.max_len {
                continue;
            }
            if seen.insert(cleaned.clone()) {
                out.push(cleaned);
            }
        }

        IngredientList(out)
    }

    /// Splits typed input on commas and newlines, then normalizes it.
    pub fn normalize_text(&self, text: &str) -> IngredientList {
        self.normalize(text.split(|c| c == ',' || c == '\n' || c == ';'))
    }
}
