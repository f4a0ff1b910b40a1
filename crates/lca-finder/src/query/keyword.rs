//! Keyword search conditions.

use unicode_normalization::UnicodeNormalization;

use super::Condition;

/// Keyword search over a single text column.
///
/// Each usable token becomes one case-insensitive contains match; all of
/// them must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSearch {
    field: String,
    tokens: Vec<String>,
}

impl KeywordSearch {
    pub fn new<I, S>(field: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits free text on whitespace.
    pub fn parse(field: impl Into<String>, input: &str) -> Self {
        Self::new(field, input.split_whitespace())
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Tokens after normalisation: NFKC folded (so full-width input matches
    /// stored names), trimmed, `*` turned into `%`, with empty tokens and
    /// lone quotes dropped.
    pub fn normalized_tokens(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| token.nfkc().collect::<String>())
            .filter_map(|token| {
                let token = token.trim();
                (!token.is_empty() && token != "'").then(|| token.replace('*', "%"))
            })
            .collect()
    }

    /// The AND group of contains matches, or `None` when no token is usable.
    pub fn to_condition(&self) -> Option<Condition> {
        let conditions: Vec<Condition> = self
            .normalized_tokens()
            .into_iter()
            .map(|token| Condition::contains(self.field.clone(), token))
            .collect();

        if conditions.is_empty() {
            None
        } else {
            Some(Condition::All(conditions))
        }
    }
}
