//! Query strings with an optional docset keyword prefix
//!
//! `py,django:QuerySet` searches for `QuerySet` in docsets matching the
//! keywords `py` or `django`. A `::` at the separator position is part of
//! the term, so C++ style names like `std::vector` are searched as-is.

use std::fmt;

const PREFIX_SEPARATOR: char = ':';
const KEYWORD_SEPARATOR: char = ',';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub keywords: Vec<String>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            keywords: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Self {
        let Some(at) = input.find(PREFIX_SEPARATOR) else {
            return Self::new(input.trim());
        };

        let doubled = input[at + 1..].starts_with(PREFIX_SEPARATOR);
        if at == 0 || doubled {
            return Self::new(input.trim());
        }

        let keywords = input[..at]
            .split(KEYWORD_SEPARATOR)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            term: input[at + 1..].trim().to_string(),
            keywords,
        }
    }

    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }

    /// True when `docset_keyword` starts with one of the query keywords
    pub fn matches_keyword(&self, docset_keyword: &str) -> bool {
        let docset_keyword = docset_keyword.to_lowercase();
        self.keywords
            .iter()
            .any(|k| docset_keyword.starts_with(&k.to_lowercase()))
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keywords.is_empty() {
            write!(f, "{}", self.term)
        } else {
            write!(
                f,
                "{}{}{}",
                self.keywords.join(","),
                PREFIX_SEPARATOR,
                self.term
            )
        }
    }
}
