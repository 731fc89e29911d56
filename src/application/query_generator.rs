//! Query generation from canonical model names

use crate::domain::{IngestError, ModelQuery};

/// Turns input model names into search queries.
///
/// The optional hint is a category word appended to the search phrase on
/// the fallback search (e.g. `"mobile"`), never part of the match tokens.
#[derive(Debug, Clone, Default)]
pub struct QueryGenerator {
    search_hint: Option<String>,
}

impl QueryGenerator {
    pub fn new(search_hint: impl Into<String>) -> Self {
        let hint = search_hint.into();
        let hint = hint.trim();
        Self {
            search_hint: (!hint.is_empty()).then(|| hint.to_string()),
        }
    }

    pub fn generate(&self, name: &str) -> Result<ModelQuery, IngestError> {
        ModelQuery::from_name(name)
    }

    pub fn hint(&self) -> Option<&str> {
        self.search_hint.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_is_optional() {
        assert_eq!(QueryGenerator::new(" mobile ").hint(), Some("mobile"));
        assert_eq!(QueryGenerator::new("  ").hint(), None);
    }

    #[test]
    fn test_generate_keeps_canonical_name() {
        let query = QueryGenerator::new("mobile").generate("Samsung Galaxy S23 FE").unwrap();
        assert_eq!(query.canonical_name(), "Samsung Galaxy S23 FE");
        assert_eq!(query.normalized(), "samsung galaxy s23 fe");
    }
}
