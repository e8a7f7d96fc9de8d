use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Shown when the service answers without any summary text
pub const NO_SUMMARY_TEXT: &str = "No summary available.";

/// A source returned alongside a search summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
}

impl SearchLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchOutcome {
    pub summary: String,
    pub links: Vec<SearchLink>,
}

/// Keep the first link seen for each url, preserving order
pub fn dedupe_links(links: Vec<SearchLink>) -> Vec<SearchLink> {
    let mut seen: HashSet<String> = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let links = vec![
            SearchLink::new("A1", "a"),
            SearchLink::new("B", "b"),
            SearchLink::new("A2", "a"),
        ];
        assert_eq!(
            dedupe_links(links),
            vec![SearchLink::new("A1", "a"), SearchLink::new("B", "b")]
        );
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_links(Vec::new()).is_empty());
    }
}
