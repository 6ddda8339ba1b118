use crate::result::LinkReference;
use std::collections::HashMap;

/// Attribution index from a target URL to the pages that link to it.
///
/// References are unique per `(found_on_page, link_text)` and keep insertion
/// order, so the first page that linked to a URL is always reported first.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    references: HashMap<String, Vec<LinkReference>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reference` for `url`. Returns `false` when an equivalent
    /// attribution was already present.
    pub fn register(&mut self, url: &str, reference: LinkReference) -> bool {
        let entries = self.references.entry(url.to_string()).or_default();
        let duplicate = entries.iter().any(|existing| {
            existing.found_on_page == reference.found_on_page
                && existing.link_text == reference.link_text
        });
        if duplicate {
            return false;
        }
        entries.push(reference);
        true
    }

    pub fn references_for(&self, url: &str) -> &[LinkReference] {
        self.references
            .get(url)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, url: &str) -> bool {
        !self.references_for(url).is_empty()
    }

    /// Number of distinct target URLs.
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
