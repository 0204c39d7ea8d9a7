//! Routing domain to credential key mapping.

use serde::Deserialize;

use crate::types::CredentialKey;

/// Pattern matching every domain.
pub const CATCH_ALL: &str = "*";

/// Ordered domain → credential key list. First match wins; matching is
/// exact and ASCII case-insensitive, with [`CATCH_ALL`] matching anything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<DomainEntry>")]
pub struct DomainCredentialMapping {
    entries: Vec<DomainEntry>,
}

/// One mapping entry, as it appears in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    pub domain: String,
    pub credential: CredentialKey,
}

impl From<Vec<DomainEntry>> for DomainCredentialMapping {
    fn from(entries: Vec<DomainEntry>) -> Self {
        entries.into_iter().fold(Self::new(), |mapping, entry| {
            mapping.with(entry.domain, entry.credential)
        })
    }
}

impl DomainCredentialMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn with(mut self, domain: impl Into<String>, credential: impl Into<CredentialKey>) -> Self {
        self.entries.push(DomainEntry {
            domain: domain.into().trim().to_ascii_lowercase(),
            credential: credential.into(),
        });
        self
    }

    pub fn resolve(&self, domain: &str) -> Option<&CredentialKey> {
        let domain = domain.trim();
        self.entries
            .iter()
            .find(|entry| entry.domain == CATCH_ALL || entry.domain.eq_ignore_ascii_case(domain))
            .map(|entry| &entry.credential)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
