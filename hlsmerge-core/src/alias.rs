//! Opaque proxy ids for variants and segments
//!
//! Ids are derived from content, so registering the same variant or segment
//! on every poll is naturally idempotent. Entries are never updated or
//! removed: an id handed to a client stays resolvable for the lifetime of
//! the process.

use dashmap::DashMap;
use url::Url;

use crate::models::{derive_alias_id, VariantKey};

#[derive(Debug, Default)]
pub struct AliasRegistry {
    variants: DashMap<String, VariantKey>,
    segments: DashMap<String, String>,
}

impl AliasRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant and return its id. Concurrent calls with equal
    /// keys all observe the same entry.
    pub fn register_variant(&self, key: &VariantKey) -> String {
        let id = key.alias_id();
        self.variants
            .entry(id.clone())
            .or_insert_with(|| key.clone());
        id
    }

    #[must_use]
    pub fn resolve_variant(&self, id: &str) -> Option<VariantKey> {
        self.variants.get(id).map(|entry| entry.value().clone())
    }

    /// Register a segment reference under `proxy_prefix` and return its id.
    pub fn register_segment(&self, source: &str, proxy_prefix: &str) -> String {
        let address = qualify_segment_address(source, proxy_prefix);
        let id = derive_alias_id(&address);
        self.segments.entry(id.clone()).or_insert(address);
        id
    }

    #[must_use]
    pub fn resolve_segment(&self, id: &str) -> Option<String> {
        self.segments.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every registered variant, sorted by key.
    #[must_use]
    pub fn variants(&self) -> Vec<(String, VariantKey)> {
        let mut variants: Vec<(String, VariantKey)> = self
            .variants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        variants.sort_by(|a, b| a.1.cmp(&b.1));
        variants
    }

    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Resolve a segment reference against its listing directory into the
/// fully-qualified origin address.
///
/// Absolute references are kept as-is. Relative ones follow RFC 3986
/// resolution, so root-relative (`/a.ts`) and scheme-relative
/// (`//cdn/a.ts`) references leave the directory. `proxy_prefix` is a
/// directory with or without a trailing slash.
#[must_use]
pub fn qualify_segment_address(source: &str, proxy_prefix: &str) -> String {
    if Url::parse(source).is_ok() {
        return source.to_string();
    }

    let directory = format!("{}/", proxy_prefix.trim_end_matches('/'));
    match Url::parse(&directory).and_then(|base| base.join(source)) {
        Ok(address) => address.to_string(),
        // Prefix is not a URL; nothing to resolve against
        Err(_) => format!("{directory}{}", source.trim_start_matches('/')),
    }
}
