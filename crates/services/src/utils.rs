//! Small helpers shared by the services.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Salted SHA-256 of a network origin, hex encoded.
///
/// The rate-limit ledger and anonymous reviews are keyed by this digest so a
/// raw address is never persisted.
#[derive(Clone)]
pub struct OriginHasher {
    salt: Arc<SecretString>,
}

impl OriginHasher {
    pub fn new(salt: SecretString) -> Self {
        Self {
            salt: Arc::new(salt),
        }
    }

    pub fn hash(&self, origin: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.expose_secret().as_bytes());
        hasher.update(b":");
        hasher.update(origin.trim().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for OriginHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginHasher").finish_non_exhaustive()
    }
}

/// Page metadata returned with every paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: usize) -> Self {
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size.max(1) as usize) as u32,
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }

    /// The slice of `items` this page covers.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .collect()
    }
}

/// Normalizes a requested page and size: page is 1-based, size falls back to
/// `default` and is clamped to `1..=max`.
pub fn clamp_page(page: Option<u32>, page_size: Option<u32>, default: u32, max: u32) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(default).clamp(1, max.max(1));
    (page, page_size)
}
