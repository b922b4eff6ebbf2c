use crate::error::Result;
use crate::owner::OwnerId;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored URL record in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The generated short code.
    pub short_url: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The user who first saved the URL.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    /// Set once by a soft delete, never cleared.
    pub is_deleted: bool,
}

impl UrlRecord {
    /// Creates a live record.
    pub fn new(short_url: ShortCode, original_url: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            short_url,
            original_url: original_url.into(),
            owner_id,
            is_deleted: false,
        }
    }
}

/// Outcome of [`Repository::save_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedUrl {
    /// The short code now mapped to the URL.
    pub short_url: ShortCode,
    /// `true` when the URL was already stored and nothing was written.
    pub already_existed: bool,
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the record for a given short code.
    ///
    /// Returns `Err(StorageError::NotFound)` if no record has that code.
    /// Soft-deleted records are still returned.
    async fn retrieve_by_short_url(&self, code: &ShortCode) -> Result<UrlRecord>;

    /// Retrieves every record owned by `owner`, soft-deleted ones included.
    /// Returns an empty vector when the owner has none.
    async fn retrieve_owner_urls(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>>;

    /// Liveness probe. Must not block indefinitely.
    async fn check_status(&self) -> Result<()>;
}

/// The storage contract shared by every backend.
#[async_trait]
pub trait Repository: ReadRepository {
    /// Saves `url` for `owner`.
    ///
    /// If a record with the same original URL exists, its short code is
    /// returned with `already_existed = true` and nothing is mutated.
    async fn save_url(&self, owner: &OwnerId, url: &str) -> Result<SavedUrl>;

    /// Saves a batch of URLs for `owner`, returning one short code per input
    /// in input order.
    ///
    /// Deduplication follows [`Repository::save_url`], also across entries of
    /// the same batch. The batch is applied all-or-nothing.
    async fn save_urls(&self, owner: &OwnerId, urls: &[String]) -> Result<Vec<ShortCode>>;

    /// Soft-deletes the records matching both `owner` and one of `codes`.
    ///
    /// Codes owned by someone else are silently ignored. Backends may apply
    /// the deletion asynchronously.
    async fn delete_by_short_urls(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()>;
}
