use async_trait::async_trait;
use parking_lot::RwLock;
use shortlink_core::{
    OwnerId, ReadRepository, Repository, Result, SavedUrl, ShortCode, StorageError, UrlRecord,
};
use shortlink_generator::{Generator, RandomGenerator};
use tracing::trace;

/// In-memory implementation of the repository contract.
///
/// Records are kept in insertion order and scanned linearly. Nothing is
/// persisted; this backend is the reference the other two are checked
/// against.
#[derive(Debug)]
pub struct InMemoryRepository<G = RandomGenerator> {
    records: RwLock<Vec<UrlRecord>>,
    generator: G,
}

impl InMemoryRepository<RandomGenerator> {
    /// Creates a new in-memory repository with random 8-character codes.
    pub fn new() -> Self {
        Self::with_generator(RandomGenerator::new())
    }
}

impl Default for InMemoryRepository<RandomGenerator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Generator> InMemoryRepository<G> {
    pub fn with_generator(generator: G) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            generator,
        }
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn generate_code(&self) -> ShortCode {
        self.generator.generate().into()
    }
}

fn find_by_original<'a>(records: &'a [UrlRecord], url: &str) -> Option<&'a UrlRecord> {
    records.iter().find(|record| record.original_url == url)
}

#[async_trait]
impl<G: Generator> ReadRepository for InMemoryRepository<G> {
    async fn retrieve_by_short_url(&self, code: &ShortCode) -> Result<UrlRecord> {
        self.records
            .read()
            .iter()
            .find(|record| &record.short_url == code)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn retrieve_owner_urls(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| &record.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn check_status(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<G: Generator> Repository for InMemoryRepository<G> {
    async fn save_url(&self, owner: &OwnerId, url: &str) -> Result<SavedUrl> {
        let mut records = self.records.write();

        if let Some(existing) = find_by_original(&records, url) {
            trace!(code = %existing.short_url, "url already stored");
            return Ok(SavedUrl {
                short_url: existing.short_url.clone(),
                already_existed: true,
            });
        }

        let code = self.generate_code();
        records.push(UrlRecord::new(code.clone(), url, owner.clone()));
        trace!(code = %code, owner = %owner, "stored url");

        Ok(SavedUrl {
            short_url: code,
            already_existed: false,
        })
    }

    async fn save_urls(&self, owner: &OwnerId, urls: &[String]) -> Result<Vec<ShortCode>> {
        let mut records = self.records.write();
        let mut codes = Vec::with_capacity(urls.len());

        for url in urls {
            let code = match find_by_original(&records, url) {
                Some(existing) => existing.short_url.clone(),
                None => {
                    let code = self.generate_code();
                    records.push(UrlRecord::new(code.clone(), url.as_str(), owner.clone()));
                    code
                }
            };
            codes.push(code);
        }

        trace!(count = codes.len(), owner = %owner, "stored url batch");
        Ok(codes)
    }

    async fn delete_by_short_urls(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        let mut records = self.records.write();

        for record in records
            .iter_mut()
            .filter(|record| &record.owner_id == owner && codes.contains(&record.short_url))
        {
            record.is_deleted = true;
        }

        Ok(())
    }
}
