use crate::deletion::{
    DeletionQueue, DeletionSink, PendingDeletion, DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_CAPACITY,
};
use async_trait::async_trait;
use shortlink_core::{
    OwnerId, ReadRepository, Repository, Result, SavedUrl, ShortCode, StorageError, UrlRecord,
};
use shortlink_generator::{Generator, RandomGenerator};
use sqlx::mysql::MySqlRow;
use sqlx::{Connection, MySqlExecutor, MySqlPool, Row};
use std::time::Duration;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

const INSERT_URL: &str = r#"
    INSERT INTO short_urls (short_url, original_url, user_id)
    VALUES (?, ?, ?)
"#;

const SELECT_SHORT_URL_BY_ORIGINAL: &str = r#"
    SELECT short_url
    FROM short_urls
    WHERE original_url = ?
    LIMIT 1
"#;

const SELECT_BY_SHORT_URL: &str = r#"
    SELECT short_url, original_url, user_id, is_deleted
    FROM short_urls
    WHERE short_url = ?
    LIMIT 1
"#;

const SELECT_BY_USER: &str = r#"
    SELECT short_url, original_url, user_id, is_deleted
    FROM short_urls
    WHERE user_id = ?
"#;

const MARK_DELETED: &str = r#"
    UPDATE short_urls
    SET is_deleted = TRUE
    WHERE user_id = ?
      AND short_url = ?
"#;

/// Tuning knobs for [`MySqlRepository`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct MySqlSettings {
    /// How often queued deletions are committed.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Deletions that may wait in the queue before producers block.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Upper bound for [`ReadRepository::check_status`].
    #[builder(default = DEFAULT_PING_TIMEOUT)]
    pub ping_timeout: Duration,
}

impl Default for MySqlSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// MySQL implementation of the repository contract.
///
/// Deduplication relies on the unique key over `original_url`: a save first
/// tries the insert and only looks up the existing code when the insert hits
/// a unique violation. A concurrent save of the same URL that has not
/// committed yet is invisible to that lookup; the call then fails with
/// [`StorageError::Conflict`]. The window is narrow and deliberately left
/// open rather than serialized with a lock.
///
/// Deletions go through a [`DeletionQueue`] and become visible after the
/// next flush, at most one flush interval later.
#[derive(Debug)]
pub struct MySqlRepository<G = RandomGenerator> {
    pool: MySqlPool,
    generator: G,
    deletions: DeletionQueue,
    ping_timeout: Duration,
}

impl MySqlRepository<RandomGenerator> {
    /// Creates a repository from an existing pool with default settings.
    ///
    /// Spawns the deletion worker, so it must run inside a Tokio runtime.
    pub fn new(pool: MySqlPool) -> Self {
        Self::with_settings(pool, MySqlSettings::default(), RandomGenerator::new())
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, MySqlSettings::default()).await
    }

    /// Like [`MySqlRepository::connect`] with explicit settings.
    pub async fn connect_with(database_url: &str, settings: MySqlSettings) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::with_settings(pool, settings, RandomGenerator::new()))
    }
}

impl<G: Generator> MySqlRepository<G> {
    pub fn with_settings(pool: MySqlPool, settings: MySqlSettings, generator: G) -> Self {
        let deletions = DeletionQueue::spawn(
            MySqlDeletionSink { pool: pool.clone() },
            settings.queue_capacity,
            settings.flush_interval,
        );

        Self {
            pool,
            generator,
            deletions,
            ping_timeout: settings.ping_timeout,
        }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Handle to the background deletion worker.
    pub fn deletion_queue(&self) -> &DeletionQueue {
        &self.deletions
    }

    /// Flushes queued deletions and stops the worker. The pool stays open.
    pub async fn shutdown(&self) {
        self.deletions.shutdown().await;
    }

    fn generate_code(&self) -> ShortCode {
        self.generator.generate().into()
    }
}

/// Commits deletion batches in one transaction.
#[derive(Debug, Clone)]
struct MySqlDeletionSink {
    pool: MySqlPool,
}

#[async_trait]
impl DeletionSink for MySqlDeletionSink {
    async fn apply(&self, batch: &[PendingDeletion]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for entry in batch {
            sqlx::query(MARK_DELETED)
                .bind(entry.owner_id.as_str())
                .bind(entry.short_url.as_str())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &MySqlRow) -> Result<UrlRecord> {
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let user_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
    let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        short_url: ShortCode::new_unchecked(short_url),
        original_url,
        owner_id: OwnerId::new_unchecked(user_id),
        is_deleted,
    })
}

async fn insert_url<'e, E: MySqlExecutor<'e>>(
    executor: E,
    code: &ShortCode,
    url: &str,
    owner: &OwnerId,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(INSERT_URL)
        .bind(code.as_str())
        .bind(url)
        .bind(owner.as_str())
        .execute(executor)
        .await
        .map(|_| ())
}

async fn find_short_url<'e, E: MySqlExecutor<'e>>(
    executor: E,
    url: &str,
) -> Result<Option<ShortCode>> {
    let code = sqlx::query_scalar::<_, String>(SELECT_SHORT_URL_BY_ORIGINAL)
        .bind(url)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;

    Ok(code.map(ShortCode::new_unchecked))
}

#[async_trait]
impl<G: Generator> ReadRepository for MySqlRepository<G> {
    async fn retrieve_by_short_url(&self, code: &ShortCode) -> Result<UrlRecord> {
        let row = sqlx::query(SELECT_BY_SHORT_URL)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StorageError::NotFound(code.to_string())),
        }
    }

    async fn retrieve_owner_urls(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(SELECT_BY_USER)
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn check_status(&self) -> Result<()> {
        let ping = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            Ok::<(), sqlx::Error>(())
        };

        match tokio::time::timeout(self.ping_timeout, ping).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StorageError::Timeout(format!(
                "ping did not answer within {:?}",
                self.ping_timeout
            ))),
        }
    }
}

#[async_trait]
impl<G: Generator> Repository for MySqlRepository<G> {
    async fn save_url(&self, owner: &OwnerId, url: &str) -> Result<SavedUrl> {
        let code = self.generate_code();

        match insert_url(&self.pool, &code, url, owner).await {
            Ok(()) => {
                trace!(code = %code, owner = %owner, "inserted url");
                Ok(SavedUrl {
                    short_url: code,
                    already_existed: false,
                })
            }
            Err(err) if is_unique_violation(&err) => match find_short_url(&self.pool, url).await? {
                Some(existing) => {
                    trace!(code = %existing, "url already stored");
                    Ok(SavedUrl {
                        short_url: existing,
                        already_existed: true,
                    })
                }
                // the conflicting row is not visible yet, or the generated
                // code collided with another url's code
                None => Err(StorageError::Conflict(format!(
                    "unique violation for '{url}' with no visible existing row"
                ))),
            },
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn save_urls(&self, owner: &OwnerId, urls: &[String]) -> Result<Vec<ShortCode>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut codes = Vec::with_capacity(urls.len());

        for url in urls {
            let code = match find_short_url(&mut *tx, url).await? {
                Some(existing) => existing,
                None => {
                    let code = self.generate_code();
                    insert_url(&mut *tx, &code, url, owner)
                        .await
                        .map_err(map_sqlx_error)?;
                    code
                }
            };
            codes.push(code);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = codes.len(), owner = %owner, "committed url batch");

        Ok(codes)
    }

    async fn delete_by_short_urls(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        self.deletions.enqueue(owner, codes).await
    }
}
