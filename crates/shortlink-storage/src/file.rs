use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shortlink_core::{
    OwnerId, ReadRepository, Repository, Result, SavedUrl, ShortCode, StorageError, UrlRecord,
};
use shortlink_generator::{Generator, RandomGenerator};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// One line of the log: a record plus its sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    /// Decimal sequence number, only used to resume numbering on restart.
    uuid: String,
    #[serde(flatten)]
    record: UrlRecord,
}

#[derive(Debug)]
struct FileState {
    records: Vec<FileRecord>,
    next_id: u64,
}

impl FileState {
    fn find_by_original(&self, url: &str) -> Option<&UrlRecord> {
        self.records
            .iter()
            .map(|entry| &entry.record)
            .find(|record| record.original_url == url)
    }
}

/// Append-only JSON-lines implementation of the repository contract.
///
/// The whole file is replayed into memory on open and every new record is
/// appended and fsynced before it becomes visible. Soft deletes only touch
/// the in-memory index and are not written back, so they are forgotten on
/// restart.
///
/// A mutex serializes index updates with their file appends, so the index
/// never holds a record the log does not. A failed append is truncated away;
/// only when that truncation also fails can the log hold a line the index
/// lacks.
#[derive(Debug)]
pub struct FileRepository<G = RandomGenerator> {
    path: PathBuf,
    state: Mutex<FileState>,
    generator: G,
}

impl FileRepository<RandomGenerator> {
    /// Opens (or creates) the log at `path` with random 8-character codes.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_generator(path, RandomGenerator::new()).await
    }
}

impl<G: Generator> FileRepository<G> {
    /// Opens (or creates) the log at `path`, creating missing parent
    /// directories, and replays every line.
    ///
    /// A line that fails to decode aborts the open with
    /// [`StorageError::Decode`].
    pub async fn open_with_generator(path: impl AsRef<Path>, generator: G) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let mut records = Vec::new();
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let entry: FileRecord =
                serde_json::from_str(&line).map_err(|err| StorageError::Decode {
                    line: line_no,
                    message: err.to_string(),
                })?;
            records.push(entry);
        }

        let next_id = match records.last() {
            Some(last) => {
                let id: u64 = last.uuid.parse().map_err(|_| StorageError::Decode {
                    line: line_no,
                    message: format!("sequence id is not a decimal integer: '{}'", last.uuid),
                })?;
                id + 1
            }
            None => 1,
        };

        info!(path = %path.display(), records = records.len(), next_id, "opened url log");

        Ok(Self {
            path,
            state: Mutex::new(FileState { records, next_id }),
            generator,
        })
    }

    /// Path of the backing log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn generate_code(&self) -> ShortCode {
        self.generator.generate().into()
    }

    /// Appends `entries` in a single write and syncs the file.
    async fn append(&self, entries: &[FileRecord]) -> Result<()> {
        let mut buf = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|err| StorageError::InvalidData(err.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new().append(true).create(true).open(&self.path).await?;
        let len = file.metadata().await?.len();

        if let Err(err) = write_synced(&mut file, buf.as_bytes()).await {
            rewind(&file, &self.path, len).await;
            return Err(err.into());
        }
        Ok(())
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Cuts the log back to `len` after a failed append, so a line the caller was
/// told failed does not resurface on the next replay.
///
/// Best effort: if the truncation fails too, the log stays ahead of the
/// in-memory index until the next restart.
async fn rewind(file: &File, path: &Path, len: u64) {
    if let Err(err) = file.set_len(len).await {
        warn!(path = %path.display(), len, error = %err, "failed to rewind url log");
    }
}

#[async_trait]
impl<G: Generator> ReadRepository for FileRepository<G> {
    async fn retrieve_by_short_url(&self, code: &ShortCode) -> Result<UrlRecord> {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .find(|entry| &entry.record.short_url == code)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn retrieve_owner_urls(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|entry| &entry.record.owner_id == owner)
            .map(|entry| entry.record.clone())
            .collect())
    }

    async fn check_status(&self) -> Result<()> {
        File::open(&self.path)
            .await
            .map(|_| ())
            .map_err(|err| StorageError::Unavailable(format!("{}: {err}", self.path.display())))
    }
}

#[async_trait]
impl<G: Generator> Repository for FileRepository<G> {
    async fn save_url(&self, owner: &OwnerId, url: &str) -> Result<SavedUrl> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.find_by_original(url) {
            trace!(code = %existing.short_url, "url already stored");
            return Ok(SavedUrl {
                short_url: existing.short_url.clone(),
                already_existed: true,
            });
        }

        let code = self.generate_code();
        let entry = FileRecord {
            uuid: state.next_id.to_string(),
            record: UrlRecord::new(code.clone(), url, owner.clone()),
        };

        self.append(std::slice::from_ref(&entry)).await?;
        state.records.push(entry);
        state.next_id += 1;
        trace!(code = %code, owner = %owner, "appended url");

        Ok(SavedUrl {
            short_url: code,
            already_existed: false,
        })
    }

    async fn save_urls(&self, owner: &OwnerId, urls: &[String]) -> Result<Vec<ShortCode>> {
        let mut state = self.state.lock().await;
        let mut staged: Vec<FileRecord> = Vec::new();
        let mut codes = Vec::with_capacity(urls.len());

        for url in urls {
            let existing = state.find_by_original(url).or_else(|| {
                staged
                    .iter()
                    .map(|entry| &entry.record)
                    .find(|record| &record.original_url == url)
            });

            let code = match existing {
                Some(record) => record.short_url.clone(),
                None => {
                    let code = self.generate_code();
                    staged.push(FileRecord {
                        uuid: (state.next_id + staged.len() as u64).to_string(),
                        record: UrlRecord::new(code.clone(), url.as_str(), owner.clone()),
                    });
                    code
                }
            };
            codes.push(code);
        }

        if !staged.is_empty() {
            self.append(&staged).await?;
            state.next_id += staged.len() as u64;
            trace!(appended = staged.len(), owner = %owner, "appended url batch");
            state.records.extend(staged);
        }

        Ok(codes)
    }

    async fn delete_by_short_urls(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        let mut state = self.state.lock().await;

        let mut marked = 0;
        for entry in state.records.iter_mut().filter(|entry| {
            &entry.record.owner_id == owner && codes.contains(&entry.record.short_url)
        }) {
            entry.record.is_deleted = true;
            marked += 1;
        }

        // not written to the log; a restart restores these records
        debug!(owner = %owner, marked, "marked urls deleted in memory");
        Ok(())
    }
}
