//! Storage backends for the shortlink repository contract.
//!
//! Three interchangeable implementations of
//! [`Repository`](shortlink_core::Repository):
//!
//! - [`InMemoryRepository`]: process-lifetime vector, the reference behavior.
//! - [`FileRepository`]: append-only JSON-lines log replayed on open.
//! - [`MySqlRepository`]: MySQL with batched background deletion.

pub mod config;
pub mod deletion;
pub mod file;
pub mod memory;
pub mod mysql;

pub use config::{Storage, StorageConfig};
pub use deletion::{DeletionQueue, DeletionSink, PendingDeletion};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use mysql::{MySqlRepository, MySqlSettings};
pub use shortlink_core::{ReadRepository, Repository, StorageError};
