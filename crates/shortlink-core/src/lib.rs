//! Core types and traits for the shortlink storage engine.
//!
//! This crate provides the record model and the repository contract shared
//! by every storage backend.

pub mod error;
pub mod owner;
pub mod repository;
pub mod shortcode;

pub use error::{CoreError, Result, StorageError};
pub use owner::OwnerId;
pub use repository::{ReadRepository, Repository, SavedUrl, UrlRecord};
pub use shortcode::ShortCode;
