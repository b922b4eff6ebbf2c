use clap::{Parser, Subcommand, ValueEnum};
use shortlink_storage::{MySqlSettings, StorageConfig};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const STORAGE_BACKEND_ENV: &str = "SHORTLINK_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SHORTLINK_FILE_STORAGE_PATH";
pub const MYSQL_DSN_ENV: &str = "SHORTLINK_MYSQL_DSN";
pub const DELETE_FLUSH_INTERVAL_ENV: &str = "SHORTLINK_DELETE_FLUSH_INTERVAL_SECS";
pub const BASE_URL_ENV: &str = "SHORTLINK_BASE_URL";
pub const LOG_FORMAT_ENV: &str = "SHORTLINK_LOG_FORMAT";

pub const DEFAULT_DELETE_FLUSH_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one or more URLs for an owner.
    Shorten {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show the record behind a short code.
    Get { code: String },
    /// List every record of an owner.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Soft-delete short codes owned by an owner.
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Probe the storage backend.
    Status,
}

#[derive(Debug, Parser)]
#[command(name = "shortlink")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(
        long,
        env = DELETE_FLUSH_INTERVAL_ENV,
        default_value_t = DEFAULT_DELETE_FLUSH_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub delete_flush_interval_secs: u64,

    /// Prefix printed in front of short codes.
    #[arg(long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl CLI {
    pub fn storage_config(&self) -> anyhow::Result<StorageConfig> {
        let config = match self.storage {
            StorageBackendArg::InMemory => StorageConfig::InMemory,
            StorageBackendArg::File => StorageConfig::File {
                path: self
                    .file_storage_path
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("file storage path is required"))?,
            },
            StorageBackendArg::Mysql => StorageConfig::MySql {
                dsn: self
                    .mysql_dsn
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("mysql dsn is required"))?,
                settings: MySqlSettings::builder()
                    .flush_interval(Duration::from_secs(self.delete_flush_interval_secs))
                    .build(),
            },
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_in_memory() {
        let cli = CLI::try_parse_from(["shortlink", "status"]).unwrap();
        assert_eq!(cli.storage, StorageBackendArg::InMemory);
        assert!(matches!(cli.storage_config().unwrap(), StorageConfig::InMemory));
    }

    #[test]
    fn file_backend_requires_path() {
        assert!(CLI::try_parse_from(["shortlink", "--storage", "file", "status"]).is_err());

        let cli = CLI::try_parse_from([
            "shortlink",
            "--storage",
            "file",
            "--file-storage-path",
            "/tmp/urls.log",
            "status",
        ])
        .unwrap();
        assert!(matches!(cli.storage_config().unwrap(), StorageConfig::File { .. }));
    }

    #[test]
    fn mysql_settings_take_flush_interval() {
        let cli = CLI::try_parse_from([
            "shortlink",
            "--storage",
            "mysql",
            "--mysql-dsn",
            "mysql://localhost/shortlink",
            "--delete-flush-interval-secs",
            "2",
            "delete",
            "--owner",
            "u1",
            "abc",
        ])
        .unwrap();

        match cli.storage_config().unwrap() {
            StorageConfig::MySql { settings, .. } => {
                assert_eq!(settings.flush_interval, Duration::from_secs(2));
                assert_eq!(settings.queue_capacity, 64);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let err = CLI::try_parse_from([
            "shortlink",
            "--delete-flush-interval-secs",
            "0",
            "status",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn shorten_needs_at_least_one_url() {
        assert!(CLI::try_parse_from(["shortlink", "shorten", "--owner", "u1"]).is_err());
    }
}
