mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::Context;
use clap::Parser;
use shortlink_core::{OwnerId, Repository, ShortCode, UrlRecord};
use shortlink_storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    info!(storage_backend = %config.storage, "starting shortlink");

    let storage = Storage::open(&config.storage_config()?)
        .await
        .context("failed to open storage")?;

    let result = run(storage.repository().as_ref(), &config).await;

    // queued deletions are flushed before exit
    storage.shutdown().await;
    result
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn run(repository: &dyn Repository, config: &CLI) -> anyhow::Result<()> {
    let display = |code: &ShortCode| match &config.base_url {
        Some(base_url) => code.to_url(base_url),
        None => code.to_string(),
    };

    match &config.command {
        Command::Shorten { owner, urls } => {
            let owner = OwnerId::new(owner.as_str())?;
            if let [url] = urls.as_slice() {
                let saved = repository.save_url(&owner, url).await?;
                let marker = if saved.already_existed { " (existing)" } else { "" };
                println!("{}\t{}{}", display(&saved.short_url), url, marker);
            } else {
                let codes = repository.save_urls(&owner, urls).await?;
                for (code, url) in codes.iter().zip(urls) {
                    println!("{}\t{}", display(code), url);
                }
            }
        }
        Command::Get { code } => {
            let code = ShortCode::new(code.as_str())?;
            let record = repository.retrieve_by_short_url(&code).await?;
            print_record(&record, &display(&record.short_url));
        }
        Command::List { owner } => {
            let owner = OwnerId::new(owner.as_str())?;
            for record in repository.retrieve_owner_urls(&owner).await? {
                print_record(&record, &display(&record.short_url));
            }
        }
        Command::Delete { owner, codes } => {
            let owner = OwnerId::new(owner.as_str())?;
            let codes = codes
                .iter()
                .map(|code| ShortCode::new(code.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            repository.delete_by_short_urls(&owner, &codes).await?;
            println!("accepted {} deletion(s)", codes.len());
        }
        Command::Status => {
            repository.check_status().await?;
            println!("ok");
        }
    }

    Ok(())
}

fn print_record(record: &UrlRecord, short: &str) {
    let state = if record.is_deleted { "deleted" } else { "active" };
    println!(
        "{}\t{}\t{}\t{}",
        short, record.original_url, record.owner_id, state
    );
}
