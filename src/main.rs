use chrono::{TimeZone, Utc};

mod config;
mod db;
mod error;
mod feed;
mod models;
mod source;
mod sync;

use config::Config;
use db::Repository;
use error::Result;
use feed::default_rules;
use source::ZhihuSource;
use sync::FetchScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::load()?;
    let repo = Repository::new(&config.db_path).await?;

    match args.get(1).map(String::as_str) {
        Some("--sync") => sync_followees(&config, &repo, args.get(2).map(String::as_str)).await,
        Some("--fetch") => fetch_batch(&config, &repo).await,
        Some("--feed") => {
            let limit = match args.get(2) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| error::AppError::Config(format!("Invalid feed limit: {raw}")))?,
                None => config.feed_limit,
            };
            show_feed(&repo, limit).await
        }
        Some("--status") => show_status(&repo).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Usage: follow-feed <command>");
    println!();
    println!("Commands:");
    println!("  --sync [handle]   Refresh the tracked-user set from the followee list");
    println!("  --fetch           Run one batch fetch cycle over due users");
    println!("  --feed [n]        Print the ranked feed (default limit from config)");
    println!("  --status          Show counts and the batch cursor position");
}

async fn sync_followees(config: &Config, repo: &Repository, handle: Option<&str>) -> Result<()> {
    let source = ZhihuSource::new(config.cookies()?.to_string());

    // Resolve the root handle: argument, then config, then the session owner.
    let root_handle = match handle.map(str::to_string).or_else(|| config.root_handle.clone()) {
        Some(handle) => handle,
        None => {
            let me = source.me().await?;
            println!("Resolved session owner: {} ({})", me.name, me.handle);
            me.handle
        }
    };

    let scheduler = FetchScheduler::new(source, repo.clone(), config.batch_size);
    let outcome = scheduler.sync_followees(&root_handle).await?;
    println!("Synced {} followed users", outcome.synced);

    // First run: install the stock rule set so the feed starts curated.
    if repo.enabled_filter_rules().await?.is_empty() {
        for rule in default_rules() {
            repo.add_filter_rule(rule).await?;
        }
        println!("Installed default filter rules");
    }

    Ok(())
}

async fn fetch_batch(config: &Config, repo: &Repository) -> Result<()> {
    let source = ZhihuSource::new(config.cookies()?.to_string());
    let scheduler = FetchScheduler::new(source, repo.clone(), config.batch_size);

    let outcome = scheduler.fetch_batch().await?;
    if outcome.total_batches == 0 {
        println!("No tracked users. Run --sync first.");
        return Ok(());
    }

    println!(
        "Batch {}/{}: {} users processed, {} content items",
        outcome.batch_index + 1,
        outcome.total_batches,
        outcome.processed,
        outcome.new_content
    );
    Ok(())
}

async fn show_feed(repo: &Repository, limit: u32) -> Result<()> {
    let items = repo.ranked_feed(limit, false).await?;
    if items.is_empty() {
        println!("Feed is empty. Run --sync and --fetch first.");
        return Ok(());
    }

    for (rank, (item, content)) in items.iter().enumerate() {
        println!(
            "{:>3}. [{:>8.2}] {} ({}, {} words, by {})",
            rank + 1,
            item.score,
            content.title,
            content.kind.as_str(),
            content.word_count,
            content.author_name
        );
        println!("     {}", content.url);
    }
    Ok(())
}

async fn show_status(repo: &Repository) -> Result<()> {
    let users = repo.user_count().await?;
    let contents = repo.content_count().await?;
    let feed = repo.feed_count().await?;
    let state = repo.read_fetch_state().await?;

    println!("Tracked users:  {users}");
    println!("Content items:  {contents}");
    println!("Feed items:     {feed}");
    println!(
        "Batch cursor:   {}/{}",
        state.current_batch,
        state.total_batches
    );
    println!("Users synced:   {}", state.users_synced);
    if state.last_full_sync > 0 {
        let when = Utc
            .timestamp_opt(state.last_full_sync, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| state.last_full_sync.to_string());
        println!("Last full pass: {when}");
    } else {
        println!("Last full pass: never");
    }
    Ok(())
}
