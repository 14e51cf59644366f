use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skein::config::Config;
use skein::feed::{cancel_pair, Comment, HttpClient, Manager, ManagerError, Registry};
use skein::providers::register_defaults;
use skein::storage::{Database, DatabaseError};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Get the config directory path (~/.config/skein/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("skein"))
}

#[derive(Parser, Debug)]
#[command(
    name = "skein",
    version,
    about = "Aggregate Reddit, Hacker News, Lobsters and RSS into one cached feed"
)]
struct Args {
    /// Config file (default: ~/.config/skein/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a source, e.g. `reddit rust:hot` or `rss https://example.com/feed.xml`
    Subscribe { kind: String, identifier: String },
    /// Remove a subscription and its cached posts
    Unsubscribe { id: i64 },
    /// List subscribed sources
    Sources,
    /// Fetch posts from every source (cached sources are not refetched)
    Fetch {
        /// Maximum posts to print
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show the comment tree of a cached post
    Comments { source_id: i64, post_id: String },
    /// Delete every cached post and comment
    Clear,
    /// Delete cache entries older than the given number of days
    Purge {
        #[arg(long, default_value_t = 7)]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access: the database holds the subscription list
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of skein appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let http = HttpClient::new(&config.user_agent, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let registry = Arc::new(Registry::new());
    register_defaults(&registry, &http, &config);

    let manager = Manager::new(db.clone(), registry).with_settings(config.manager_settings());

    match args.command {
        Command::Subscribe { kind, identifier } => {
            match manager.subscribe(&kind, &identifier).await {
                Ok(source) => println!(
                    "Subscribed to {} [{}] (id {})",
                    source.display_name, source.identifier, source.id
                ),
                Err(ManagerError::AlreadySubscribed) => {
                    eprintln!("Already subscribed to {kind} {identifier}");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Unsubscribe { id } => match manager.unsubscribe(id).await {
            Ok(()) => println!("Unsubscribed from source {id}"),
            Err(ManagerError::NotFound(_)) => {
                eprintln!("No source with id {id}");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Command::Sources => {
            let sources = manager.list_sources().await?;
            if sources.is_empty() {
                println!("No subscriptions yet. Try: skein subscribe hackernews top");
            }
            for source in sources {
                let fetched = source
                    .last_fetched_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>4}  {:<10} {:<40} fetched {}",
                    source.id, source.kind, source.display_name, fetched
                );
            }
        }
        Command::Fetch { limit } => {
            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, cancelling in-flight fetches");
                    handle.cancel();
                }
            });

            let mut posts = manager.fetch_all_with_cancel(token).await?;
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for post in posts.iter().take(limit) {
                println!(
                    "[{}] {}  ({} points, {} comments)\n      {}  src={} id={}",
                    post.source_name,
                    post.title,
                    post.score,
                    post.num_comments,
                    post.url,
                    post.source_id,
                    post.id
                );
            }
            println!("{} posts", posts.len());
        }
        Command::Comments { source_id, post_id } => {
            let source = db
                .get_source(source_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No source with id {source_id}"))?;
            let (_, post) = db
                .find_post(&source.kind, &post_id, source_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Post {post_id} is not cached; run `skein fetch` first"))?;

            let comments = manager.fetch_comments(&post).await?;
            println!("{}\n", post.title);
            print_comments(&comments);
        }
        Command::Clear => {
            let cleared = manager.clear_cache().await?;
            println!(
                "Cleared {} posts and {} comments",
                cleared.posts, cleared.comments
            );
        }
        Command::Purge { days } => {
            let purged = manager
                .purge_older_than(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
                .await?;
            println!(
                "Purged {} posts and {} comments older than {} days",
                purged.posts, purged.comments, days
            );
        }
    }

    Ok(())
}

fn print_comments(comments: &[Comment]) {
    for comment in comments {
        let indent = "  ".repeat(comment.depth() as usize);
        println!("{indent}{} ({} points)", comment.author, comment.score);
        for line in comment.body.lines() {
            println!("{indent}  {line}");
        }
        print_comments(comment.replies());
    }
}
