mod page;

use clap::{Parser, Subcommand};
use offline_cache::{Broadcast, Command, PageMessage};
use page::PageChannel;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline cache client: acts as a page, pinning articles and inspecting
/// the proxy's offline store.
#[derive(Parser)]
#[command(name = "offline-client")]
struct Args {
    /// Proxy base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    proxy_url: String,

    /// Admin listener base URL
    #[arg(long, default_value = "http://127.0.0.1:9090")]
    admin_url: String,

    /// Seconds to wait for the proxy to answer a command
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Pin an article for offline reading
    Cache { url: String },
    /// Unpin an article
    Uncache { url: String },
    /// List pinned articles
    List,
    /// Delete the whole current store
    Clear,
    /// Activate a waiting version now
    SkipWaiting,
    /// Print every broadcast until interrupted
    Watch,
    /// Fetch a path through the proxy and report how it was served
    Get {
        path: String,
        /// Send as a page navigation
        #[arg(long)]
        navigate: bool,
    },
    /// Print the admin stats
    Stats,
}

impl Action {
    fn command(&self) -> Option<Command> {
        match self {
            Action::Cache { url } => Some(Command::CacheArticle { url: url.clone() }),
            Action::Uncache { url } => Some(Command::UncacheArticle { url: url.clone() }),
            Action::List => Some(Command::GetCachedArticles),
            Action::Clear => Some(Command::ClearCache),
            Action::SkipWaiting => Some(Command::SkipWaiting),
            Action::Watch | Action::Get { .. } | Action::Stats => None,
        }
    }
}

fn ws_url(proxy_url: &str) -> String {
    let base = proxy_url.trim_end_matches('/');
    let base = base
        .strip_prefix("https://")
        .map(|rest| format!("wss://{rest}"))
        .or_else(|| base.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
        .unwrap_or_else(|| base.to_string());
    format!("{base}/sw/messages")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the proxy reported success.
async fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    match &args.action {
        Action::Get { path, navigate } => return get(args, path, *navigate).await,
        Action::Stats => return stats(args).await,
        _ => {}
    }

    let mut channel = PageChannel::connect(&ws_url(&args.proxy_url)).await?;

    let Some(command) = args.action.command() else {
        watch(&mut channel).await;
        return Ok(true);
    };

    channel.send(&command).await?;
    tracing::info!(command = command.kind(), "sent");
    if command == Command::SkipWaiting {
        // No answer is defined for SKIP_WAITING.
        return Ok(true);
    }

    let timeout = Duration::from_secs(args.timeout_secs);
    let outcome = tokio::time::timeout(timeout, channel.outcome(&command))
        .await
        .map_err(|_| format!("no answer within {}s", args.timeout_secs))?
        .ok_or("proxy closed the message channel")?;

    Ok(print_outcome(&outcome))
}

fn print_outcome(message: &PageMessage) -> bool {
    match message {
        PageMessage::Articles(list) => {
            if list.articles.is_empty() {
                println!("no pinned articles");
            }
            for article in &list.articles {
                println!("{article}");
            }
            true
        }
        PageMessage::Broadcast(Broadcast::ArticleCached { url }) => {
            println!("cached {url}");
            true
        }
        PageMessage::Broadcast(Broadcast::ArticleUncached { url }) => {
            println!("uncached {url}");
            true
        }
        PageMessage::Broadcast(Broadcast::CacheCleared) => {
            println!("cache cleared");
            true
        }
        PageMessage::Broadcast(Broadcast::CacheError { url, error }) => {
            eprintln!("failed to cache {url}: {error}");
            false
        }
    }
}

async fn watch(channel: &mut PageChannel) {
    while let Some(message) = channel.next().await {
        match serde_json::to_string(&message) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "unprintable message"),
        }
    }
    tracing::info!("message channel closed");
}

async fn get(args: &Args, path: &str, navigate: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let url = format!("{}{}", args.proxy_url.trim_end_matches('/'), path);

    let mut request = client.get(&url);
    if navigate {
        request = request
            .header("sec-fetch-mode", "navigate")
            .header("accept", "text/html");
    }
    let response = request.send().await?;

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    println!(
        "{} {} x-cache={} store={}",
        response.status().as_u16(),
        path,
        header("x-cache"),
        header("x-cache-store"),
    );
    Ok(response.status().is_success())
}

async fn stats(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let url = format!("{}/api/stats", args.admin_url.trim_end_matches('/'));
    let stats: serde_json::Value = reqwest::get(&url).await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(true)
}
