use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};

use mediagrab::api::{EnqueueRequest, EnqueueResponse, FileSizeRequest};
use mediagrab::commands::{self, AppState};
use mediagrab::config::AppConfig;
use mediagrab::downloader::manager::WatchUpdate;
use mediagrab::media::MediaDetector;
use mediagrab::relay::ProgressEvent;

#[derive(Parser)]
#[command(name = "mediagrab", version, about = "Media download queue host with remote video extraction")]
struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extraction server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON messages from stdin, one per line, and answer on stdout
    Serve,
    /// Queue URLs and wait for them to finish
    Download {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        filename: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Check whether the extraction server is reachable
    Status,
    /// Look up the size of a remote resource
    Size {
        url: String,
        #[arg(long)]
        youtube: bool,
    },
    /// Classify URLs the way page traffic is classified
    Detect {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> AppConfig {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut config = match loaded {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }
    };

    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Command::Detect { urls } = &cli.command {
        detect(urls);
        return Ok(());
    }

    let config = load_config(&cli);
    let state = AppState::start(config).await.context("failed to start")?;

    match cli.command {
        Command::Serve => serve(&state).await,
        Command::Download { urls, filename, user_id } => download(&state, urls, filename, user_id).await,
        Command::Status => {
            let online = state.health.check_now().await;
            println!("{}", if online { "online" } else { "offline" });
            Ok(())
        }
        Command::Size { url, youtube } => {
            state.health.check_now().await;
            let size = commands::get_file_size(&state, FileSizeRequest { url, is_youtube: youtube }).await;
            match size {
                Some(size) => println!("{}", size),
                None => println!("unknown"),
            }
            Ok(())
        }
        Command::Detect { .. } => Ok(()),
    }
}

fn detect(urls: &[String]) {
    let detector = MediaDetector::new();
    for url in urls {
        if detector.is_media_url(url) {
            println!("{}\t{}", detector.kind_of(url), detector.canonical_url(url));
        } else {
            println!("not media\t{}", url);
        }
    }
}

async fn write_line(stdout: &Mutex<tokio::io::Stdout>, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut stdout = stdout.lock().await;
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}

async fn serve(state: &AppState) -> anyhow::Result<()> {
    info!("Serving messages on stdio");
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

    let mut relay = state.relay.subscribe();
    let relay_out = Arc::clone(&stdout);
    let forwarder = tokio::spawn(async move {
        loop {
            match relay.recv().await {
                Ok(message) => {
                    if let Err(e) = write_line(&relay_out, &message).await {
                        log::error!("Failed to write relay message: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Relay output lagged, dropped {} messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = commands::handle_line(state, line).await;
        write_line(&stdout, &reply).await?;
    }

    info!("stdin closed, shutting down");
    forwarder.abort();
    Ok(())
}

async fn download(
    state: &AppState,
    urls: Vec<String>,
    filename: Option<String>,
    user_id: Option<String>,
) -> anyhow::Result<()> {
    // the flag starts offline until the first poll lands
    state.health.check_now().await;

    let mut watch = state.downloads.watch();
    let progress = MultiProgress::new();
    let style = ProgressStyle::with_template("{spinner} {msg:40!} [{bar:30}] {bytes}/{total_bytes}")?
        .progress_chars("=> ");

    let mut bars: HashMap<String, ProgressBar> = HashMap::new();
    let mut failed = 0usize;

    for url in urls {
        let request = EnqueueRequest {
            url: url.clone(),
            filename: filename.clone(),
            user_id: user_id.clone(),
            is_youtube: None,
        };
        match commands::download(state, request).await {
            EnqueueResponse::Accepted { download_id } => {
                let bar = progress.add(ProgressBar::new(0));
                bar.set_style(style.clone());
                bar.set_message(url);
                watch.track(download_id.clone());
                bars.insert(download_id, bar);
            }
            EnqueueResponse::Rejected { error } => {
                eprintln!("{}: {}", url, error);
                failed += 1;
            }
        }
    }

    while let Some(update) = watch.next().await {
        let update = match update {
            WatchUpdate::Progress(update) => update,
            WatchUpdate::Lost(id) => {
                if let Some(bar) = bars.remove(&id) {
                    bar.abandon_with_message("finished while output lagged, outcome unknown");
                }
                failed += 1;
                continue;
            }
        };
        let Some(bar) = bars.get(&update.download_id) else {
            continue;
        };

        match update.progress {
            ProgressEvent::Queued { .. } => {}
            ProgressEvent::Started { filename, .. } => {
                if let Some(filename) = filename {
                    bar.set_message(filename);
                }
            }
            ProgressEvent::Progress { received, total, .. } => {
                bar.set_length(total);
                bar.set_position(received);
            }
            ProgressEvent::Complete { filename, .. } => {
                bar.finish_with_message(format!("done {}", filename.unwrap_or_default()));
                bars.remove(&update.download_id);
            }
            ProgressEvent::Error { error, .. } => {
                bar.abandon_with_message(error);
                bars.remove(&update.download_id);
                failed += 1;
            }
        }
    }

    // relay closed before these settled
    for (_, bar) in bars.drain() {
        bar.abandon_with_message("relay closed");
        failed += 1;
    }

    if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    Ok(())
}
