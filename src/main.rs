// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use rsscan::{
    Config, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter,
    SqliteStore, format_record, list_feeds, logging, subscribe, unsubscribe, update_episodes,
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static NEW: Emoji<'_, '_> = Emoji("🆕 ", "[*] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Track podcast feeds and keep the newest episode of each on disk
#[derive(Parser, Debug)]
#[command(name = "rsscan")]
#[command(about = "Track podcast feeds and keep the newest episode of each on disk")]
#[command(version)]
struct Args {
    /// Data directory (defaults to $RSSCAN_DATA_DIR, then the current directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print version and data directory before running
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add { url: String },
    /// Unsubscribe from a feed (downloaded audio is kept)
    Remove { url: String },
    /// List subscribed feeds
    List,
    /// Refresh every feed and download new episodes
    Update,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    fn with_multi(multi: MultiProgress) -> Self {
        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_or_create_bar(&self, feed_url: &str) -> ProgressBar {
        let mut bars = self.bars();

        if let Some(bar) = bars.get(feed_url) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(feed_url.to_string(), bar.clone());
        bar
    }

    fn finish_bar(&self, feed_url: &str) {
        if let Some(bar) = self.bars().remove(feed_url) {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CycleStarting { feed_count } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Checking {} feeds",
                    feed_count.to_string().cyan()
                ));
            }

            ProgressEvent::CheckingFeed { feed_url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", feed_url.cyan()));
            }

            ProgressEvent::EpisodeChanged {
                channel_title,
                episode_title,
                publish_date,
                ..
            } => {
                self.println(format!(
                    "{NEW}Updating {}\n    Episode: {}\n    Published: {}",
                    channel_title.bold().green(),
                    episode_title,
                    publish_date.dimmed()
                ));
            }

            ProgressEvent::DownloadStarting {
                feed_url,
                channel_title,
                episode_title,
                destination,
                content_length,
            } => {
                let bar = self.get_or_create_bar(&feed_url);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "{} • {}",
                    truncate_title(&channel_title, 30).cyan(),
                    truncate_title(&episode_title, 40)
                ));
                tracing::debug!(destination = %destination.display(), "download destination");
            }

            ProgressEvent::DownloadProgress {
                feed_url,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(&feed_url);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                feed_url,
                episode_title,
                ..
            } => {
                self.finish_bar(&feed_url);
                self.println(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode_title, 60).green()
                ));
            }

            // The error itself is printed once the feed's task reports FeedFailed
            ProgressEvent::DownloadFailed { feed_url, .. } => {
                self.finish_bar(&feed_url);
            }

            ProgressEvent::FeedUpToDate { channel_title, .. } => {
                tracing::debug!(channel = %channel_title, "up to date");
            }

            ProgressEvent::FeedFailed { feed_url, error } => {
                self.println(format!("{FAILURE}{} - {}", feed_url.yellow(), error.red()));
            }

            ProgressEvent::CycleCompleted {
                downloaded_count,
                up_to_date_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{} {} downloaded, {} up to date, {} failed",
                    "Update complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    up_to_date_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn print_info(config: &Config) {
    println!("=====================================");
    println!("  {RADIO}{} - podcast feed tracker", "rsscan".bold().magenta());
    println!("  Version:  {}", env!("CARGO_PKG_VERSION"));
    println!("  Data dir: {}", config.data_dir.display());
    println!("=====================================");
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let config = match args.data_dir {
        Some(dir) => Config::new(dir),
        None => Config::from_env().context("Failed to resolve data directory")?,
    };

    if args.verbose {
        print_info(&config);
    }

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    config
        .ensure_data_dir()
        .context("Failed to prepare data directory")?;
    let store = Arc::new(
        SqliteStore::open(&config.database_path()).context("Failed to open feed database")?,
    );
    let client = ReqwestClient::with_user_agent(USER_AGENT)
        .context("Failed to set up HTTP client")?;

    match command {
        Command::Add { url } => {
            let record = subscribe(&client, store.as_ref(), &url)
                .await
                .with_context(|| format!("Failed to subscribe to {url}"))?;
            if !args.quiet {
                println!("{SUCCESS}Subscribed to {}", record.channel_title.bold().green());
            }
        }

        Command::Remove { url } => {
            unsubscribe(store.as_ref(), &url)
                .with_context(|| format!("Failed to unsubscribe from {url}"))?;
            if !args.quiet {
                println!("{SUCCESS}Unsubscribed from {}", url.cyan());
            }
        }

        Command::List => {
            for record in list_feeds(store.as_ref()).context("Failed to list feeds")? {
                println!("{}", format_record(&record));
            }
        }

        Command::Update => {
            let reporter: SharedProgressReporter = if args.quiet {
                NoopReporter::shared()
            } else {
                Arc::new(IndicatifReporter::new())
            };

            let episodes_dir = config.episodes_dir();
            let report = update_episodes(&client, store, &episodes_dir, reporter)
                .await
                .context("Failed to update episodes")?;

            if !args.quiet && report.failed() > 0 {
                println!("\n{}", "Failed feeds:".red().bold());
                for (feed_url, error) in report.failures() {
                    println!(
                        "  {}{} - {}",
                        CROSS,
                        feed_url.yellow(),
                        error.to_string().dimmed()
                    );
                }
            }

            if !args.quiet {
                println!(
                    "\n{FOLDER}Episodes: {}\n",
                    episodes_dir.display().to_string().cyan()
                );
            }
        }
    }

    Ok(())
}
