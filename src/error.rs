// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by an [`HttpClient`](crate::http::HttpClient)
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered with HTTP {status}")]
    Status { status: u16 },
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No items present in feed {url}")]
    EmptyFeed { url: String },

    #[error("Latest episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },
}

/// Errors that can occur while preparing the episodes directory
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot determine data directory: {0}")]
    DataDirUnavailable(#[source] std::io::Error),
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Errors raised by the feed metadata store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to serialize feed record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No feed stored under {key}")]
    NotFound { key: String },

    #[error("Store lock poisoned by a panicking task")]
    LockPoisoned,

    #[error("Store call did not complete: {0}")]
    Blocking(#[source] tokio::task::JoinError),
}

/// Failure of a single feed's reconciliation task
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Failed to remove stale episode {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inspect episode file {path}: {source}")]
    InspectFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Task for {feed_url} did not complete: {reason}")]
    TaskFailed { feed_url: String, reason: String },
}
