// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod progress;
pub mod store;
pub mod subscription;
pub mod sync;

// Re-export main types for convenience
pub use config::{Config, DATA_DIR_ENV};
pub use episode::{DownloadOutcome, download_episode, episode_path, episode_stem};
pub use error::{DownloadError, FeedError, HttpError, PathError, StoreError, SyncError};
pub use feed::{FeedRecord, fetch_feed, parse_latest};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{FeedStore, SqliteStore};
pub use subscription::{format_record, list_feeds, subscribe, unsubscribe};
pub use sync::{EpisodeAction, FeedOutcome, FeedResult, SyncReport, update_episodes};
