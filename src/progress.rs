// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted during a reconciliation cycle for progress reporting
///
/// Events from different feeds interleave arbitrarily; `feed_url`
/// identifies which task an event belongs to.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A cycle is starting over this many stored feeds
    CycleStarting { feed_count: usize },

    /// A feed is being re-fetched
    CheckingFeed { feed_url: String },

    /// The feed published something new; the stored record was replaced
    EpisodeChanged {
        feed_url: String,
        channel_title: String,
        episode_title: String,
        publish_date: String,
    },

    /// An audio download is starting
    DownloadStarting {
        feed_url: String,
        channel_title: String,
        episode_title: String,
        destination: PathBuf,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        feed_url: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        feed_url: String,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed
    DownloadFailed {
        feed_url: String,
        episode_title: String,
        error: String,
    },

    /// The episode file is already on disk, nothing to do
    FeedUpToDate {
        feed_url: String,
        channel_title: String,
    },

    /// The feed's task ended with an error
    FeedFailed { feed_url: String, error: String },

    /// Every feed task has finished
    CycleCompleted {
        downloaded_count: usize,
        up_to_date_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
