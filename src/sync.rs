// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::episode::{download_episode, episode_path};
use crate::error::{StoreError, SyncError};
use crate::feed::{FeedRecord, fetch_feed};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{FeedStore, run_blocking};

/// What a feed's task did with the episode file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeAction {
    /// The file was missing and has been downloaded
    Downloaded { path: PathBuf, bytes: u64 },
    /// The file was already on disk
    AlreadyPresent { path: PathBuf },
}

/// Successful reconciliation of one feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    pub feed_url: String,
    /// Whether the publish date differed and the stored record was replaced
    pub changed: bool,
    pub action: EpisodeAction,
}

/// Result of one feed's task within a cycle
#[derive(Debug)]
pub struct FeedResult {
    pub feed_url: String,
    pub result: Result<FeedOutcome, SyncError>,
}

/// Per-feed results of a reconciliation cycle, in store order
#[derive(Debug, Default)]
pub struct SyncReport {
    pub feeds: Vec<FeedResult>,
}

impl SyncReport {
    /// Number of feeds whose episode was downloaded this cycle
    pub fn downloaded(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o.action, EpisodeAction::Downloaded { .. }))
            .count()
    }

    /// Number of feeds whose episode file was already present
    pub fn up_to_date(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o.action, EpisodeAction::AlreadyPresent { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Feeds whose task ended in an error, with that error
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.feeds.iter().filter_map(|f| match &f.result {
            Ok(_) => None,
            Err(e) => Some((f.feed_url.as_str(), e)),
        })
    }

    fn outcomes(&self) -> impl Iterator<Item = &FeedOutcome> {
        self.feeds.iter().filter_map(|f| f.result.as_ref().ok())
    }
}

/// Run one reconciliation cycle over every stored feed
///
/// Each feed is checked in its own task; all tasks are joined before this
/// returns. A failing feed never affects the others: its error is reported
/// and recorded in the [`SyncReport`]. Only failing to read the list of
/// feeds aborts the cycle.
pub async fn update_episodes<C, S>(
    client: &C,
    store: Arc<S>,
    episodes_dir: &Path,
    reporter: SharedProgressReporter,
) -> Result<SyncReport, StoreError>
where
    C: HttpClient + Clone + 'static,
    S: FeedStore + ?Sized + 'static,
{
    let feeds = run_blocking(&store, |s| s.list()).await?;

    reporter.report(ProgressEvent::CycleStarting {
        feed_count: feeds.len(),
    });
    tracing::debug!(feeds = feeds.len(), "starting reconciliation cycle");

    let mut handles = Vec::with_capacity(feeds.len());

    for stored in feeds {
        let feed_url = stored.feed_url.clone();
        let client = client.clone();
        let store = store.clone();
        let episodes_dir = episodes_dir.to_path_buf();
        let reporter = reporter.clone();

        let handle = tokio::spawn(async move {
            let feed_url = stored.feed_url.clone();
            let result = check_feed(&client, &store, &episodes_dir, stored, &reporter).await;

            if let Err(e) = &result {
                report_failure(&reporter, &feed_url, e);
            }
            result
        });

        handles.push((feed_url, handle));
    }

    let mut report = SyncReport::default();

    for (feed_url, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let e = SyncError::TaskFailed {
                    feed_url: feed_url.clone(),
                    reason: join_error.to_string(),
                };
                report_failure(&reporter, &feed_url, &e);
                Err(e)
            }
        };
        report.feeds.push(FeedResult { feed_url, result });
    }

    reporter.report(ProgressEvent::CycleCompleted {
        downloaded_count: report.downloaded(),
        up_to_date_count: report.up_to_date(),
        failed_count: report.failed(),
    });

    Ok(report)
}

fn report_failure(reporter: &SharedProgressReporter, feed_url: &str, error: &SyncError) {
    tracing::error!(feed_url, error = %error, "feed update failed");
    reporter.report(ProgressEvent::FeedFailed {
        feed_url: feed_url.to_string(),
        error: error.to_string(),
    });
}

/// Reconcile a single stored feed against its live version
///
/// Steps run strictly in order: fetch, compare publish dates, on change
/// persist the new record and delete the file named after the old title,
/// then download into the current title's path if nothing is there.
async fn check_feed<C, S>(
    client: &C,
    store: &Arc<S>,
    episodes_dir: &Path,
    stored: FeedRecord,
    reporter: &SharedProgressReporter,
) -> Result<FeedOutcome, SyncError>
where
    C: HttpClient + ?Sized,
    S: FeedStore + ?Sized + 'static,
{
    reporter.report(ProgressEvent::CheckingFeed {
        feed_url: stored.feed_url.clone(),
    });

    let latest = fetch_feed(client, &stored.feed_url).await?;

    // Exact text comparison: a reformatted date counts as a new episode
    let changed = latest.publish_date != stored.publish_date;

    let current = if changed {
        let to_store = latest.clone();
        run_blocking(store, move |s| s.put(&to_store)).await?;

        tracing::info!(
            feed_url = %latest.feed_url,
            episode = %latest.latest_item_title,
            previous_date = %stored.publish_date,
            publish_date = %latest.publish_date,
            "new episode published"
        );
        reporter.report(ProgressEvent::EpisodeChanged {
            feed_url: latest.feed_url.clone(),
            channel_title: latest.channel_title.clone(),
            episode_title: latest.latest_item_title.clone(),
            publish_date: latest.publish_date.clone(),
        });

        let stale = episode_path(episodes_dir, &stored.channel_title).await?;
        remove_stale_episode(&stale).await?;
        latest
    } else {
        stored
    };

    let path = episode_path(episodes_dir, &current.channel_title).await?;

    let present = tokio::fs::try_exists(&path)
        .await
        .map_err(|e| SyncError::InspectFailed {
            path: path.clone(),
            source: e,
        })?;

    if present {
        tracing::debug!(path = %path.display(), "episode already on disk");
        reporter.report(ProgressEvent::FeedUpToDate {
            feed_url: current.feed_url.clone(),
            channel_title: current.channel_title.clone(),
        });
        return Ok(FeedOutcome {
            feed_url: current.feed_url,
            changed,
            action: EpisodeAction::AlreadyPresent { path },
        });
    }

    // A failed download leaves the updated record in place; the file stays
    // absent so the next cycle retries.
    let outcome = match download_episode(client, &current, episodes_dir, reporter).await {
        Ok(outcome) => outcome,
        Err(e) => {
            reporter.report(ProgressEvent::DownloadFailed {
                feed_url: current.feed_url.clone(),
                episode_title: current.latest_item_title.clone(),
                error: e.to_string(),
            });
            return Err(e.into());
        }
    };

    Ok(FeedOutcome {
        feed_url: current.feed_url,
        changed,
        action: EpisodeAction::Downloaded {
            path: outcome.path,
            bytes: outcome.bytes,
        },
    })
}

/// Delete the previously downloaded episode; a missing file is fine
async fn remove_stale_episode(path: &Path) -> Result<(), SyncError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale episode");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::{DownloadError, FeedError, HttpError};
    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::{NoopReporter, ProgressReporter};
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockState {
        feeds: Mutex<HashMap<String, String>>,
        audio: Mutex<HashMap<String, (u16, Vec<u8>)>>,
        audio_requests: Mutex<Vec<String>>,
        cut_off: Mutex<HashSet<String>>,
    }

    /// Serves feeds and audio from memory; unknown feeds fail with HTTP 500
    #[derive(Clone, Default)]
    struct MockHttpClient {
        state: Arc<MockState>,
    }

    impl MockHttpClient {
        fn serve_feed(&self, url: &str, xml: String) {
            self.state.feeds.lock().unwrap().insert(url.to_string(), xml);
        }

        fn serve_audio(&self, url: &str, status: u16, data: &[u8]) {
            self.state
                .audio
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, data.to_vec()));
        }

        /// Deliver the audio body, then fail the transfer before it ends
        fn cut_off_audio(&self, url: &str, data: &[u8]) {
            self.serve_audio(url, 200, data);
            self.state.cut_off.lock().unwrap().insert(url.to_string());
        }

        fn audio_requests(&self) -> Vec<String> {
            self.state.audio_requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, HttpError> {
            self.state
                .feeds
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .map(Bytes::from)
                .ok_or(HttpError::Status { status: 500 })
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, HttpError> {
            self.state
                .audio_requests
                .lock()
                .unwrap()
                .push(url.to_string());

            let (status, data) = self
                .state
                .audio
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or((404, Vec::new()));
            let len = data.len() as u64;

            let mut chunks = vec![Ok(Bytes::from(data))];
            if self.state.cut_off.lock().unwrap().contains(url) {
                let dropped = reqwest::Client::new()
                    .get("http://")
                    .build()
                    .unwrap_err();
                chunks.push(Err(dropped));
            }
            let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(HttpResponse {
                status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    /// Panics while fetching one feed and defers to the wrapped client otherwise
    #[derive(Clone)]
    struct PanicsOnFeed {
        inner: MockHttpClient,
        feed_url: &'static str,
    }

    #[async_trait]
    impl HttpClient for PanicsOnFeed {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, HttpError> {
            if url == self.feed_url {
                panic!("feed parser crashed");
            }
            self.inner.get_bytes(url).await
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, HttpError> {
            self.inner.get_stream(url).await
        }
    }

    /// Wraps the real store and counts writes
    struct CountingStore {
        inner: SqliteStore,
        puts: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                puts: AtomicUsize::new(0),
            })
        }

        fn seed(&self, record: &FeedRecord) {
            self.inner.put(record).unwrap();
        }

        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    impl FeedStore for CountingStore {
        fn get(&self, feed_url: &str) -> Result<Option<FeedRecord>, StoreError> {
            self.inner.get(feed_url)
        }

        fn put(&self, record: &FeedRecord) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(record)
        }

        fn delete(&self, feed_url: &str) -> Result<(), StoreError> {
            self.inner.delete(feed_url)
        }

        fn list(&self) -> Result<Vec<FeedRecord>, StoreError> {
            self.inner.list()
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    const FEED_A: &str = "http://a.example/rss";
    const FEED_B: &str = "http://b.example/rss";

    fn feed_xml(channel: &str, episode: &str, date: &str, audio_url: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>{channel}</title>
    <description>Test feed</description>
    <item>
      <title>{episode}</title>
      <pubDate>{date}</pubDate>
      <enclosure url="{audio_url}" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#
        )
    }

    fn record(
        feed_url: &str,
        channel: &str,
        episode: &str,
        date: &str,
        audio_url: &str,
    ) -> FeedRecord {
        FeedRecord {
            channel_title: channel.to_string(),
            latest_item_title: episode.to_string(),
            feed_url: feed_url.to_string(),
            publish_date: date.to_string(),
            audio_url: audio_url.to_string(),
        }
    }

    fn show_a(date: &str, audio_url: &str) -> FeedRecord {
        record(FEED_A, "Show A", "Pilot", date, audio_url)
    }

    #[tokio::test]
    async fn unchanged_feed_with_missing_file_downloads_without_store_write() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Pilot", "2024-01-01", "https://a.example/pilot.mp3"),
        );
        client.serve_audio("https://a.example/pilot.mp3", 200, b"pilot audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(store.puts(), 0);
        assert_eq!(client.audio_requests(), vec!["https://a.example/pilot.mp3"]);

        let path = episode_path(&episodes, "Show A").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"pilot audio");

        let outcome = report.feeds[0].result.as_ref().unwrap();
        assert!(!outcome.changed);
        assert_eq!(
            outcome.action,
            EpisodeAction::Downloaded {
                path,
                bytes: 11
            }
        );
    }

    #[tokio::test]
    async fn changed_feed_replaces_record_and_old_file() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let old_path = episode_path(&episodes, "Show A").await.unwrap();
        std::fs::write(&old_path, b"pilot audio").unwrap();

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A Renamed", "Second", "2024-02-01", "https://a.example/second.mp3"),
        );
        client.serve_audio("https://a.example/second.mp3", 200, b"second audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        let expected = record(
            FEED_A,
            "Show A Renamed",
            "Second",
            "2024-02-01",
            "https://a.example/second.mp3",
        );
        assert_eq!(store.get(FEED_A).unwrap(), Some(expected));
        assert_eq!(store.puts(), 1);

        assert!(!old_path.exists());
        let new_path = episode_path(&episodes, "Show A Renamed").await.unwrap();
        assert_eq!(std::fs::read(&new_path).unwrap(), b"second audio");

        assert_eq!(report.downloaded(), 1);
        assert!(report.feeds[0].result.as_ref().unwrap().changed);
    }

    #[tokio::test]
    async fn changed_feed_without_previous_file_still_downloads() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Second", "2024-02-01", "https://a.example/second.mp3"),
        );
        client.serve_audio("https://a.example/second.mp3", 200, b"second audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(client.audio_requests(), vec!["https://a.example/second.mp3"]);
        let path = episode_path(&episodes, "Show A").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second audio");
    }

    #[tokio::test]
    async fn reformatted_date_counts_as_change() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a(
            "Mon, 01 Jan 2024 00:00:00 +0000",
            "https://a.example/pilot.mp3",
        ));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml(
                "Show A",
                "Pilot",
                "Mon, 01 Jan 2024 00:00:00 GMT",
                "https://a.example/pilot.mp3",
            ),
        );
        client.serve_audio("https://a.example/pilot.mp3", 200, b"pilot audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert!(report.feeds[0].result.as_ref().unwrap().changed);
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn second_cycle_without_upstream_change_is_a_no_op() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Pilot", "2024-01-01", "https://a.example/pilot.mp3"),
        );
        client.serve_audio("https://a.example/pilot.mp3", 200, b"pilot audio");

        update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();
        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(store.puts(), 0);
        assert_eq!(client.audio_requests().len(), 1);
        assert_eq!(report.up_to_date(), 1);
        assert_eq!(report.downloaded(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_does_not_affect_other_feeds() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));
        store.seed(&record(
            FEED_B,
            "Show B",
            "Intro",
            "2024-01-01",
            "https://b.example/intro.mp3",
        ));

        // Feed A is not served, so fetching it fails
        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_B,
            feed_xml("Show B", "Next", "2024-03-01", "https://b.example/next.mp3"),
        );
        client.serve_audio("https://b.example/next.mp3", 200, b"next audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.downloaded(), 1);

        let (failed_url, error) = report.failures().next().unwrap();
        assert_eq!(failed_url, FEED_A);
        assert!(matches!(error, SyncError::Feed(FeedError::FetchFailed { .. })));

        assert_eq!(store.get(FEED_A).unwrap().unwrap().publish_date, "2024-01-01");
        assert_eq!(store.get(FEED_B).unwrap().unwrap().publish_date, "2024-03-01");
        let path_b = episode_path(&episodes, "Show B").await.unwrap();
        assert_eq!(std::fs::read(&path_b).unwrap(), b"next audio");
    }

    #[tokio::test]
    async fn download_failure_keeps_new_record_and_retries_next_cycle() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Second", "2024-02-01", "https://a.example/second.mp3"),
        );
        client.serve_audio("https://a.example/second.mp3", 503, b"");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert!(matches!(
            report.feeds[0].result,
            Err(SyncError::Download(DownloadError::HttpStatus { status: 503, .. }))
        ));
        assert_eq!(store.get(FEED_A).unwrap().unwrap().publish_date, "2024-02-01");
        let path = episode_path(&episodes, "Show A").await.unwrap();
        assert!(!path.exists());

        client.serve_audio("https://a.example/second.mp3", 200, b"second audio");
        let retry = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(retry.downloaded(), 1);
        assert!(!retry.feeds[0].result.as_ref().unwrap().changed);
        assert_eq!(std::fs::read(&path).unwrap(), b"second audio");
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn interrupted_download_counts_as_present_next_cycle() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Pilot", "2024-01-01", "https://a.example/pilot.mp3"),
        );
        client.cut_off_audio("https://a.example/pilot.mp3", b"half");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert!(matches!(
            report.feeds[0].result,
            Err(SyncError::Download(DownloadError::StreamFailed { .. }))
        ));
        let path = episode_path(&episodes, "Show A").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"half");

        let next = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        let outcome = next.feeds[0].result.as_ref().unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.action, EpisodeAction::AlreadyPresent { path });
        assert_eq!(client.audio_requests().len(), 1);
    }

    #[tokio::test]
    async fn panicking_feed_task_is_contained() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));
        store.seed(&record(
            FEED_B,
            "Show B",
            "Intro",
            "2024-01-01",
            "https://b.example/intro.mp3",
        ));

        let inner = MockHttpClient::default();
        inner.serve_feed(
            FEED_B,
            feed_xml("Show B", "Next", "2024-03-01", "https://b.example/next.mp3"),
        );
        inner.serve_audio("https://b.example/next.mp3", 200, b"next audio");
        let client = PanicsOnFeed {
            inner,
            feed_url: FEED_A,
        };

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(report.feeds.len(), 2);
        assert!(matches!(
            &report.feeds[0].result,
            Err(SyncError::TaskFailed { feed_url, .. }) if feed_url == FEED_A
        ));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.downloaded(), 1);

        let path_b = episode_path(&episodes, "Show B").await.unwrap();
        assert_eq!(std::fs::read(&path_b).unwrap(), b"next audio");
        assert_eq!(store.get(FEED_A).unwrap().unwrap().publish_date, "2024-01-01");
    }

    #[tokio::test]
    async fn stale_file_removal_error_aborts_feed() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));

        // A directory at the old path cannot be removed as a file
        let old_path = episode_path(&episodes, "Show A").await.unwrap();
        std::fs::create_dir_all(old_path.join("inner")).unwrap();

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Other Show", "Second", "2024-02-01", "https://a.example/second.mp3"),
        );
        client.serve_audio("https://a.example/second.mp3", 200, b"second audio");

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert!(matches!(
            report.feeds[0].result,
            Err(SyncError::RemoveFailed { .. })
        ));
        assert!(client.audio_requests().is_empty());
        // The record was persisted before the removal was attempted
        assert_eq!(store.get(FEED_A).unwrap().unwrap().channel_title, "Other Show");
    }

    #[tokio::test]
    async fn every_absent_file_is_downloaded_once() {
        let dir = tempdir().unwrap();
        let episodes = dir.path().join("episodes");
        let store = CountingStore::new();
        let client = MockHttpClient::default();

        for i in 0..5 {
            let feed_url = format!("http://feed{i}.example/rss");
            let audio_url = format!("https://feed{i}.example/ep.mp3");
            let channel = format!("Show {i}");
            store.seed(&record(&feed_url, &channel, "Ep", "d1", &audio_url));
            client.serve_feed(&feed_url, feed_xml(&channel, "Ep", "d1", &audio_url));
            client.serve_audio(&audio_url, 200, channel.as_bytes());
        }

        let report = update_episodes(&client, store.clone(), &episodes, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(report.downloaded(), 5);
        let mut requests = client.audio_requests();
        requests.sort();
        requests.dedup();
        assert_eq!(requests.len(), 5);
        assert_eq!(client.audio_requests().len(), 5);

        for i in 0..5 {
            let channel = format!("Show {i}");
            let path = episode_path(&episodes, &channel).await.unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), channel.as_bytes());
        }
    }

    #[tokio::test]
    async fn cycle_succeeds_when_every_feed_fails() {
        let dir = tempdir().unwrap();
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));
        store.seed(&record(FEED_B, "Show B", "Intro", "2024-01-01", "https://b.example/intro.mp3"));

        let report = update_episodes(
            &MockHttpClient::default(),
            store.clone(),
            dir.path(),
            NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(report.failed(), 2);
        assert_eq!(report.feeds.len(), 2);
    }

    #[tokio::test]
    async fn empty_store_completes_immediately() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(RecordingReporter::default());
        let reporter: SharedProgressReporter = recorder.clone();

        let report = update_episodes(
            &MockHttpClient::default(),
            CountingStore::new(),
            dir.path(),
            reporter,
        )
        .await
        .unwrap();

        assert!(report.feeds.is_empty());
        let events = recorder.events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::CycleStarting { feed_count: 0 }));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::CycleCompleted {
                downloaded_count: 0,
                up_to_date_count: 0,
                failed_count: 0
            })
        ));
    }

    #[tokio::test]
    async fn failures_are_reported_to_the_sink() {
        let dir = tempdir().unwrap();
        let store = CountingStore::new();
        store.seed(&show_a("2024-01-01", "https://a.example/pilot.mp3"));
        let recorder = Arc::new(RecordingReporter::default());
        let reporter: SharedProgressReporter = recorder.clone();

        update_episodes(&MockHttpClient::default(), store, dir.path(), reporter)
            .await
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::FeedFailed { feed_url, .. } if feed_url == FEED_A
        )));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::CycleCompleted { failed_count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn works_with_a_trait_object_store() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn FeedStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .put(&show_a("2024-01-01", "https://a.example/pilot.mp3"))
            .unwrap();

        let client = MockHttpClient::default();
        client.serve_feed(
            FEED_A,
            feed_xml("Show A", "Pilot", "2024-01-01", "https://a.example/pilot.mp3"),
        );
        client.serve_audio("https://a.example/pilot.mp3", 200, b"pilot audio");

        let report = update_episodes(&client, store, dir.path(), NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(report.downloaded(), 1);
    }
}
