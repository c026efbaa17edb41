// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::FeedRecord;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::episode_path;

/// Where an episode ended up and how large it was
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Download the audio referenced by `record` into the episodes directory
///
/// The body is streamed straight to the final path. The write is not atomic:
/// an interrupted transfer leaves a truncated file behind, which the next
/// cycle treats as present.
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    record: &FeedRecord,
    episodes_dir: &Path,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let url = record.audio_url.as_str();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let output_path = episode_path(episodes_dir, &record.channel_title).await?;

    reporter.report(ProgressEvent::DownloadStarting {
        feed_url: record.feed_url.clone(),
        channel_title: record.channel_title.clone(),
        episode_title: record.latest_item_title.clone(),
        destination: output_path.clone(),
        content_length: response.content_length,
    });
    tracing::info!(
        channel = %record.channel_title,
        episode = %record.latest_item_title,
        destination = %output_path.display(),
        "downloading episode"
    );

    let mut file =
        File::create(&output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.clone(),
                source: e,
            })?;

    let content_length = response.content_length;
    let mut stream = response.body;

    let streamed = async {
        let mut bytes_downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
                url: url.to_string(),
                source: e,
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::FileWriteFailed {
                    path: output_path.clone(),
                    source: e,
                })?;

            bytes_downloaded += chunk.len() as u64;

            reporter.report(ProgressEvent::DownloadProgress {
                feed_url: record.feed_url.clone(),
                bytes_downloaded,
                total_bytes: content_length,
            });
        }

        Ok::<u64, DownloadError>(bytes_downloaded)
    }
    .await;

    // Flush even after a failed transfer so the truncated file holds every
    // byte that was received
    let flushed = file
        .flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.clone(),
            source: e,
        });
    let bytes_downloaded = streamed?;
    flushed?;

    reporter.report(ProgressEvent::DownloadCompleted {
        feed_url: record.feed_url.clone(),
        episode_title: record.latest_item_title.clone(),
        bytes_downloaded,
    });

    Ok(DownloadOutcome {
        path: output_path,
        bytes: bytes_downloaded,
    })
}
