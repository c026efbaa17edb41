// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{FeedRecord, parse_latest};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FeedError> {
    client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })
}

/// Fetch a feed and reduce it to its newest episode
///
/// The record's `feed_url` is the subscription URL exactly as given, since
/// it is the store key.
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<FeedRecord, FeedError> {
    Url::parse(url)?;
    let bytes = fetch_feed_bytes(client, url).await?;
    let record = parse_latest(&bytes, url)?;
    tracing::debug!(feed_url = url, publish_date = %record.publish_date, "fetched feed");
    Ok(record)
}
