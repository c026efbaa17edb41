// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::{StoreError, SyncError};
use crate::feed::{FeedRecord, fetch_feed};
use crate::http::HttpClient;
use crate::store::FeedStore;

/// Start tracking a feed: fetch its newest episode and store the record
///
/// Subscribing to an already tracked URL refreshes its record.
pub async fn subscribe<C, S>(client: &C, store: &S, feed_url: &str) -> Result<FeedRecord, SyncError>
where
    C: HttpClient + ?Sized,
    S: FeedStore + ?Sized,
{
    let record = fetch_feed(client, feed_url).await?;
    store.put(&record)?;
    tracing::info!(feed_url, channel = %record.channel_title, "subscribed");
    Ok(record)
}

/// Stop tracking a feed. Downloaded audio is left on disk.
pub fn unsubscribe<S: FeedStore + ?Sized>(store: &S, feed_url: &str) -> Result<(), StoreError> {
    store.delete(feed_url)?;
    tracing::info!(feed_url, "unsubscribed");
    Ok(())
}

/// All tracked feeds, ordered by feed URL
pub fn list_feeds<S: FeedStore + ?Sized>(store: &S) -> Result<Vec<FeedRecord>, StoreError> {
    store.list()
}

/// Render a record the way `list` prints it
pub fn format_record(record: &FeedRecord) -> String {
    format!(
        "{}\n  Episode: {}\n  Published: {}",
        record.channel_title, record.latest_item_title, record.publish_date
    )
}
