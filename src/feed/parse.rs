// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Snapshot of a subscribed feed's newest known episode.
///
/// Serialized as the stored value for the feed, keyed by `feed_url`.
/// `publish_date` and `audio_url` always describe the same item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(rename = "channelTitle")]
    pub channel_title: String,
    #[serde(rename = "latestItemTitle")]
    pub latest_item_title: String,
    #[serde(rename = "feedURL")]
    pub feed_url: String,
    /// Raw publish date text; only ever compared for equality
    #[serde(rename = "publishDate")]
    pub publish_date: String,
    #[serde(rename = "audioURL")]
    pub audio_url: String,
}

/// Parse RSS feed XML and extract the newest item as a [`FeedRecord`]
///
/// The first item in document order is taken as the newest, and its
/// enclosure as the audio source.
pub fn parse_latest(xml_bytes: &[u8], feed_url: &str) -> Result<FeedRecord, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let item = channel.items().first().ok_or_else(|| FeedError::EmptyFeed {
        url: feed_url.to_string(),
    })?;

    let latest_item_title = item.title().unwrap_or_default().to_string();

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: latest_item_title.clone(),
        })?;

    Ok(FeedRecord {
        channel_title: channel.title().to_string(),
        latest_item_title,
        feed_url: feed_url.to_string(),
        publish_date: item.pub_date().unwrap_or_default().to_string(),
        audio_url: enclosure.url().to_string(),
    })
}
