// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// Maximum number of hex digits kept from the encoded channel title
const MAX_STEM_LENGTH: usize = 32;

/// Every episode is stored with this extension, regardless of its real format
pub const AUDIO_EXTENSION: &str = "mp3";

/// Derive the filename stem for a channel title
///
/// Each character is written as its code point in uppercase hex, at least two
/// digits wide, and the result is cut to the first 32 hex digits. Titles that
/// share their first 16 characters therefore map to the same stem.
pub fn episode_stem(channel_title: &str) -> String {
    let mut hex = String::with_capacity(channel_title.len() * 2);
    for c in channel_title.chars() {
        // Writing to a String cannot fail
        let _ = write!(hex, "{:02X}", c as u32);
    }
    hex.truncate(MAX_STEM_LENGTH);
    hex
}

/// Compute where the audio file for a channel lives, creating the episodes
/// directory (and any missing parents) on the way
pub async fn episode_path(
    episodes_dir: &Path,
    channel_title: &str,
) -> Result<PathBuf, PathError> {
    tokio::fs::create_dir_all(episodes_dir)
        .await
        .map_err(|e| PathError::CreateDirectoryFailed {
            path: episodes_dir.to_path_buf(),
            source: e,
        })?;

    Ok(episodes_dir.join(format!(
        "{}.{}",
        episode_stem(channel_title),
        AUDIO_EXTENSION
    )))
}
