mod download;
mod filename;

pub use download::{DownloadOutcome, download_episode};
pub use filename::{AUDIO_EXTENSION, episode_path, episode_stem};
