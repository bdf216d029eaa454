//! Local media handling: fetching the located video and demuxing its audio track.

pub mod audio;
pub mod download;

pub use audio::AudioExtractor;
pub use download::MediaDownloader;
