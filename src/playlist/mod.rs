//! Playlist generation module
//!
//! Renders the M3U8 playlist that lists every indexed media file with an
//! authenticated URL, so that a media player can be pointed at a single link.

pub mod m3u;

pub use m3u::{generate_m3u, playlist_base_url, PLAYLIST_CONTENT_TYPE};
