use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::music::Analysis;

pub mod api;
pub mod auth;
#[cfg(test)]
pub(crate) mod fake_server;
pub mod pipeline;

#[derive(Debug)]
pub struct SpotifyError;

impl fmt::Display for SpotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Spotify error")
    }
}

impl std::error::Error for SpotifyError {}

pub type SpotifyResult<T> = error_stack::Result<T, SpotifyError>;

/// Error body returned by the Web API, kept inside the report so callers can tell
/// remote failures (quota, bad request, 5xx) apart from transport failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spotify API responded {}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Clone, Debug, PartialEq)]
pub struct SpotifyTrack {
    pub spotify_track_id: String,
    pub title: String,
    pub artists: String,
    pub analysis: Option<Analysis>,
}

impl SpotifyTrack {
    pub fn new(spotify_track_id: String, title: String, artists: String) -> Self {
        Self {
            spotify_track_id,
            title,
            artists,
            analysis: None,
        }
    }

    pub fn tempo(&self) -> Option<f64> {
        self.analysis.map(|analysis| analysis.tempo)
    }
}

impl fmt::Display for SpotifyTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.title, self.artists)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpotifyPlaylist {
    pub spotify_playlist_id: String,
    pub name: String,
    pub cover_url: Option<String>,
}

impl fmt::Display for SpotifyPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ids of a track list, for membership checks against bare id strings.
pub fn track_ids<'a>(tracks: impl IntoIterator<Item = &'a SpotifyTrack>) -> Vec<String> {
    tracks
        .into_iter()
        .map(|track| track.spotify_track_id.clone())
        .collect()
}

/// What the collection logic needs from Spotify. Authorization is handled by the implementor.
#[async_trait]
pub trait PlaylistService: Send + Sync {
    async fn get_playlist(&self, playlist_id: &str) -> SpotifyResult<Option<SpotifyPlaylist>>;

    /// Pages through the playlist lazily. The stream cannot be restarted; iterate again
    /// by calling this method again.
    fn get_playlist_tracks<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> BoxStream<'a, SpotifyResult<SpotifyTrack>>;

    /// `None` when Spotify has no analysis for the track.
    async fn get_track_analysis(&self, track_id: &str) -> SpotifyResult<Option<Analysis>>;

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        cover_jpeg: Option<&[u8]>,
    ) -> SpotifyResult<SpotifyPlaylist>;

    async fn check_following(&self, playlist_id: &str) -> SpotifyResult<bool>;

    /// At most `AppConfig::PLAYLIST_BATCH_SIZE` ids per call.
    async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> SpotifyResult<()>;

    /// At most `AppConfig::PLAYLIST_BATCH_SIZE` ids per call.
    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> SpotifyResult<()>;
}
