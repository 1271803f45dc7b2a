use error_stack::ResultExt;
use tracing::debug;

use crate::cache::AnalysisCache;
use crate::collection::{CollectionError, CollectionResult};
use crate::music::{Key, Mode};
use crate::spotify::{PlaylistService, SpotifyTrack};

/// Decides whether a track belongs to a (key, mode) collection.
///
/// Analysis is served from the cache when any collection has recorded the track,
/// and fetched from Spotify otherwise. The classifier never writes to the cache.
pub struct TrackClassifier<'a> {
    spotify: &'a dyn PlaylistService,
    cache: &'a AnalysisCache,
}

impl<'a> TrackClassifier<'a> {
    pub fn new(spotify: &'a dyn PlaylistService, cache: &'a AnalysisCache) -> Self {
        Self { spotify, cache }
    }

    /// Fills `track.analysis`. It stays `None` when Spotify has no analysis for the track.
    pub async fn analyze(&self, track: &mut SpotifyTrack) -> CollectionResult<()> {
        let cached = self
            .cache
            .find_analytics(&track.spotify_track_id)
            .change_context(CollectionError)?;
        if cached.is_some() {
            track.analysis = cached;
            return Ok(());
        }
        track.analysis = self
            .spotify
            .get_track_analysis(&track.spotify_track_id)
            .await
            .change_context(CollectionError)
            .attach_printable(format!("Failed to fetch the analysis of {}", track))?;
        if track.analysis.is_none() {
            debug!(track = track.spotify_track_id.as_str(), "no analysis available");
        }
        Ok(())
    }

    pub async fn classify(
        &self,
        track: &mut SpotifyTrack,
        key: Key,
        mode: Mode,
    ) -> CollectionResult<bool> {
        self.analyze(track).await?;
        Ok(track
            .analysis
            .map_or(false, |analysis| analysis.matches(key, mode)))
    }
}
