use colored::Colorize;
use error_stack::ResultExt;
use tracing::{info, warn};

use crate::cache::AnalysisCache;
use crate::collection::{CollectionError, CollectionResult};
use crate::cover::CoverArt;
use crate::music::{Key, Mode};
use crate::spotify::{PlaylistService, SpotifyPlaylist};

pub fn collection_name(source: &SpotifyPlaylist, key: Key, mode: Mode) -> String {
    format!("{} • {} {}", source.name, key, mode)
}

pub fn collection_description(source: &SpotifyPlaylist, key: Key, mode: Mode) -> String {
    format!(
        "All the tracks in \"{}\" that might be in the key of {} {}",
        source.name, key, mode
    )
}

/// Maps a (source playlist, key, mode) tuple to a live collection playlist.
pub struct CollectionResolver<'a> {
    spotify: &'a dyn PlaylistService,
    cache: &'a AnalysisCache,
    cover: &'a dyn CoverArt,
}

impl<'a> CollectionResolver<'a> {
    pub fn new(
        spotify: &'a dyn PlaylistService,
        cache: &'a AnalysisCache,
        cover: &'a dyn CoverArt,
    ) -> Self {
        Self {
            spotify,
            cache,
            cover,
        }
    }

    /// Returns the recorded collection while the user still follows it. An unfollowed
    /// collection is forgotten, together with its cached tracks, and replaced.
    pub async fn resolve(
        &self,
        source: &SpotifyPlaylist,
        key: Key,
        mode: Mode,
    ) -> CollectionResult<String> {
        let record = self
            .cache
            .find_collection(&source.spotify_playlist_id, key, mode)
            .change_context(CollectionError)?;
        if let Some(record) = record {
            let following = self
                .spotify
                .check_following(&record.id)
                .await
                .change_context(CollectionError)?;
            if following {
                return Ok(record.id);
            }
            println!(
                "Collection {} is no longer followed, creating a new one",
                record.id.yellow()
            );
            self.cache
                .delete_collection(&record.id)
                .change_context(CollectionError)?;
        }

        let collection = self.create_collection_playlist(source, key, mode).await?;
        self.cache
            .create_collection(
                &collection.spotify_playlist_id,
                &source.spotify_playlist_id,
                key,
                mode,
            )
            .change_context(CollectionError)?;
        info!(
            collection = collection.spotify_playlist_id.as_str(),
            source = source.spotify_playlist_id.as_str(),
            "collection created"
        );
        Ok(collection.spotify_playlist_id)
    }

    async fn create_collection_playlist(
        &self,
        source: &SpotifyPlaylist,
        key: Key,
        mode: Mode,
    ) -> CollectionResult<SpotifyPlaylist> {
        let mode_label = mode.to_string();
        let cover = match self
            .cover
            .generate_cover(source.cover_url.as_deref(), key.label(), &mode_label)
            .await
        {
            Ok(cover) => cover,
            Err(report) => {
                warn!("cover generation failed, using the default cover: {:?}", report);
                None
            }
        };
        self.spotify
            .create_playlist(
                &collection_name(source, key, mode),
                &collection_description(source, key, mode),
                cover.as_deref(),
            )
            .await
            .change_context(CollectionError)
            .attach_printable(format!("Failed to create the collection for {}", source))
    }
}
