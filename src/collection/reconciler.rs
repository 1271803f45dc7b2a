use std::cmp::Ordering;
use std::collections::HashSet;

use colored::Colorize;
use error_stack::ResultExt;
use futures_util::TryStreamExt;
use tracing::{debug, info};

use crate::cache::AnalysisCache;
use crate::collection::classifier::TrackClassifier;
use crate::collection::resolver::CollectionResolver;
use crate::collection::{CollectionError, CollectionResult};
use crate::config::AppConfig;
use crate::cover::CoverArt;
use crate::music::{Analysis, Key, Mode};
use crate::spotify::{track_ids, PlaylistService, SpotifyPlaylist, SpotifyTrack};

/// What one synchronization did to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub source_name: String,
    pub collection_id: String,
    pub removed: usize,
    pub written: usize,
}

pub struct SyncOutcome {
    pub source: SpotifyPlaylist,
    pub result: CollectionResult<SyncReport>,
}

/// Rebuilds collection playlists from their source playlists.
pub struct Reconciler<'a> {
    spotify: &'a dyn PlaylistService,
    cache: &'a AnalysisCache,
    cover: &'a dyn CoverArt,
}

impl<'a> Reconciler<'a> {
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

    /// Synchronizes every playlist in order. A failed playlist is reported and skipped.
    pub async fn iterate_playlists(
        &self,
        playlists: &[SpotifyPlaylist],
        key: Key,
        mode: Mode,
    ) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            println!("⌛ Compiling from \"{}\"", playlist.name.cyan());
            let result = self.synchronize(playlist, key, mode).await;
            match &result {
                Ok(report) => println!(
                    "Collected {} tracks from \"{}\"",
                    report.written.to_string().green(),
                    playlist.name
                ),
                Err(report) => println!(
                    "{}",
                    format!("Failed to compile from \"{}\": {:?}", playlist.name, report).red()
                ),
            }
            outcomes.push(SyncOutcome {
                source: playlist.clone(),
                result,
            });
        }
        println!("{}", "✅ Done!".green());
        outcomes
    }

    /// Makes the collection of (`source`, `key`, `mode`) hold exactly the matching tracks
    /// of `source`, ordered by tempo.
    pub async fn synchronize(
        &self,
        source: &SpotifyPlaylist,
        key: Key,
        mode: Mode,
    ) -> CollectionResult<SyncReport> {
        let collection_id = CollectionResolver::new(self.spotify, self.cache, self.cover)
            .resolve(source, key, mode)
            .await?;
        let snapshot: Vec<SpotifyTrack> = self
            .spotify
            .get_playlist_tracks(&collection_id)
            .try_collect()
            .await
            .change_context(CollectionError)
            .attach_printable(format!("Failed to list collection {}", collection_id))?;
        let snapshot_ids: HashSet<String> = track_ids(&snapshot).into_iter().collect();
        debug!(
            collection = collection_id.as_str(),
            tracks = snapshot.len(),
            "collection snapshot taken"
        );

        let classifier = TrackClassifier::new(self.spotify, self.cache);
        let mut final_tracks = FinalTracks::default();

        let mut source_tracks = self.spotify.get_playlist_tracks(&source.spotify_playlist_id);
        while let Some(mut track) = source_tracks
            .try_next()
            .await
            .change_context(CollectionError)
            .attach_printable(format!("Failed to list tracks of {}", source))?
        {
            let cached = self
                .cache
                .find_track(&track.spotify_track_id, &collection_id)
                .change_context(CollectionError)?;
            if let Some(cached) = &cached {
                if snapshot_ids.contains(&track.spotify_track_id) {
                    track.analysis = Some(Analysis {
                        key: Some(key),
                        mode: Some(mode),
                        tempo: cached.tempo,
                    });
                    final_tracks.push(track);
                    continue;
                }
            }
            if classifier.classify(&mut track, key, mode).await? {
                if cached.is_none() {
                    self.cache_if_absent(&track, &collection_id)?;
                }
                final_tracks.push(track);
            }
        }
        drop(source_tracks);

        for mut track in snapshot.iter().cloned() {
            if final_tracks.contains(&track.spotify_track_id) {
                continue;
            }
            if classifier.classify(&mut track, key, mode).await? {
                self.cache_if_absent(&track, &collection_id)?;
            }
            final_tracks.push(track);
        }

        let stale_ids = unique_ids(&snapshot);
        for batch in stale_ids.chunks(AppConfig::PLAYLIST_BATCH_SIZE) {
            self.spotify
                .delete_playlist_tracks(&collection_id, batch)
                .await
                .change_context(CollectionError)
                .attach_printable(format!("Failed to clear collection {}", collection_id))?;
        }

        let ordered = final_tracks.into_tempo_order();
        let ordered_ids = track_ids(&ordered);
        for batch in ordered_ids.chunks(AppConfig::PLAYLIST_BATCH_SIZE) {
            self.spotify
                .add_playlist_tracks(&collection_id, batch)
                .await
                .change_context(CollectionError)
                .attach_printable(format!("Failed to fill collection {}", collection_id))?;
        }

        info!(
            collection = collection_id.as_str(),
            removed = stale_ids.len(),
            written = ordered_ids.len(),
            "collection synchronized"
        );
        Ok(SyncReport {
            source_name: source.name.clone(),
            collection_id,
            removed: stale_ids.len(),
            written: ordered_ids.len(),
        })
    }

    /// Track ids are unique across the whole cache, so a track already recorded by
    /// another collection is left alone.
    fn cache_if_absent(&self, track: &SpotifyTrack, collection_id: &str) -> CollectionResult<()> {
        let Some(tempo) = track.tempo() else {
            return Ok(());
        };
        let known = self
            .cache
            .find_analytics(&track.spotify_track_id)
            .change_context(CollectionError)?;
        if known.is_none() {
            self.cache
                .add_track(&track.spotify_track_id, collection_id, tempo)
                .change_context(CollectionError)?;
        }
        Ok(())
    }
}

/// Insertion-ordered set of the tracks a collection should end up with.
#[derive(Default)]
struct FinalTracks {
    ids: HashSet<String>,
    tracks: Vec<SpotifyTrack>,
}

impl FinalTracks {
    fn contains(&self, track_id: &str) -> bool {
        self.ids.contains(track_id)
    }

    fn push(&mut self, track: SpotifyTrack) {
        if self.ids.insert(track.spotify_track_id.clone()) {
            self.tracks.push(track);
        }
    }

    /// Ascending tempo; tracks without a tempo go last. Ties keep insertion order.
    fn into_tempo_order(mut self) -> Vec<SpotifyTrack> {
        self.tracks.sort_by(|a, b| compare_tempo(a.tempo(), b.tempo()));
        self.tracks
    }
}

fn compare_tempo(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn unique_ids(tracks: &[SpotifyTrack]) -> Vec<String> {
    let mut seen = HashSet::new();
    track_ids(tracks)
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
