use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::cover::{CoverArt, CoverError, CoverResult};
use crate::music::{Analysis, Key, Mode};
use crate::spotify::{
    ApiError, PlaylistService, SpotifyError, SpotifyPlaylist, SpotifyResult, SpotifyTrack,
};

#[derive(Default)]
struct FakeState {
    playlists: HashMap<String, SpotifyPlaylist>,
    contents: HashMap<String, Vec<String>>,
    analyses: HashMap<String, Analysis>,
    followed: HashSet<String>,
    broken: HashSet<String>,
    failing: HashSet<Endpoint>,
    covers: Vec<Option<Vec<u8>>>,
    add_batches: Vec<usize>,
    delete_batches: Vec<usize>,
}

/// Write endpoints that can be switched to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CreatePlaylist,
    AddTracks,
    DeleteTracks,
}

fn unavailable(endpoint: Endpoint) -> Report<SpotifyError> {
    Report::new(ApiError {
        status: 503,
        message: "Service unavailable".to_string(),
    })
    .change_context(SpotifyError)
    .attach_printable(format!("{:?} failed", endpoint))
}

/// In-memory Spotify account with per-endpoint call counters.
#[derive(Default)]
pub struct FakeSpotify {
    state: Mutex<FakeState>,
    analysis_calls: AtomicUsize,
    created: AtomicUsize,
}

pub fn analysis(key: u8, mode: Mode, tempo: f64) -> Analysis {
    Analysis {
        key: Key::new(key),
        mode: Some(mode),
        tempo,
    }
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, playlist_id: &str, name: &str, tracks: &[(&str, Analysis)]) -> SpotifyPlaylist {
        let playlist = SpotifyPlaylist {
            spotify_playlist_id: playlist_id.to_string(),
            name: name.to_string(),
            cover_url: Some(format!("https://covers.test/{}.jpg", playlist_id)),
        };
        let mut state = self.state.lock().unwrap();
        state
            .playlists
            .insert(playlist_id.to_string(), playlist.clone());
        state.followed.insert(playlist_id.to_string());
        state.contents.insert(
            playlist_id.to_string(),
            tracks.iter().map(|(id, _)| id.to_string()).collect(),
        );
        for (id, track_analysis) in tracks {
            state.analyses.insert(id.to_string(), *track_analysis);
        }
        playlist
    }

    pub fn set_analysis(&self, track_id: &str, track_analysis: Analysis) {
        let mut state = self.state.lock().unwrap();
        state.analyses.insert(track_id.to_string(), track_analysis);
    }

    pub fn set_contents(&self, playlist_id: &str, track_ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.contents.insert(
            playlist_id.to_string(),
            track_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn contents(&self, playlist_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.contents.get(playlist_id).cloned().unwrap_or_default()
    }

    pub fn unfollow(&self, playlist_id: &str) {
        self.state.lock().unwrap().followed.remove(playlist_id);
    }

    /// Listing the playlist's tracks fails with a 500 from now on.
    pub fn break_playlist(&self, playlist_id: &str) {
        self.state.lock().unwrap().broken.insert(playlist_id.to_string());
    }

    /// Calls to `endpoint` answer 503 until `recover` is called.
    pub fn fail(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failing.remove(&endpoint);
    }

    fn check(&self, endpoint: Endpoint) -> SpotifyResult<()> {
        if self.state.lock().unwrap().failing.contains(&endpoint) {
            return Err(unavailable(endpoint));
        }
        Ok(())
    }

    pub fn playlist(&self, playlist_id: &str) -> Option<SpotifyPlaylist> {
        self.state.lock().unwrap().playlists.get(playlist_id).cloned()
    }

    pub fn covers(&self) -> Vec<Option<Vec<u8>>> {
        self.state.lock().unwrap().covers.clone()
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Sizes of the add and delete batches seen so far; clears the record.
    pub fn take_batches(&self) -> (Vec<usize>, Vec<usize>) {
        let mut state = self.state.lock().unwrap();
        (
            std::mem::take(&mut state.add_batches),
            std::mem::take(&mut state.delete_batches),
        )
    }
}

#[async_trait]
impl PlaylistService for FakeSpotify {
    async fn get_playlist(&self, playlist_id: &str) -> SpotifyResult<Option<SpotifyPlaylist>> {
        Ok(self.playlist(playlist_id))
    }

    fn get_playlist_tracks<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> BoxStream<'a, SpotifyResult<SpotifyTrack>> {
        let state = self.state.lock().unwrap();
        let items: Vec<SpotifyResult<SpotifyTrack>> = if state.broken.contains(playlist_id) {
            vec![Err(Report::new(ApiError {
                status: 500,
                message: "Server error".to_string(),
            })
            .change_context(SpotifyError))]
        } else {
            state
                .contents
                .get(playlist_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|id| {
                    Ok(SpotifyTrack::new(
                        id.clone(),
                        format!("Track {}", id),
                        "Fake Artist".to_string(),
                    ))
                })
                .collect()
        };
        stream::iter(items).boxed()
    }

    async fn get_track_analysis(&self, track_id: &str) -> SpotifyResult<Option<Analysis>> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().analyses.get(track_id).copied())
    }

    async fn create_playlist(
        &self,
        name: &str,
        _description: &str,
        cover_jpeg: Option<&[u8]>,
    ) -> SpotifyResult<SpotifyPlaylist> {
        self.check(Endpoint::CreatePlaylist)?;
        let number = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let playlist = SpotifyPlaylist {
            spotify_playlist_id: format!("collection-{}", number),
            name: name.to_string(),
            cover_url: None,
        };
        let mut state = self.state.lock().unwrap();
        let id = playlist.spotify_playlist_id.clone();
        state.playlists.insert(id.clone(), playlist.clone());
        state.contents.insert(id.clone(), vec![]);
        state.followed.insert(id);
        state.covers.push(cover_jpeg.map(|bytes| bytes.to_vec()));
        Ok(playlist)
    }

    async fn check_following(&self, playlist_id: &str) -> SpotifyResult<bool> {
        Ok(self.state.lock().unwrap().followed.contains(playlist_id))
    }

    async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> SpotifyResult<()> {
        assert!(track_ids.len() <= 100, "batch of {} tracks", track_ids.len());
        self.check(Endpoint::AddTracks)?;
        let mut state = self.state.lock().unwrap();
        state.add_batches.push(track_ids.len());
        state
            .contents
            .entry(playlist_id.to_string())
            .or_default()
            .extend(track_ids.iter().cloned());
        Ok(())
    }

    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> SpotifyResult<()> {
        assert!(track_ids.len() <= 100, "batch of {} tracks", track_ids.len());
        self.check(Endpoint::DeleteTracks)?;
        let mut state = self.state.lock().unwrap();
        state.delete_batches.push(track_ids.len());
        if let Some(contents) = state.contents.get_mut(playlist_id) {
            contents.retain(|id| !track_ids.contains(id));
        }
        Ok(())
    }
}

/// Returns a fixed cover, or fails when built with `broken`.
pub struct FakeCover {
    fail: bool,
}

impl FakeCover {
    pub fn working() -> Self {
        Self { fail: false }
    }

    pub fn broken() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl CoverArt for FakeCover {
    async fn generate_cover(
        &self,
        source_cover_url: Option<&str>,
        _key_label: &str,
        _mode_label: &str,
    ) -> CoverResult<Option<Vec<u8>>> {
        if self.fail {
            return Err(Report::new(CoverError).attach_printable("cover service down"));
        }
        Ok(source_cover_url.map(|_| vec![0xFF, 0xD8, 0xFF]))
    }
}
