use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::music::{Analysis, Key, Mode};
use crate::spotify::auth::SpotifyAuth;
use crate::spotify::pipeline::{run_pipeline, RawResponse};
use crate::spotify::{PlaylistService, SpotifyError, SpotifyPlaylist, SpotifyResult, SpotifyTrack};

#[derive(Deserialize, Clone, Debug)]
struct ApiUser {
    id: String,
}

#[derive(Deserialize, Clone, Debug)]
struct ApiImage {
    url: String,
}

#[derive(Deserialize, Clone, Debug)]
struct ApiPlaylist {
    id: String,
    name: String,
    #[serde(default)]
    images: Option<Vec<ApiImage>>,
}

#[derive(Deserialize, Clone, Debug)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize, Clone, Debug)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Deserialize, Clone, Debug)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Deserialize, Clone, Debug)]
struct PlaylistTracks {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
struct AudioAnalysis {
    track: AudioAnalysisTrack,
}

#[derive(Deserialize, Clone, Debug)]
struct AudioAnalysisTrack {
    key: i64,
    mode: i64,
    tempo: f64,
}

enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Jpeg(String),
}

impl From<ApiPlaylist> for SpotifyPlaylist {
    fn from(playlist: ApiPlaylist) -> Self {
        Self {
            spotify_playlist_id: playlist.id,
            name: playlist.name,
            cover_url: playlist
                .images
                .and_then(|images| images.into_iter().next())
                .map(|image| image.url),
        }
    }
}

impl From<AudioAnalysis> for Analysis {
    fn from(analysis: AudioAnalysis) -> Self {
        Self {
            key: Key::from_analysis(analysis.track.key),
            mode: Mode::from_id(analysis.track.mode),
            tempo: analysis.track.tempo,
        }
    }
}

/// Spotify Web API client. Access tokens are refreshed transparently.
pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
    auth: SpotifyAuth,
    access_token: RwLock<String>,
    user_id: OnceCell<String>,
}

impl SpotifyClient {
    pub async fn connect(auth: SpotifyAuth) -> SpotifyResult<Self> {
        let access_token = auth
            .refresh_access_token()
            .await
            .change_context(SpotifyError)
            .attach_printable("Failed to obtain a Spotify access token")?;
        Ok(Self::with_access_token(auth, AppConfig::SPOTIFY_API_URL, access_token))
    }

    pub(crate) fn with_access_token(auth: SpotifyAuth, api_url: &str, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            auth,
            access_token: RwLock::new(access_token),
            user_id: OnceCell::new(),
        }
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
    ) -> SpotifyResult<Option<String>> {
        run_pipeline(
            endpoint,
            || self.execute(method.clone(), endpoint, &body),
            || self.refresh(),
        )
        .await
        .attach_printable(format!("{} {}", method, endpoint))
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: &RequestBody,
    ) -> SpotifyResult<RawResponse> {
        let url = format!("{}{}", self.api_url, endpoint);
        let access_token = self.access_token.read().await.clone();
        let request = self.http.request(method, url).bearer_auth(access_token);
        let request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Jpeg(encoded) => request
                .header(CONTENT_TYPE, "image/jpeg")
                .body(encoded.clone()),
        };
        let response = request
            .send()
            .await
            .into_report()
            .change_context(SpotifyError)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .into_report()
            .change_context(SpotifyError)?;
        Ok(RawResponse { status, body })
    }

    async fn refresh(&self) -> SpotifyResult<()> {
        let access_token = self
            .auth
            .refresh_access_token()
            .await
            .change_context(SpotifyError)?;
        *self.access_token.write().await = access_token;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> SpotifyResult<Option<T>> {
        self.request(Method::GET, endpoint, RequestBody::Empty)
            .await?
            .map(|body| parse_json(endpoint, &body))
            .transpose()
    }

    async fn current_user_id(&self) -> SpotifyResult<&str> {
        let user_id = self
            .user_id
            .get_or_try_init(|| async {
                let user: ApiUser = self
                    .get_json("/me")
                    .await?
                    .ok_or(SpotifyError)
                    .into_report()
                    .attach_printable("Current user not found")?;
                Ok::<_, Report<SpotifyError>>(user.id)
            })
            .await?;
        Ok(user_id.as_str())
    }

    async fn tracks_page(&self, endpoint: String) -> SpotifyResult<(Vec<SpotifyTrack>, Option<String>)> {
        let Some(page) = self.get_json::<PlaylistTracks>(&endpoint).await? else {
            return Ok((vec![], None));
        };
        let next = page
            .next
            .as_deref()
            .map(|url| api_endpoint(&self.api_url, url))
            .transpose()?;
        let tracks = page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| {
                let Some(track_id) = track.id else {
                    println!(
                        "Skipping track '{}' because it has no ID (it might be a local file).",
                        track.name.yellow()
                    );
                    return None;
                };
                let artists = track
                    .artists
                    .iter()
                    .map(|artist| artist.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(SpotifyTrack::new(track_id, track.name, artists))
            })
            .collect();
        Ok((tracks, next))
    }
}

fn parse_json<T: DeserializeOwned>(endpoint: &str, body: &str) -> SpotifyResult<T> {
    serde_json::from_str(body)
        .into_report()
        .change_context(SpotifyError)
        .attach_printable(format!("Unexpected response body from {}", endpoint))
}

/// Pagination links are absolute urls; the pipeline works with endpoints.
fn api_endpoint(api_url: &str, url: &str) -> SpotifyResult<String> {
    url.strip_prefix(api_url)
        .map(str::to_string)
        .ok_or(SpotifyError)
        .into_report()
        .attach_printable(format!("Unexpected pagination url {}", url))
}

fn ensure_batch_size(track_ids: &[String]) -> SpotifyResult<()> {
    if track_ids.len() > AppConfig::PLAYLIST_BATCH_SIZE {
        return Err(Report::new(SpotifyError).attach_printable(format!(
            "A batch holds at most {} tracks, got {}",
            AppConfig::PLAYLIST_BATCH_SIZE,
            track_ids.len()
        )));
    }
    Ok(())
}

fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{}", track_id)
}

#[async_trait]
impl PlaylistService for SpotifyClient {
    async fn get_playlist(&self, playlist_id: &str) -> SpotifyResult<Option<SpotifyPlaylist>> {
        let endpoint = format!("/playlists/{}", urlencoding::encode(playlist_id));
        let playlist: Option<ApiPlaylist> = self.get_json(&endpoint).await?;
        Ok(playlist.map(SpotifyPlaylist::from))
    }

    fn get_playlist_tracks<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> BoxStream<'a, SpotifyResult<SpotifyTrack>> {
        let first = format!(
            "/playlists/{}/tracks?limit={}",
            urlencoding::encode(playlist_id),
            AppConfig::PLAYLIST_BATCH_SIZE
        );
        stream::try_unfold(Some(first), move |endpoint| async move {
            let Some(endpoint) = endpoint else {
                return Ok::<_, Report<SpotifyError>>(None);
            };
            debug!(endpoint = endpoint.as_str(), "fetching playlist page");
            let (tracks, next) = self.tracks_page(endpoint).await?;
            let page = stream::iter(tracks.into_iter().map(Ok::<_, Report<SpotifyError>>));
            Ok(Some((page, next)))
        })
        .try_flatten()
        .boxed()
    }

    async fn get_track_analysis(&self, track_id: &str) -> SpotifyResult<Option<Analysis>> {
        let endpoint = format!("/audio-analysis/{}", urlencoding::encode(track_id));
        let analysis: Option<AudioAnalysis> = self.get_json(&endpoint).await?;
        Ok(analysis.map(Analysis::from))
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        cover_jpeg: Option<&[u8]>,
    ) -> SpotifyResult<SpotifyPlaylist> {
        let user_id = self.current_user_id().await?;
        let endpoint = format!("/users/{}/playlists", urlencoding::encode(user_id));
        let body = self
            .request(
                Method::POST,
                &endpoint,
                RequestBody::Json(json!({ "name": name, "description": description })),
            )
            .await?
            .ok_or(SpotifyError)
            .into_report()
            .attach_printable(format!("User {} not found", user_id))?;
        let created: ApiPlaylist = parse_json(&endpoint, &body)?;

        if let Some(cover) = cover_jpeg {
            let cover_endpoint = format!("/playlists/{}/images", urlencoding::encode(&created.id));
            let upload = self
                .request(
                    Method::PUT,
                    &cover_endpoint,
                    RequestBody::Jpeg(general_purpose::STANDARD.encode(cover)),
                )
                .await;
            // The playlist already exists remotely, so it is returned even without its cover.
            if let Err(report) = upload {
                warn!("cover upload failed, keeping the default cover: {:?}", report);
            }
        }

        let playlist = self.get_playlist(&created.id).await?;
        Ok(playlist.unwrap_or_else(|| SpotifyPlaylist::from(created)))
    }

    async fn check_following(&self, playlist_id: &str) -> SpotifyResult<bool> {
        let user_id = self.current_user_id().await?;
        let endpoint = format!(
            "/playlists/{}/followers/contains?ids={}",
            urlencoding::encode(playlist_id),
            urlencoding::encode(user_id)
        );
        let following: Option<Vec<bool>> = self.get_json(&endpoint).await?;
        Ok(following
            .and_then(|flags| flags.first().copied())
            .unwrap_or(false))
    }

    async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> SpotifyResult<()> {
        ensure_batch_size(track_ids)?;
        if track_ids.is_empty() {
            return Ok(());
        }
        let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();
        let endpoint = format!("/playlists/{}/tracks", urlencoding::encode(playlist_id));
        self.request(Method::POST, &endpoint, RequestBody::Json(json!({ "uris": uris })))
            .await?
            .ok_or(SpotifyError)
            .into_report()
            .attach_printable(format!("Playlist {} not found", playlist_id))?;
        Ok(())
    }

    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> SpotifyResult<()> {
        ensure_batch_size(track_ids)?;
        if track_ids.is_empty() {
            return Ok(());
        }
        let tracks: Vec<serde_json::Value> = track_ids
            .iter()
            .map(|id| json!({ "uri": track_uri(id) }))
            .collect();
        let endpoint = format!("/playlists/{}/tracks", urlencoding::encode(playlist_id));
        self.request(
            Method::DELETE,
            &endpoint,
            RequestBody::Json(json!({ "tracks": tracks })),
        )
        .await?
        .ok_or(SpotifyError)
        .into_report()
        .attach_printable(format!("Playlist {} not found", playlist_id))?;
        Ok(())
    }
}
