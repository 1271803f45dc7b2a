use std::sync::Arc;

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use error_stack::{IntoReport, Report, ResultExt};

use crate::cache::AnalysisCache;
use crate::collection::reconciler::{Reconciler, SyncOutcome};
use crate::collection::{CollectionError, CollectionResult};
use crate::config::Settings;
use crate::cover::SourceCoverArt;
use crate::dialoguer::Dialoguer;
use crate::music::{Key, Mode};
use crate::setup::read_playlist_ids;
use crate::spotify::api::SpotifyClient;
use crate::spotify::auth::{FileCredentialStore, SpotifyAuth};
use crate::spotify::{PlaylistService, SpotifyPlaylist};

pub struct CollectCommand {
    pub key: Option<Key>,
    pub mode: Option<Mode>,
    pub all: bool,
}

impl CollectCommand {
    pub async fn execute(&self, settings: &Settings) -> CollectionResult<()> {
        let cache = AnalysisCache::open(&settings.db_path()).change_context(CollectionError)?;
        let key = match self.key {
            Some(key) => key,
            None => Self::prompt_key(&cache)?,
        };
        let mode = match self.mode {
            Some(mode) => mode,
            None => Self::prompt_mode(&cache)?,
        };
        let playlist_ids =
            read_playlist_ids(&settings.playlist_ids_path()).change_context(CollectionError)?;

        let store = Arc::new(FileCredentialStore::new(settings.credentials_path()));
        let auth = SpotifyAuth::new(settings, store).change_context(CollectionError)?;
        let spotify = SpotifyClient::connect(auth)
            .await
            .change_context(CollectionError)?;

        let playlists = Self::fetch_playlists(&spotify, &playlist_ids).await?;
        let playlists = if self.all {
            playlists
        } else {
            Self::prompt_playlists(playlists)?
        };

        let cover = SourceCoverArt::new();
        let outcomes = Reconciler::new(&spotify, &cache, &cover)
            .iterate_playlists(&playlists, key, mode)
            .await;
        println!("{}", summary_table(&outcomes, key, mode));
        Ok(())
    }

    fn prompt_key(cache: &AnalysisCache) -> CollectionResult<Key> {
        let keys = cache.list_keys().change_context(CollectionError)?;
        let selection = Dialoguer::select(
            "Which key would you like to collect?".to_string(),
            keys.clone(),
            None,
        )
        .change_context(CollectionError)?;
        Ok(keys[selection])
    }

    fn prompt_mode(cache: &AnalysisCache) -> CollectionResult<Mode> {
        let mut modes = cache.list_modes().change_context(CollectionError)?;
        modes.reverse();
        let selection = Dialoguer::select(
            "Which mode would you like to collect?".to_string(),
            modes.clone(),
            None,
        )
        .change_context(CollectionError)?;
        Ok(modes[selection])
    }

    async fn fetch_playlists(
        spotify: &dyn PlaylistService,
        playlist_ids: &[String],
    ) -> CollectionResult<Vec<SpotifyPlaylist>> {
        let mut playlists = vec![];
        for playlist_id in playlist_ids {
            match spotify
                .get_playlist(playlist_id)
                .await
                .change_context(CollectionError)?
            {
                Some(playlist) => playlists.push(playlist),
                None => println!(
                    "Playlist {} not found, skipping it",
                    playlist_id.yellow()
                ),
            }
        }
        if playlists.is_empty() {
            return Err(Report::new(CollectionError)
                .attach_printable("None of the listed playlists could be found"));
        }
        Ok(playlists)
    }

    fn prompt_playlists(playlists: Vec<SpotifyPlaylist>) -> CollectionResult<Vec<SpotifyPlaylist>> {
        let defaults = vec![true; playlists.len()];
        let selection = Dialoguer::multiselect(
            "Which playlists would you like to collect from?".to_string(),
            playlists.clone(),
            Some(defaults.as_slice()),
            true,
        )
        .change_context(CollectionError)?;
        selection
            .into_iter()
            .map(|index| {
                playlists
                    .get(index)
                    .cloned()
                    .ok_or(CollectionError)
                    .into_report()
            })
            .collect()
    }
}

fn summary_table(outcomes: &[SyncOutcome], key: Key, mode: Mode) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            format!("Source ({} {})", key, mode),
            "Collection".to_string(),
            "Removed".to_string(),
            "Written".to_string(),
            "Status".to_string(),
        ]);
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => table.add_row(vec![
                Cell::new(&report.source_name),
                Cell::new(&report.collection_id),
                Cell::new(report.removed),
                Cell::new(report.written),
                Cell::new("ok").fg(Color::Green),
            ]),
            Err(_) => table.add_row(vec![
                Cell::new(&outcome.source.name),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("failed").fg(Color::Red),
            ]),
        };
    }
    table
}
