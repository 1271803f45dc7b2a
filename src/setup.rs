use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use lazy_regex::regex;

use crate::cache::AnalysisCache;
use crate::config::Settings;
use crate::spotify::auth::{FileCredentialStore, SpotifyAuth};
use crate::Suggestion;

#[derive(Debug)]
pub struct SetupError;

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Setup error")
    }
}

impl std::error::Error for SetupError {}

pub type SetupResult<T> = error_stack::Result<T, SetupError>;

/// Setup is complete once the data dir, the cache, the playlist-ids file and
/// the stored credentials all exist.
pub fn is_complete(settings: &Settings) -> bool {
    [
        settings.data_dir.clone(),
        settings.db_path(),
        settings.playlist_ids_path(),
        settings.credentials_path(),
    ]
    .iter()
    .all(|path| path.exists())
}

pub async fn run_setup(settings: &Settings) -> SetupResult<()> {
    println!("{}", "Your setup is incomplete, running setup...".yellow());
    fs::create_dir_all(&settings.data_dir)
        .into_report()
        .change_context(SetupError)
        .attach_printable(format!(
            "Failed to create the data directory at {}",
            settings.data_dir.display()
        ))?;

    AnalysisCache::open(&settings.db_path()).change_context(SetupError)?;

    let playlist_ids_path = settings.playlist_ids_path();
    if !playlist_ids_path.exists() {
        fs::write(&playlist_ids_path, "")
            .into_report()
            .change_context(SetupError)
            .attach_printable(format!("Failed to create {}", playlist_ids_path.display()))?;
    }

    let store = Arc::new(FileCredentialStore::new(settings.credentials_path()));
    if !store.exists() {
        SpotifyAuth::new(settings, store)
            .change_context(SetupError)?
            .authorize()
            .await
            .change_context(SetupError)?;
    }

    println!(
        "{}\nAdd one playlist id or url per line to {} and run the command again.",
        "Setup complete.".green(),
        playlist_ids_path.display().to_string().cyan()
    );
    Ok(())
}

pub fn read_playlist_ids(path: &Path) -> SetupResult<Vec<String>> {
    let content = fs::read_to_string(path)
        .into_report()
        .change_context(SetupError)
        .attach_printable(format!("Failed to read {}", path.display()))?;
    let playlist_ids = parse_playlist_ids(&content);
    if playlist_ids.is_empty() {
        return Err(Report::new(SetupError)
            .attach_printable(format!("No playlist ids found in {}", path.display()))
            .attach(Suggestion(
                "add one Spotify playlist id or url per line, then run again".to_string(),
            )));
    }
    Ok(playlist_ids)
}

/// One id per line. Playlist urls are reduced to their id; blank lines and repeats are dropped.
pub fn parse_playlist_ids(content: &str) -> Vec<String> {
    let playlist_url = regex!(r"open\.spotify\.com/playlist/([A-Za-z0-9]+)");
    let mut playlist_ids: Vec<String> = vec![];
    for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let playlist_id = match playlist_url.captures(line) {
            Some(captures) => captures[1].to_string(),
            None => line.to_string(),
        };
        if !playlist_ids.contains(&playlist_id) {
            playlist_ids.push(playlist_id);
        }
    }
    playlist_ids
}
