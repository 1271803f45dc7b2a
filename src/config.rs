use std::path::PathBuf;
use std::{env, fmt};

use error_stack::{IntoReport, Report, ResultExt};

use crate::Suggestion;

#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Configuration error")
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = error_stack::Result<T, ConfigError>;

/// `AppConfig` holds static configuration values for the application.
pub struct AppConfig;

impl AppConfig {
    pub const SPOTIFY_API_URL: &'static str = "https://api.spotify.com/v1";
    pub const SPOTIFY_AUTH_URL: &'static str = "https://accounts.spotify.com/authorize";
    pub const SPOTIFY_TOKEN_URL: &'static str = "https://accounts.spotify.com/api/token";
    pub const SPOTIFY_SCOPES: [&'static str; 3] = [
        "playlist-modify-public",
        "playlist-modify-private",
        "ugc-image-upload",
    ];
    /// Spotify rejects playlist mutations with more than 100 items.
    pub const PLAYLIST_BATCH_SIZE: usize = 100;
    pub const DEFAULT_REDIRECT_URI: &'static str = "http://localhost:8888/callback";
    pub const OAUTH_CALLBACK_TIMEOUT_SECS: u64 = 300;

    pub const DATA_DIR_NAME: &'static str = "key-wizard";
    pub const DB_FILE: &'static str = "sqlite.db";
    pub const PLAYLIST_IDS_FILE: &'static str = "playlist_ids.txt";
    pub const CREDENTIALS_FILE: &'static str = "credentials.json";
}

/// Settings read from the environment (and a `.env` file, when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        let client_id = Self::required_var("SPOTIFY_CLIENT_ID")?;
        let client_secret = Self::required_var("SPOTIFY_CLIENT_SECRET")?;
        let redirect_uri = env::var("SPOTIFY_REDIRECT_URI")
            .unwrap_or_else(|_| AppConfig::DEFAULT_REDIRECT_URI.to_string());
        let data_dir = match env::var("KEY_WIZARD_DATA_DIR") {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::default_data_dir()?,
        };
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            data_dir,
        })
    }

    fn required_var(name: &str) -> ConfigResult<String> {
        let value = env::var(name)
            .into_report()
            .change_context(ConfigError)
            .attach_printable(format!("{} environment variable not set", name))
            .attach(Suggestion(format!(
                "add {}=<value> to a .env file in the working directory",
                name
            )))?;
        if value.trim().is_empty() {
            return Err(Report::new(ConfigError)
                .attach_printable(format!("{} environment variable is empty", name)));
        }
        Ok(value)
    }

    fn default_data_dir() -> ConfigResult<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(AppConfig::DATA_DIR_NAME))
            .ok_or(ConfigError)
            .into_report()
            .attach_printable("Could not determine the user data directory")
            .attach(Suggestion(
                "set KEY_WIZARD_DATA_DIR to the folder that should hold the cache".to_string(),
            ))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(AppConfig::DB_FILE)
    }

    pub fn playlist_ids_path(&self) -> PathBuf {
        self.data_dir.join(AppConfig::PLAYLIST_IDS_FILE)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(AppConfig::CREDENTIALS_FILE)
    }
}
