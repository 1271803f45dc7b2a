use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt, fs};

use chrono::{DateTime, Utc};
use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tiny_http::{Response, Server};
use tracing::{debug, info};
use url::Url;

use crate::config::{AppConfig, Settings};

#[derive(Debug)]
pub struct AuthError;

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Spotify authorization error")
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = error_stack::Result<T, AuthError>;

/// Where the long-lived refresh token is kept between runs.
pub trait CredentialStore: Send + Sync {
    fn load_refresh_token(&self) -> AuthResult<Option<String>>;
    fn store_refresh_token(&self, refresh_token: &str) -> AuthResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    refresh_token: String,
    updated_at: DateTime<Utc>,
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_refresh_token(&self) -> AuthResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .into_report()
            .change_context(AuthError)
            .attach_printable(format!("Failed to read {}", self.path.display()))?;
        let stored: StoredCredentials = serde_json::from_str(&content)
            .into_report()
            .change_context(AuthError)
            .attach_printable(format!(
                "Failed to parse {}. Ensure it is valid JSON.",
                self.path.display()
            ))?;
        Ok(Some(stored.refresh_token).filter(|token| !token.is_empty()))
    }

    fn store_refresh_token(&self, refresh_token: &str) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .into_report()
                .change_context(AuthError)
                .attach_printable(format!("Failed to create directory at {}", parent.display()))?;
        }
        let stored = StoredCredentials {
            refresh_token: refresh_token.to_string(),
            updated_at: Utc::now(),
        };
        let serialized = serde_json::to_string_pretty(&stored)
            .into_report()
            .change_context(AuthError)?;
        fs::write(&self.path, serialized)
            .into_report()
            .change_context(AuthError)
            .attach_printable(format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// OAuth client for the Spotify accounts service.
pub struct SpotifyAuth {
    oauth: BasicClient,
    redirect_uri: Url,
    store: Arc<dyn CredentialStore>,
}

impl SpotifyAuth {
    pub fn new(settings: &Settings, store: Arc<dyn CredentialStore>) -> AuthResult<Self> {
        let redirect_uri = Url::parse(&settings.redirect_uri)
            .into_report()
            .change_context(AuthError)
            .attach_printable(format!("Invalid redirect uri {}", settings.redirect_uri))?;
        let oauth = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            Some(ClientSecret::new(settings.client_secret.clone())),
            AuthUrl::new(AppConfig::SPOTIFY_AUTH_URL.to_string())
                .into_report()
                .change_context(AuthError)?,
            Some(
                TokenUrl::new(AppConfig::SPOTIFY_TOKEN_URL.to_string())
                    .into_report()
                    .change_context(AuthError)?,
            ),
        )
        .set_redirect_uri(RedirectUrl::from_url(redirect_uri.clone()));
        Ok(Self {
            oauth,
            redirect_uri,
            store,
        })
    }

    pub fn is_authorized(&self) -> AuthResult<bool> {
        Ok(self.store.load_refresh_token()?.is_some())
    }

    /// Runs the authorization code flow in the browser and stores the refresh token.
    pub async fn authorize(&self) -> AuthResult<()> {
        println!("{}", "🔐 Initiating Spotify authorization...".cyan());
        let (auth_url, csrf_token) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scopes(
                AppConfig::SPOTIFY_SCOPES
                    .iter()
                    .map(|scope| Scope::new(scope.to_string())),
            )
            .url();

        println!(
            "If the browser doesn't open, visit: {}",
            auth_url.to_string().blue()
        );
        if webbrowser::open(auth_url.as_str()).is_err() {
            println!("{}", "Failed to open browser automatically".yellow());
        }

        let callback = self.wait_for_callback().await?;
        if callback.state.as_deref() != Some(csrf_token.secret().as_str()) {
            return Err(Report::new(AuthError)
                .attach_printable("State mismatch in the authorization callback"));
        }

        let token = self
            .oauth
            .exchange_code(AuthorizationCode::new(callback.code))
            .request_async(async_http_client)
            .await
            .map_err(|err| Report::new(AuthError).attach_printable(err.to_string()))?;
        let refresh_token = token
            .refresh_token()
            .ok_or(AuthError)
            .into_report()
            .attach_printable("Spotify did not return a refresh token")?;
        self.store.store_refresh_token(refresh_token.secret())?;
        println!("{}", "✅ Spotify authorization successful!".green());
        Ok(())
    }

    /// Exchanges the stored refresh token for a new access token, persisting a rotated
    /// refresh token when Spotify issues one.
    pub async fn refresh_access_token(&self) -> AuthResult<String> {
        let refresh_token = self
            .store
            .load_refresh_token()?
            .ok_or(AuthError)
            .into_report()
            .attach_printable("No refresh token stored. Run the auth command first.")?;
        let token = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(async_http_client)
            .await
            .map_err(|err| Report::new(AuthError).attach_printable(err.to_string()))?;
        if let Some(rotated) = token.refresh_token() {
            self.store.store_refresh_token(rotated.secret())?;
        }
        info!("spotify access token refreshed");
        Ok(token.access_token().secret().to_string())
    }

    async fn wait_for_callback(&self) -> AuthResult<AuthorizationCallback> {
        let host = self.redirect_uri.host_str().unwrap_or("localhost");
        let port = self.redirect_uri.port_or_known_default().unwrap_or(80);
        let server = Server::http(format!("{}:{}", host, port))
            .map_err(|err| Report::new(AuthError).attach_printable(err.to_string()))?;
        println!(
            "Waiting for the authorization callback on {}",
            self.redirect_uri.as_str().cyan()
        );

        let timeout = Duration::from_secs(AppConfig::OAUTH_CALLBACK_TIMEOUT_SECS);
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                return Err(Report::new(AuthError).attach_printable("Authorization timed out"));
            }
            let request = match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                Err(err) => {
                    return Err(Report::new(AuthError).attach_printable(err.to_string()));
                }
            };
            debug!(url = request.url(), "callback request received");
            match parse_callback(self.redirect_uri.path(), request.url()) {
                Ok(Some(callback)) => {
                    let _ = request.respond(Response::from_string(
                        "Authorization successful! You can close this window.",
                    ));
                    return Ok(callback);
                }
                Ok(None) => {
                    let _ = request.respond(Response::from_string("Not Found").with_status_code(404));
                }
                Err(report) => {
                    let _ = request.respond(
                        Response::from_string("Authorization failed.").with_status_code(400),
                    );
                    return Err(report);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
struct AuthorizationCallback {
    code: String,
    state: Option<String>,
}

/// `Ok(None)` for requests that are not the callback (favicon and friends).
fn parse_callback(callback_path: &str, request_url: &str) -> AuthResult<Option<AuthorizationCallback>> {
    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(request_url))
        .into_report()
        .change_context(AuthError)?;
    if url.path() != callback_path {
        return Ok(None);
    }
    let mut code = None;
    let mut state = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(Report::new(AuthError)
                    .attach_printable(format!("Spotify denied the authorization: {}", value)))
            }
            _ => {}
        }
    }
    let code = code
        .ok_or(AuthError)
        .into_report()
        .attach_printable("Callback is missing the authorization code")?;
    Ok(Some(AuthorizationCallback { code, state }))
}
