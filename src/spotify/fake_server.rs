use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Response, Server};

use crate::config::{AppConfig, Settings};
use crate::spotify::api::SpotifyClient;
use crate::spotify::auth::{FileCredentialStore, SpotifyAuth};

type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

/// Local HTTP stand-in for the Web API and the image CDN. Routes are keyed by `"METHOD /path?query"`;
/// anything unrouted answers 404.
pub struct FakeWebApi {
    server: Arc<Server>,
    base_url: String,
    routes: Routes,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeWebApi {
    pub fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let routes: Routes = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();

        let listener = server.clone();
        let known_routes = routes.clone();
        let seen = requests.clone();
        thread::spawn(move || {
            for request in listener.incoming_requests() {
                let route = format!("{} {}", request.method(), request.url());
                seen.lock().unwrap().push(route.clone());
                let (status, body) = known_routes
                    .lock()
                    .unwrap()
                    .get(&route)
                    .cloned()
                    .unwrap_or((404, String::new()));
                let _ = request.respond(Response::from_string(body).with_status_code(status));
            }
        });

        Self {
            server,
            base_url: format!("http://127.0.0.1:{}", port),
            routes,
            requests,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn route(&self, route: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// A client already holding an access token; no refresh happens unless a route answers 401.
    pub fn client(&self) -> SpotifyClient {
        let settings = Settings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: AppConfig::DEFAULT_REDIRECT_URI.to_string(),
            data_dir: PathBuf::from("/nonexistent/key-wizard"),
        };
        let store = Arc::new(FileCredentialStore::new(settings.credentials_path()));
        let auth = SpotifyAuth::new(&settings, store).unwrap();
        SpotifyClient::with_access_token(auth, &self.base_url, "access-token".to_string())
    }
}

impl Drop for FakeWebApi {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
