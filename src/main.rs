use std::fmt;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::{IntoReport, Report, ResultExt};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::collection::commands::CollectCommand;
use crate::config::Settings;
use crate::dialoguer::Dialoguer;
use crate::music::{Key, Mode};
use crate::spotify::auth::{FileCredentialStore, SpotifyAuth};

mod cache;
mod collection;
mod config;
mod cover;
mod dialoguer;
mod music;
mod setup;
mod spotify;

#[derive(Debug)]
pub struct KeyWizardError;
impl fmt::Display for KeyWizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key Wizard error")
    }
}
impl std::error::Error for KeyWizardError {}

pub type KeyWizardResult<T> = error_stack::Result<T, KeyWizardError>;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Key Wizard: Spotify playlists sorted by key and tempo")]
struct Cli {
    #[command(subcommand)]
    command: KeyWizardCommands,
}

#[derive(Subcommand, Debug, PartialEq, Clone)]
enum KeyWizardCommands {
    /// Creates the data folder, the cache and the playlist list, then authorizes Spotify
    Setup,
    /// Authorizes Spotify again and stores the new credentials
    Auth,
    /// Rebuilds the key/mode collections of the listed playlists
    Collect {
        /// Key to collect, as a label (C, C#, ..., B) or a pitch class (0-11)
        #[clap(long, short)]
        key: Option<Key>,
        /// Mode to collect (major or minor)
        #[clap(long, short)]
        mode: Option<Mode>,
        /// Collect from every listed playlist without asking
        #[clap(long, short, action)]
        all: bool,
    },
    /// Prints the current configuration
    Config,
}

impl KeyWizardCommands {
    pub async fn execute(&self) -> KeyWizardResult<()> {
        let settings = Settings::from_env().change_context(KeyWizardError)?;
        match self {
            KeyWizardCommands::Setup => {
                if setup::is_complete(&settings) {
                    let prompt_text = "Setup is already complete. Run it again?".to_string();
                    if !Dialoguer::select_yes_or_no(prompt_text).change_context(KeyWizardError)? {
                        return Ok(());
                    }
                }
                setup::run_setup(&settings)
                    .await
                    .change_context(KeyWizardError)
            }
            KeyWizardCommands::Auth => {
                let store = Arc::new(FileCredentialStore::new(settings.credentials_path()));
                SpotifyAuth::new(&settings, store)
                    .change_context(KeyWizardError)?
                    .authorize()
                    .await
                    .change_context(KeyWizardError)
            }
            KeyWizardCommands::Collect { key, mode, all } => {
                if !setup::is_complete(&settings) {
                    return setup::run_setup(&settings)
                        .await
                        .change_context(KeyWizardError);
                }
                let command = CollectCommand {
                    key: *key,
                    mode: *mode,
                    all: *all,
                };
                command
                    .execute(&settings)
                    .await
                    .change_context(KeyWizardError)
            }
            KeyWizardCommands::Config => {
                println!("{}", "Current config:".cyan());
                println!("  client id:      {}", settings.client_id);
                println!("  redirect uri:   {}", settings.redirect_uri);
                println!("  data dir:       {}", settings.data_dir.display());
                println!("  cache:          {}", settings.db_path().display());
                println!("  playlist ids:   {}", settings.playlist_ids_path().display());
                println!("  credentials:    {}", settings.credentials_path().display());
                let status = if setup::is_complete(&settings) {
                    "complete".green()
                } else {
                    "incomplete, run `key-wizard setup`".yellow()
                };
                println!("  setup:          {}", status);
                Ok(())
            }
        }
    }
}

pub struct Suggestion(String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}

fn init_tracing() -> KeyWizardResult<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("KEY_WIZARD_LOG")
                .from_env_lossy(),
        )
        .try_init()
        .into_report()
        .change_context(KeyWizardError)
}

async fn run() -> KeyWizardResult<()> {
    let cli = Cli::parse();

    Suggestion::set_report();
    init_tracing()?;

    cli.command.execute().await
}

#[tokio::main]
async fn main() -> KeyWizardResult<()> {
    run().await
}
