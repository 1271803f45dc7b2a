use std::fmt;

use async_trait::async_trait;
use error_stack::{IntoReport, ResultExt};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct CoverError;

impl fmt::Display for CoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cover art error")
    }
}

impl std::error::Error for CoverError {}

pub type CoverResult<T> = error_stack::Result<T, CoverError>;

/// Spotify refuses cover uploads above 256 KB of base64, roughly 192 KB of JPEG.
pub const MAX_COVER_BYTES: usize = 192 * 1024;

/// Produces the JPEG used as a collection playlist's cover.
#[async_trait]
pub trait CoverArt: Send + Sync {
    /// `None` means the collection keeps Spotify's generated mosaic. The key and mode
    /// labels are there for implementations that draw them onto the image.
    async fn generate_cover(
        &self,
        source_cover_url: Option<&str>,
        key_label: &str,
        mode_label: &str,
    ) -> CoverResult<Option<Vec<u8>>>;
}

/// Reuses the source playlist's own cover image unchanged; the key and mode labels
/// are ignored.
pub struct SourceCoverArt {
    http: reqwest::Client,
}

impl SourceCoverArt {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for SourceCoverArt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverArt for SourceCoverArt {
    async fn generate_cover(
        &self,
        source_cover_url: Option<&str>,
        _key_label: &str,
        _mode_label: &str,
    ) -> CoverResult<Option<Vec<u8>>> {
        let Some(url) = source_cover_url else {
            return Ok(None);
        };
        debug!(url, "downloading source cover");
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .into_report()
            .change_context(CoverError)?
            .error_for_status()
            .into_report()
            .change_context(CoverError)
            .attach_printable(format!("Failed to download cover from {}", url))?
            .bytes()
            .await
            .into_report()
            .change_context(CoverError)?;
        Ok(usable_cover(bytes.to_vec()))
    }
}

fn usable_cover(bytes: Vec<u8>) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.len() > MAX_COVER_BYTES {
        warn!(size = bytes.len(), "source cover too large to upload");
        return None;
    }
    Some(bytes)
}
