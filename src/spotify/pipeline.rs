use std::future::Future;

use error_stack::Report;
use serde::Deserialize;
use tracing::debug;

use crate::spotify::{ApiError, SpotifyError, SpotifyResult};

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorDetail,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ErrorDetail {
    Api { message: String },
    Code(String),
}

pub fn validate_endpoint(endpoint: &str) -> SpotifyResult<()> {
    if !endpoint.starts_with('/') {
        return Err(Report::new(SpotifyError).attach_printable(format!(
            "Endpoint must start with a forward slash: {}",
            endpoint
        )));
    }
    Ok(())
}

/// Runs one API call: validate the endpoint, execute, and when the access token is
/// rejected refresh it once and retry once. A second rejection is returned as an error.
///
/// Returns `Ok(None)` for 404 and the response body for any 2xx status.
pub async fn run_pipeline<E, EFut, R, RFut>(
    endpoint: &str,
    mut execute: E,
    refresh: R,
) -> SpotifyResult<Option<String>>
where
    E: FnMut() -> EFut,
    EFut: Future<Output = SpotifyResult<RawResponse>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = SpotifyResult<()>>,
{
    validate_endpoint(endpoint)?;
    let mut response = execute().await?;
    if response.status == 401 {
        debug!(endpoint, "access token rejected, refreshing");
        refresh().await?;
        response = execute().await?;
    }
    interpret(response)
}

fn interpret(response: RawResponse) -> SpotifyResult<Option<String>> {
    match response.status {
        200..=299 => Ok(Some(response.body)),
        404 => Ok(None),
        status => Err(Report::new(ApiError {
            status,
            message: error_message(&response.body),
        })
        .change_context(SpotifyError)),
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail::Api { message },
            ..
        }) => message,
        Ok(ErrorEnvelope {
            error: ErrorDetail::Code(code),
            error_description,
        }) => error_description.unwrap_or(code),
        Err(_) if body.trim().is_empty() => "no message".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
