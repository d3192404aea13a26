use crate::{about::AMINOSCAN_DISPLAY_VERSION, error::AnnotationError};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

pub fn build_client(timeout: Duration) -> Result<Client, AnnotationError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("aminoscan/{AMINOSCAN_DISPLAY_VERSION}"))
        .build()
        .map_err(|e| AnnotationError::Configuration(format!("could not build HTTP client: {e}")))
}

/// Body of a successful response; anything else is an error message naming `what`.
pub fn success_text(response: Response, what: &str) -> Result<String, String> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| format!("could not read {what} response body: {e}"))?;
    if !status.is_success() {
        return Err(format!("{what} returned HTTP {status}: {}", body.trim()));
    }
    Ok(body)
}

pub fn describe_send_error(what: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{what} timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect to {what}: {err}")
    } else {
        format!("{what} request failed: {err}")
    }
}
