//! Reads response bodies from the remote service.

use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Collects the body of a successful response chunk by chunk.
pub async fn read_body(response: Response) -> Result<Vec<u8>, reqwest::Error> {
    let capacity = response.content_length().unwrap_or(0) as usize;
    let mut body = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }

    Ok(body)
}

/// Splits a response into its body on success, or its status and the
/// service's error message otherwise.
pub async fn check_status(response: Response) -> Result<Response, (StatusCode, String)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err((status, error_message(&text)))
}

/// Google APIs wrap failures as `{"error": {"message": ...}}`; anything else
/// is passed through.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

// -- Tests -------------------------------------------------------------------
