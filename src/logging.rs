//! Middleware for logging requests and responses.

use axum::{
    extract::Request,
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::Error;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If the response body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and logged at the `debug` level.
///
/// Any JSON field whose name contains "password" is redacted before logging.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (headers, body_bytes) = match extract_request(request).await {
        Ok(parts) => parts,
        Err(error) => return error.into_response(),
    };

    let is_json = headers
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    let is_multipart = headers
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/"));

    if is_json {
        log_request(&headers, &redact_passwords(&body_bytes));
    } else if is_multipart {
        log_request(&headers, &format!("<{} bytes of multipart data>", body_bytes.len()));
    } else {
        log_request(&headers, &String::from_utf8_lossy(&body_bytes));
    }

    let request = Request::from_parts(headers, body_bytes.into());
    let response = next.run(request).await;

    let (headers, body) = response.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return Error::FileError(error.to_string()).into_response();
        }
    };
    log_response(&headers, &String::from_utf8_lossy(&body_bytes));

    Response::from_parts(headers, body_bytes.into())
}

async fn extract_request(
    request: Request,
) -> Result<(axum::http::request::Parts, axum::body::Bytes), Error> {
    let (headers, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|error| Error::InvalidInput(format!("could not read request body: {error}")))?;

    Ok((headers, body_bytes))
}

/// Replace the value of every object field with "password" in its name.
///
/// Bodies that are not valid JSON are returned as lossy UTF-8 text.
fn redact_passwords(body: &[u8]) -> String {
    let mut value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return String::from_utf8_lossy(body).to_string(),
    };

    redact_value(&mut value);

    value.to_string()
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if key.contains("password") {
                    *field = Value::String("********".to_owned());
                } else {
                    redact_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// The number of bytes of a body to log at the info level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Cut `body` to at most [LOG_BODY_LENGTH_LIMIT] bytes on a character boundary.
fn truncate(body: &str) -> Option<&str> {
    if body.len() <= LOG_BODY_LENGTH_LIMIT {
        return None;
    }

    let end = body
        .char_indices()
        .map(|(index, _)| index)
        .take_while(|index| *index <= LOG_BODY_LENGTH_LIMIT)
        .last()
        .unwrap_or(0);

    Some(&body[..end])
}

fn log_request(headers: &axum::http::request::Parts, body: &str) {
    if let Some(truncated) = truncate(body) {
        tracing::info!("Received request: {headers:#?}\nbody: {truncated}...");
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {headers:#?}\nbody: {body:?}");
    }
}

fn log_response(headers: &axum::http::response::Parts, body: &str) {
    if let Some(truncated) = truncate(body) {
        tracing::info!("Sending response: {headers:#?}\nbody: {truncated}...");
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {headers:#?}\nbody: {body:?}");
    }
}
