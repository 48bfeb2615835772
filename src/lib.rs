//! HomeLedger is a household ledger backend.
//!
//! Families share an internal balance ledger, post bounty tasks, offer paid
//! services to each other and request rewards. This library provides the JSON
//! REST API for all of that, backed by a single SQLite database.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
pub mod auth;
mod config;
mod database_id;
mod db;
mod endpoints;
pub mod family;
pub mod ledger;
mod logging;
mod money;
mod pagination;
mod patch;
pub mod reward;
mod routing;
pub mod service;
pub mod task;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use config::AppConfig;
pub use database_id::{FamilyId, MemberId, ReferenceId, RewardId, ServiceId, TaskId, TransactionId, UserId};
pub use db::initialize as initialize_db;
pub use ledger::LedgerPolicy;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use money::Money;
pub use pagination::PaginationConfig;
pub use patch::Patch;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource does not exist.
    ///
    /// The string names the kind of resource, e.g. "family" or "task", so the
    /// client can tell which of the IDs in its request was wrong.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller is authenticated but lacks the membership, role or
    /// ownership needed for the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The request clashes with existing data, e.g. a duplicate username or
    /// a duplicate family membership.
    #[error("{0}")]
    Conflict(String),

    /// A ledger debit exceeds the payer's current balance.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// The bearer token is missing, invalid or expired, or the credentials
    /// given at log-in were wrong.
    #[error("could not validate credentials")]
    Unauthenticated,

    /// The request was well-formed JSON but its values are not acceptable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// An access token could not be created.
    #[error("could not create access token: {0}")]
    TokenError(String),

    /// The multipart form could not be parsed.
    #[error("could not parse multipart form: {0}")]
    MultipartError(String),

    /// An uploaded file could not be written to disk.
    #[error("could not store file: {0}")]
    FileError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("user.username") =>
            {
                Error::Conflict("the username is already taken".to_owned())
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("family_member.") =>
            {
                Error::Conflict("the user is already a member of this family".to_owned())
            }
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 787 =>
            {
                Error::Conflict(
                    "the record refers to a missing record or is still referenced".to_owned(),
                )
            }
            // Code 275 occurs when a CHECK constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(desc))
                if sql_error.extended_code == 275 =>
            {
                Error::InvalidInput(desc)
            }
            // Code 1811 occurs when a trigger raised an abort.
            rusqlite::Error::SqliteFailure(sql_error, Some(desc))
                if sql_error.extended_code == 1811 =>
            {
                Error::Conflict(desc)
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("record"),
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) | Error::InsufficientBalance | Error::MultipartError(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::HashingError(_)
            | Error::TokenError(_)
            | Error::FileError(_)
            | Error::SqlError(_)
            | Error::DatabaseLockError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal details are for the server logs only.
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use rusqlite::Connection;

    use crate::Error;

    #[test]
    fn unique_username_violation_becomes_conflict() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute("CREATE TABLE user (username TEXT NOT NULL UNIQUE)", ())
            .unwrap();
        connection
            .execute("INSERT INTO user (username) VALUES ('alice')", ())
            .unwrap();

        let error: Error = connection
            .execute("INSERT INTO user (username) VALUES ('alice')", ())
            .unwrap_err()
            .into();

        assert!(matches!(error, Error::Conflict(_)), "got {error:?}");
    }

    #[test]
    fn no_rows_becomes_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound("record"));
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (Error::NotFound("task"), StatusCode::NOT_FOUND),
            (Error::Forbidden("no".to_owned()), StatusCode::FORBIDDEN),
            (Error::Conflict("dupe".to_owned()), StatusCode::BAD_REQUEST),
            (Error::InsufficientBalance, StatusCode::BAD_REQUEST),
            (Error::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                Error::InvalidInput("bad".to_owned()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (Error::DatabaseLockError, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, want_status) in cases {
            let description = format!("{error:?}");
            let response = error.into_response();
            assert_eq!(response.status(), want_status, "for {description}");
        }
    }

    #[test]
    fn unauthenticated_sets_www_authenticate() {
        let response = Error::Unauthenticated.into_response();

        assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");
    }
}
