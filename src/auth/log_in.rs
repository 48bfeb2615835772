//! The routes for logging in, refreshing a token and logging out.

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    Error, UserId,
    auth::{AuthState, TokenResponse, encode_token, get_user_by_id, get_user_by_username},
    db::lock_connection,
};

/// The credentials for logging in.
///
/// Either `username` and `password`, or a third-party `code`.
#[derive(Debug, Default, Deserialize)]
pub struct LogInData {
    /// The name the user registered with.
    pub username: Option<String>,
    /// The user's password.
    pub password: Option<String>,
    /// A login code issued by a third-party identity provider.
    pub code: Option<String>,
}

/// Handler for log-in requests.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - Only a `code` was given, no code login provider is configured.
/// - The username or password is missing.
/// - The username does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password.
pub async fn post_log_in(
    State(state): State<AuthState>,
    Json(data): Json<LogInData>,
) -> Result<Json<TokenResponse>, Error> {
    let (username, password) = match (data.username, data.password, data.code) {
        (Some(username), Some(password), _) => (username, password),
        (None, None, Some(_)) => {
            tracing::warn!("Rejected code login, no identity provider is configured");
            return Err(Error::Unauthenticated);
        }
        _ => {
            return Err(Error::InvalidInput(
                "a username and password are required".to_owned(),
            ));
        }
    };

    let user = {
        let connection = lock_connection(&state.db_connection)?;
        get_user_by_username(&username, &connection)?
    };

    let Some(user) = user else {
        tracing::debug!("Log-in attempt for unknown user {username}");
        return Err(Error::Unauthenticated);
    };

    let is_password_valid = user.password_hash.verify(&password).map_err(|error| {
        tracing::error!("Error verifying password: {error}");
        Error::HashingError(error.to_string())
    })?;

    if !is_password_valid {
        return Err(Error::Unauthenticated);
    }

    encode_token(user.id, state.token_duration, &state.token_keys).map(Json)
}

/// Issue a fresh token for the caller.
pub async fn post_refresh(
    State(state): State<AuthState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<TokenResponse>, Error> {
    {
        let connection = lock_connection(&state.db_connection)?;
        get_user_by_id(user_id, &connection)?;
    }

    encode_token(user_id, state.token_duration, &state.token_keys).map(Json)
}

/// Log out the caller.
///
/// Tokens are stateless, so the client discards its token and nothing is
/// revoked on the server.
pub async fn post_log_out(Extension(user_id): Extension<UserId>) -> Json<Value> {
    tracing::debug!("User {user_id} logged out");

    Json(json!({ "message": "Successfully logged out" }))
}
