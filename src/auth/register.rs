//! The route handler for registering a new user.

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    Error,
    auth::{
        AuthState, PasswordHash, TokenResponse, encode_token,
        user::{NewUser, create_user},
    },
    db::lock_connection,
};

/// The data for registering a new user.
#[derive(Debug, Deserialize)]
pub struct RegisterData {
    /// The name the user will log in with.
    pub username: String,
    /// The user's password.
    pub password: String,
    /// The user's phone number.
    pub phone: Option<String>,
    /// The user's email address.
    pub email: Option<String>,
    /// A free-text household role, e.g. "mum".
    pub role: Option<String>,
}

/// Register a new user and log them in.
///
/// # Errors
///
/// Returns a [Error::Conflict] if the username is taken, or an
/// [Error::InvalidInput] if the username or password is empty.
pub async fn register_user(
    State(state): State<AuthState>,
    Json(data): Json<RegisterData>,
) -> Result<Json<TokenResponse>, Error> {
    let password_hash = PasswordHash::new(&data.password, state.password_hash_cost)?;

    let user = {
        let connection = lock_connection(&state.db_connection)?;
        create_user(
            NewUser {
                username: data.username,
                password_hash,
                phone: data.phone,
                email: data.email,
                role: data.role,
            },
            &connection,
        )?
    };

    tracing::info!("Registered user {} ({})", user.username, user.id);

    encode_token(user.id, state.token_duration, &state.token_keys).map(Json)
}
