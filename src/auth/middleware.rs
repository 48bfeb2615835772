//! Authentication middleware that validates bearer tokens and resolves the caller.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use rusqlite::Connection;
use time::Duration;

use crate::{
    AppState, Error,
    auth::{TokenKeys, decode_token, get_user_by_id},
    db::lock_connection,
};

/// The state needed for the auth middleware and the auth routes.
#[derive(Clone)]
pub struct AuthState {
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The keys for signing and verifying access tokens.
    pub token_keys: TokenKeys,
    /// How long newly issued access tokens are valid for.
    pub token_duration: Duration,
    /// The bcrypt cost used when hashing new passwords.
    pub password_hash_cost: u32,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            token_keys: state.token_keys.clone(),
            token_duration: state.config.token_duration,
            password_hash_cost: state.config.password_hash_cost,
        }
    }
}

/// Middleware function that checks for a valid bearer token.
///
/// The user ID is placed into the request and the request executed normally
/// if the token is valid and belongs to a registered user, otherwise a 401
/// response is returned.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserId>` to receive the user ID.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let bearer = match TypedHeader::<Authorization<Bearer>>::from_request_parts(&mut parts, &state)
        .await
    {
        Ok(TypedHeader(Authorization(bearer))) => bearer,
        Err(error) => {
            tracing::debug!("Missing or malformed authorization header: {error}");
            return Error::Unauthenticated.into_response();
        }
    };

    let claims = match decode_token(bearer.token(), &state.token_keys) {
        Ok(claims) => claims,
        Err(error) => return error.into_response(),
    };

    let user_exists = match lock_connection(&state.db_connection) {
        Ok(connection) => match get_user_by_id(claims.sub, &connection) {
            Ok(_) => true,
            Err(Error::NotFound(_)) => false,
            Err(error) => return error.into_response(),
        },
        Err(error) => return error.into_response(),
    };

    if !user_exists {
        tracing::warn!("Valid token for unknown user {}", claims.sub);
        return Error::Unauthenticated.into_response();
    }

    parts.extensions.insert(claims.sub);
    let request = Request::from_parts(parts, body);

    next.run(request).await
}
