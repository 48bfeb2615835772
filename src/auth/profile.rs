//! The routes for reading and editing the caller's own profile and password.

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    Error, Patch, UserId,
    auth::{
        AuthState, PasswordHash, User, get_user_by_id,
        user::{set_password_hash, update_user_profile},
    },
    db::lock_connection,
};

/// The profile fields a user may change.
///
/// A field that is left out keeps its value, an explicit `null` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    /// The name shown to other family members, cannot be cleared.
    #[serde(default)]
    pub nickname: Patch<String>,
    /// The user's phone number.
    #[serde(default)]
    pub phone: Patch<String>,
    /// The user's email address.
    #[serde(default)]
    pub email: Patch<String>,
    /// A free-text household role.
    #[serde(default)]
    pub role: Patch<String>,
}

impl ProfileUpdate {
    fn apply_to(self, user: &mut User) -> Result<(), Error> {
        self.nickname.apply_to_required(&mut user.nickname, "nickname")?;
        self.phone.apply_to(&mut user.phone);
        self.email.apply_to(&mut user.email);
        self.role.apply_to(&mut user.role);

        if user.nickname.trim().is_empty() {
            return Err(Error::InvalidInput("the nickname cannot be empty".to_owned()));
        }

        Ok(())
    }
}

/// The body for changing a password.
#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    /// The user's current password.
    pub old_password: String,
    /// The password to switch to.
    pub new_password: String,
}

/// Get the caller's profile.
pub async fn get_me(
    State(state): State<AuthState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<User>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_user_by_id(user_id, &connection).map(Json)
}

/// Update the caller's profile and return the result.
pub async fn put_me(
    State(state): State<AuthState>,
    Extension(user_id): Extension<UserId>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let mut user = get_user_by_id(user_id, &connection)?;

    update.apply_to(&mut user)?;
    update_user_profile(&user, &connection)?;

    Ok(Json(user))
}

/// Change the caller's password after checking their current one.
///
/// # Errors
///
/// Returns [Error::Unauthenticated] if `old_password` is wrong.
pub async fn put_password(
    State(state): State<AuthState>,
    Extension(user_id): Extension<UserId>,
    Json(change): Json<PasswordChange>,
) -> Result<Json<Value>, Error> {
    let user = {
        let connection = lock_connection(&state.db_connection)?;
        get_user_by_id(user_id, &connection)?
    };

    let is_password_valid = user
        .password_hash
        .verify(&change.old_password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    if !is_password_valid {
        return Err(Error::Unauthenticated);
    }

    let password_hash = PasswordHash::new(&change.new_password, state.password_hash_cost)?;

    let connection = lock_connection(&state.db_connection)?;
    set_password_hash(user_id, &password_hash, &connection)?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

#[cfg(test)]
mod profile_tests {
    use axum::{Extension, Router, http::StatusCode, routing::get, routing::put};
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        auth::{AuthState, User, get_user_by_id},
        endpoints,
        test_utils::{TEST_PASSWORD, create_test_user, get_test_auth_state},
    };

    use super::{get_me, put_me, put_password};

    fn get_test_server() -> (TestServer, AuthState, User) {
        let state = get_test_auth_state();
        let user = create_test_user(&state.db_connection.lock().unwrap(), "alice");
        let app = Router::new()
            .route(endpoints::ME, get(get_me).put(put_me))
            .route(endpoints::ME_PASSWORD, put(put_password))
            .layer(Extension(user.id))
            .with_state(state.clone());

        (
            TestServer::try_new(app).expect("Could not create test server."),
            state,
            user,
        )
    }

    #[tokio::test]
    async fn get_me_returns_profile_without_password() {
        let (server, _, user) = get_test_server();

        let response = server.get(endpoints::ME).await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["id"], user.id.to_string());
        assert_eq!(body["username"], "alice");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn put_me_distinguishes_missing_and_null() {
        let (server, state, user) = get_test_server();
        server
            .put(endpoints::ME)
            .json(&json!({ "phone": "555-1234", "email": "a@example.com" }))
            .await
            .assert_status_ok();

        let response = server
            .put(endpoints::ME)
            .json(&json!({ "nickname": "Ally", "phone": null }))
            .await;

        response.assert_status_ok();
        let got = get_user_by_id(user.id, &state.db_connection.lock().unwrap()).unwrap();
        assert_eq!(got.nickname, "Ally");
        assert_eq!(got.phone, None);
        assert_eq!(got.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn put_me_cannot_clear_nickname() {
        let (server, _, _) = get_test_server();

        server
            .put(endpoints::ME)
            .json(&json!({ "nickname": null }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn change_password_with_correct_old_password() {
        let (server, state, user) = get_test_server();

        server
            .put(endpoints::ME_PASSWORD)
            .json(&json!({ "old_password": TEST_PASSWORD, "new_password": "pw2" }))
            .await
            .assert_status_ok();

        let got = get_user_by_id(user.id, &state.db_connection.lock().unwrap()).unwrap();
        assert!(got.password_hash.verify("pw2").unwrap());
    }

    #[tokio::test]
    async fn change_password_with_wrong_old_password() {
        let (server, state, user) = get_test_server();

        server
            .put(endpoints::ME_PASSWORD)
            .json(&json!({ "old_password": "nope", "new_password": "pw2" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let got = get_user_by_id(user.id, &state.db_connection.lock().unwrap()).unwrap();
        assert!(got.password_hash.verify(TEST_PASSWORD).unwrap());
    }
}
