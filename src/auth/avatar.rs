//! The route for uploading the caller's avatar image.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, Multipart, State},
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{AppState, Error, UserId, auth::user::set_avatar_url, db::lock_connection, endpoints};

/// The image file extensions accepted for avatars.
const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// The state needed to store avatars.
#[derive(Debug, Clone)]
pub struct AvatarState {
    /// The database connection for updating the user record.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The directory uploaded files are written to.
    pub upload_dir: PathBuf,
}

impl FromRef<AppState> for AvatarState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            upload_dir: state.config.upload_dir.clone(),
        }
    }
}

/// The response to a successful avatar upload.
#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    /// Where the new avatar is served from.
    pub avatar_url: String,
}

/// Store the image in the multipart field "file" as the caller's avatar.
///
/// The file is written to `<upload_dir>/avatars/<user_id>.<ext>`, replacing
/// any earlier upload with the same extension.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] if the field is missing, empty or not
/// one of the accepted image types.
pub async fn upload_avatar(
    State(state): State<AvatarState>,
    Extension(user_id): Extension<UserId>,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, Error> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let extension = field
            .file_name()
            .and_then(|file_name| Path::new(file_name).extension())
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|extension| ALLOWED_EXTENSIONS.contains(&extension.as_str()))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "the avatar must be one of: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        let bytes = field
            .bytes()
            .await
            .map_err(|error| Error::MultipartError(error.to_string()))?;

        if bytes.is_empty() {
            return Err(Error::InvalidInput("the avatar file is empty".to_owned()));
        }

        let avatar_dir = state.upload_dir.join("avatars");
        tokio::fs::create_dir_all(&avatar_dir)
            .await
            .map_err(|error| Error::FileError(error.to_string()))?;

        let file_name = format!("{user_id}.{extension}");
        tokio::fs::write(avatar_dir.join(&file_name), &bytes)
            .await
            .map_err(|error| Error::FileError(error.to_string()))?;

        let avatar_url = format!("{}/avatars/{file_name}", endpoints::STATIC);

        {
            let connection = lock_connection(&state.db_connection)?;
            set_avatar_url(user_id, &avatar_url, &connection)?;
        }

        tracing::info!("Stored avatar for user {user_id} ({} bytes)", bytes.len());

        return Ok(Json(AvatarResponse { avatar_url }));
    }

    Err(Error::InvalidInput(
        "the form must have a \"file\" field".to_owned(),
    ))
}

#[cfg(test)]
mod avatar_tests {
    use axum::{Extension, Router, http::StatusCode, routing::post};
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use serde_json::Value;

    use crate::{
        auth::get_user_by_id,
        endpoints,
        test_utils::{create_test_user, get_test_app_state},
    };

    use super::{AvatarState, upload_avatar};

    fn get_test_server() -> (TestServer, AvatarState, crate::auth::User) {
        let app_state = get_test_app_state();
        let state = AvatarState {
            db_connection: app_state.db_connection.clone(),
            upload_dir: std::env::temp_dir()
                .join(format!("home_ledger_avatars_{}", uuid::Uuid::new_v4())),
        };
        let user = create_test_user(&state.db_connection.lock().unwrap(), "alice");
        let app = Router::new()
            .route(endpoints::ME_AVATAR, post(upload_avatar))
            .layer(Extension(user.id))
            .with_state(state.clone());

        (
            TestServer::try_new(app).expect("Could not create test server."),
            state,
            user,
        )
    }

    #[tokio::test]
    async fn upload_stores_file_and_sets_url() {
        let (server, state, user) = get_test_server();
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(vec![0x89, 0x50, 0x4e, 0x47])
                .file_name("me.PNG")
                .mime_type("image/png"),
        );

        let response = server.post(endpoints::ME_AVATAR).multipart(form).await;

        response.assert_status_ok();
        let want_url = format!("/static/avatars/{}.png", user.id);
        assert_eq!(response.json::<Value>()["avatar_url"], want_url);
        let stored = std::fs::read(
            state
                .upload_dir
                .join("avatars")
                .join(format!("{}.png", user.id)),
        )
        .unwrap();
        assert_eq!(stored, vec![0x89, 0x50, 0x4e, 0x47]);
        let got = get_user_by_id(user.id, &state.db_connection.lock().unwrap()).unwrap();
        assert_eq!(got.avatar_url, Some(want_url));

        std::fs::remove_dir_all(&state.upload_dir).unwrap();
    }

    #[tokio::test]
    async fn upload_rejects_unknown_extension() {
        let (server, _, _) = get_test_server();
        let form = MultipartForm::new()
            .add_part("file", Part::bytes(b"#!/bin/sh".to_vec()).file_name("me.sh"));

        server
            .post(endpoints::ME_AVATAR)
            .multipart(form)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let (server, _, _) = get_test_server();
        let form = MultipartForm::new().add_text("name", "me");

        server
            .post(endpoints::ME_AVATAR)
            .multipart(form)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
}
