#![allow(missing_docs)]

//! Shared fixtures for unit and route tests.

use std::sync::MutexGuard;

use axum_test::{TestRequest, TestServer};
use rusqlite::Connection;

use crate::{
    AppConfig, AppState, UserId,
    auth::{AuthState, NewUser, PasswordHash, User, create_user, encode_token},
    build_router,
    db::initialize,
    family::{Family, FamilyMember, create_family},
};

/// The password every test user is created with.
pub(crate) const TEST_PASSWORD: &str = "hunter2";

/// The lowest cost bcrypt accepts, so tests do not spend their time hashing.
const TEST_HASH_COST: u32 = 4;

pub(crate) fn get_test_connection() -> Connection {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    initialize(&connection).expect("Could not initialize database");
    connection
}

pub(crate) fn get_test_app_state() -> AppState {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    let config = AppConfig {
        password_hash_cost: TEST_HASH_COST,
        ..AppConfig::new("test secret")
    };

    AppState::new(connection, config).expect("Could not create app state")
}

pub(crate) fn get_test_auth_state() -> AuthState {
    axum::extract::FromRef::from_ref(&get_test_app_state())
}

#[track_caller]
pub(crate) fn create_test_user(connection: &Connection, username: &str) -> User {
    create_user(
        NewUser {
            username: username.to_owned(),
            password_hash: PasswordHash::new(TEST_PASSWORD, TEST_HASH_COST)
                .expect("Could not hash test password"),
            phone: None,
            email: None,
            role: None,
        },
        connection,
    )
    .expect("Could not create test user")
}

#[track_caller]
pub(crate) fn create_test_family(
    connection: &Connection,
    creator: UserId,
) -> (Family, FamilyMember) {
    create_family("Test Family", None, creator, connection).expect("Could not create test family")
}

/// A registered user with a valid access token.
#[derive(Debug, Clone)]
pub(crate) struct TestUser {
    pub id: UserId,
    pub token: String,
}

/// The full router over an in-memory database.
pub(crate) struct TestApp {
    pub state: AppState,
    pub server: TestServer,
}

impl TestApp {
    pub fn new() -> Self {
        let state = get_test_app_state();
        let server =
            TestServer::try_new(build_router(state.clone())).expect("Could not create test server.");

        Self { state, server }
    }

    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.state
            .db_connection
            .lock()
            .expect("Could not lock database")
    }

    #[track_caller]
    pub fn user(&self, username: &str) -> TestUser {
        let user = create_test_user(&self.connection(), username);
        let token = encode_token(user.id, self.state.config.token_duration, &self.state.token_keys)
            .expect("Could not create test token");

        TestUser {
            id: user.id,
            token: token.access_token,
        }
    }

    pub fn get(&self, path: &str, user: &TestUser) -> TestRequest {
        self.server.get(path).authorization_bearer(&user.token)
    }

    pub fn post(&self, path: &str, user: &TestUser) -> TestRequest {
        self.server.post(path).authorization_bearer(&user.token)
    }

    pub fn put(&self, path: &str, user: &TestUser) -> TestRequest {
        self.server.put(path).authorization_bearer(&user.token)
    }

    pub fn delete(&self, path: &str, user: &TestUser) -> TestRequest {
        self.server.delete(path).authorization_bearer(&user.token)
    }
}

