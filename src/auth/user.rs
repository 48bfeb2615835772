//! Code for creating the user table and fetching users from the database.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, UserId, auth::PasswordHash};

/// A registered user of the application.
///
/// Users are never deleted, they only leave families.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserId,
    /// The unique name the user logs in with.
    pub username: String,
    /// The name shown to other family members.
    pub nickname: String,
    /// The user's password hash.
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    /// The user's phone number.
    pub phone: Option<String>,
    /// The user's email address.
    pub email: Option<String>,
    /// A free-text household role, e.g. "dad".
    pub role: Option<String>,
    /// Where the user's avatar image is served from.
    pub avatar_url: Option<String>,
    /// When the user registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data needed to register a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The unique name the user logs in with.
    pub username: String,
    /// The hash of the user's password.
    pub password_hash: PasswordHash,
    /// The user's phone number.
    pub phone: Option<String>,
    /// The user's email address.
    pub email: Option<String>,
    /// A free-text household role, e.g. "dad".
    pub role: Option<String>,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                nickname TEXT NOT NULL,
                password TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                role TEXT,
                avatar_url TEXT,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// The nickname starts out as the username.
///
/// # Errors
///
/// Returns a:
/// - [Error::InvalidInput] if the username is blank,
/// - [Error::Conflict] if the username is already taken,
/// - [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    let username = new_user.username.trim();

    if username.is_empty() {
        return Err(Error::InvalidInput("the username cannot be empty".to_owned()));
    }

    let user = User {
        id: UserId::new_random(),
        username: username.to_owned(),
        nickname: username.to_owned(),
        password_hash: new_user.password_hash,
        phone: new_user.phone,
        email: new_user.email,
        role: new_user.role,
        avatar_url: None,
        created_at: OffsetDateTime::now_utc(),
    };

    connection.execute(
        "INSERT INTO user (id, username, nickname, password, phone, email, role, avatar_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            user.id,
            user.username,
            user.nickname,
            user.password_hash.as_ref(),
            user.phone,
            user.email,
            user.role,
            user.avatar_url,
            user.created_at,
        ],
    )?;

    Ok(user)
}

const SELECT_USER: &str = "SELECT id, username, nickname, password, phone, email, role, avatar_url, created_at FROM user";

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        nickname: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        phone: row.get(4)?,
        email: row.get(5)?,
        role: row.get(6)?,
        avatar_url: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user,
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserId, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("{SELECT_USER} WHERE id = :id"))?
        .query_row(&[(":id", &user_id)], map_user_row)
        .optional()?
        .ok_or(Error::NotFound("user"))
}

/// Get the user with the given `username`, if one is registered.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn get_user_by_username(
    username: &str,
    connection: &Connection,
) -> Result<Option<User>, Error> {
    connection
        .prepare(&format!("{SELECT_USER} WHERE username = :username"))?
        .query_row(&[(":username", &username.trim())], map_user_row)
        .optional()
        .map_err(|error| error.into())
}

/// Save the profile fields (nickname, phone, email, role) of `user`.
///
/// # Errors
///
/// Returns a [Error::NotFound] if the user does not exist or a
/// [Error::SqlError] if some other SQL related error occurred.
pub fn update_user_profile(user: &User, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET nickname = ?1, phone = ?2, email = ?3, role = ?4 WHERE id = ?5",
        rusqlite::params![user.nickname, user.phone, user.email, user.role, user.id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("user"));
    }

    Ok(())
}

/// Replace the password hash of the user with `user_id`.
///
/// # Errors
///
/// Returns a [Error::NotFound] if the user does not exist or a
/// [Error::SqlError] if some other SQL related error occurred.
pub fn set_password_hash(
    user_id: UserId,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2",
        (password_hash.as_ref(), user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("user"));
    }

    Ok(())
}

/// Set where the avatar of the user with `user_id` is served from.
///
/// # Errors
///
/// Returns a [Error::NotFound] if the user does not exist or a
/// [Error::SqlError] if some other SQL related error occurred.
pub fn set_avatar_url(
    user_id: UserId,
    avatar_url: &str,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET avatar_url = ?1 WHERE id = ?2",
        (avatar_url, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("user"));
    }

    Ok(())
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::{
        Error, UserId,
        auth::{
            PasswordHash,
            user::{
                NewUser, create_user, get_user_by_id, get_user_by_username, set_avatar_url,
                set_password_hash, update_user_profile,
            },
        },
    };

    use super::create_user_table;

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_owned(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
            phone: None,
            email: None,
            role: Some("dad".to_owned()),
        }
    }

    #[test]
    fn insert_user_succeeds() {
        let db_connection = get_db_connection();

        let inserted_user = create_user(new_user("alice"), &db_connection).unwrap();

        assert_eq!(inserted_user.username, "alice");
        assert_eq!(inserted_user.nickname, "alice");
        assert_eq!(inserted_user.role.as_deref(), Some("dad"));
        assert_eq!(
            inserted_user.password_hash,
            PasswordHash::new_unchecked("hunter2")
        );
    }

    #[test]
    fn insert_user_fails_on_duplicate_username() {
        let db_connection = get_db_connection();
        create_user(new_user("alice"), &db_connection).unwrap();

        let result = create_user(new_user("alice"), &db_connection);

        assert!(matches!(result, Err(Error::Conflict(_))), "got {result:?}");
    }

    #[test]
    fn insert_user_fails_on_blank_username() {
        let db_connection = get_db_connection();

        let result = create_user(new_user("   "), &db_connection);

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let db_connection = get_db_connection();

        let result = get_user_by_id(UserId::new_random(), &db_connection);

        assert_eq!(result, Err(Error::NotFound("user")));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("alice"), &db_connection).unwrap();

        let retrieved_user = get_user_by_id(test_user.id, &db_connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn get_user_by_username_finds_user() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("alice"), &db_connection).unwrap();

        let retrieved_user = get_user_by_username("alice", &db_connection).unwrap();

        assert_eq!(retrieved_user, Some(test_user));
        assert_eq!(get_user_by_username("bob", &db_connection), Ok(None));
    }

    #[test]
    fn update_profile_persists_fields() {
        let db_connection = get_db_connection();
        let mut user = create_user(new_user("alice"), &db_connection).unwrap();
        user.nickname = "Ally".to_owned();
        user.phone = Some("555-1234".to_owned());
        user.role = None;

        update_user_profile(&user, &db_connection).unwrap();

        assert_eq!(get_user_by_id(user.id, &db_connection), Ok(user));
    }

    #[test]
    fn set_password_and_avatar() {
        let db_connection = get_db_connection();
        let user = create_user(new_user("alice"), &db_connection).unwrap();
        let new_hash = PasswordHash::new_unchecked("hunter3");

        set_password_hash(user.id, &new_hash, &db_connection).unwrap();
        set_avatar_url(user.id, "/static/avatars/a.png", &db_connection).unwrap();

        let got = get_user_by_id(user.id, &db_connection).unwrap();
        assert_eq!(got.password_hash, new_hash);
        assert_eq!(got.avatar_url.as_deref(), Some("/static/avatars/a.png"));
    }

    #[test]
    fn serialised_user_hides_password() {
        let db_connection = get_db_connection();
        let user = create_user(new_user("alice"), &db_connection).unwrap();

        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
