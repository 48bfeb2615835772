//! User accounts, password hashing and bearer-token authentication.

mod avatar;
mod log_in;
mod middleware;
mod password;
mod profile;
mod register;
mod token;
mod user;

pub use avatar::{AvatarState, upload_avatar};
pub use log_in::{post_log_in, post_log_out, post_refresh};
pub use middleware::{AuthState, auth_guard};
pub use password::PasswordHash;
pub use profile::{get_me, put_me, put_password};
pub use register::register_user;
pub use token::{Claims, TokenKeys, TokenResponse, decode_token, encode_token};
pub use user::{
    NewUser, User, create_user, create_user_table, get_user_by_id, get_user_by_username,
    set_password_hash,
};
