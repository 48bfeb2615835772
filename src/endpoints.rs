//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/tasks/{task_id}', use [format_endpoint].

use std::fmt::Display;

/// The route for checking that the server is up.
pub const HEALTH: &str = "/api/health";
/// The route for registering a new user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/auth/login";
/// The route for exchanging a valid token for a fresh one.
pub const REFRESH: &str = "/api/auth/refresh";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/auth/logout";
/// The route for the current user's profile.
pub const ME: &str = "/api/auth/me";
/// The route for changing the current user's password.
pub const ME_PASSWORD: &str = "/api/auth/me/password";
/// The route for uploading the current user's avatar.
pub const ME_AVATAR: &str = "/api/auth/me/avatar";
/// The route to access families.
pub const FAMILIES: &str = "/api/families";
/// The route to access a single family.
pub const FAMILY: &str = "/api/families/{family_id}";
/// The route for joining a family.
pub const FAMILY_JOIN: &str = "/api/families/{family_id}/join";
/// The route to access the members of a family.
pub const FAMILY_MEMBERS: &str = "/api/families/{family_id}/members";
/// The route to access a single member of a family.
pub const FAMILY_MEMBER: &str = "/api/families/{family_id}/members/{member_id}";
/// The route for a single member's balance.
pub const MEMBER_BALANCE: &str = "/api/families/{family_id}/members/{member_id}/balance";
/// The route for the balances of every member of a family.
pub const FAMILY_BALANCES: &str = "/api/families/{family_id}/balances";
/// The route to access transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route to access bounty tasks.
pub const TASKS: &str = "/api/tasks";
/// The route to access a single bounty task.
pub const TASK: &str = "/api/tasks/{task_id}";
/// The route to access services.
pub const SERVICES: &str = "/api/services";
/// The route to access a single service.
pub const SERVICE: &str = "/api/services/{service_id}";
/// The route for buying a service.
pub const SERVICE_PURCHASE: &str = "/api/services/{service_id}/purchase";
/// The route to access reward requests.
pub const REWARDS: &str = "/api/rewards";
/// The route to access a single reward request.
pub const REWARD: &str = "/api/rewards/{reward_id}";
/// The route for static files, i.e. uploaded avatars.
pub const STATIC: &str = "/static";

/// Replace the first parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace and ends with a
/// right brace. For example, in the endpoint path '/api/tasks/{task_id}',
/// '{task_id}' is the parameter. Call repeatedly to fill in paths with
/// several parameters.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: impl Display) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let Some(param_length) = endpoint_path[param_start..].find('}') else {
        return endpoint_path.to_owned();
    };

    let param_end = param_start + param_length + 1;

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

#[cfg(test)]
mod format_endpoint_tests {
    use super::{FAMILY_MEMBER, TASK, format_endpoint};

    #[test]
    fn replaces_parameter() {
        assert_eq!(format_endpoint(TASK, "abc"), "/api/tasks/abc");
    }

    #[test]
    fn replaces_parameters_one_at_a_time() {
        let path = format_endpoint(FAMILY_MEMBER, 1);
        let path = format_endpoint(&path, 2);

        assert_eq!(path, "/api/families/1/members/2");
    }

    #[test]
    fn returns_path_without_parameters_unchanged() {
        assert_eq!(format_endpoint("/api/health", 1), "/api/health");
    }

    #[test]
    fn returns_path_with_unclosed_parameter_unchanged() {
        assert_eq!(format_endpoint("/api/tasks/{task_id", 1), "/api/tasks/{task_id");
    }
}
