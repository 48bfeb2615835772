//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    extract::FromRef,
    middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use crate::{
    AppState, Error,
    auth::{
        AuthState, auth_guard, get_me, post_log_in, post_log_out, post_refresh, put_me,
        put_password, register_user, upload_avatar,
    },
    endpoints,
    family::{
        add_member_endpoint, create_family_endpoint, delete_family_endpoint, get_family_endpoint,
        join_family_endpoint, list_families_endpoint, list_members_endpoint,
        remove_member_endpoint, update_family_endpoint, update_member_endpoint,
    },
    ledger::{
        create_transaction_endpoint, get_member_balance_endpoint, get_transaction_endpoint,
        list_family_balances_endpoint, list_transactions_endpoint,
    },
    reward::{
        create_reward_endpoint, get_reward_endpoint, list_rewards_endpoint, update_reward_endpoint,
    },
    service::{
        create_service_endpoint, delete_service_endpoint, get_service_endpoint,
        list_services_endpoint, purchase_service_endpoint, update_service_endpoint,
    },
    task::{
        create_task_endpoint, delete_task_endpoint, get_task_endpoint, list_tasks_endpoint,
        update_task_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in));

    let protected_routes = Router::new()
        .route(endpoints::REFRESH, post(post_refresh))
        .route(endpoints::LOG_OUT, post(post_log_out))
        .route(endpoints::ME, get(get_me).put(put_me))
        .route(endpoints::ME_PASSWORD, put(put_password))
        .route(endpoints::ME_AVATAR, post(upload_avatar))
        .route(
            endpoints::FAMILIES,
            get(list_families_endpoint).post(create_family_endpoint),
        )
        .route(
            endpoints::FAMILY,
            get(get_family_endpoint)
                .put(update_family_endpoint)
                .delete(delete_family_endpoint),
        )
        .route(endpoints::FAMILY_JOIN, post(join_family_endpoint))
        .route(
            endpoints::FAMILY_MEMBERS,
            get(list_members_endpoint).post(add_member_endpoint),
        )
        .route(
            endpoints::FAMILY_MEMBER,
            put(update_member_endpoint).delete(remove_member_endpoint),
        )
        .route(endpoints::MEMBER_BALANCE, get(get_member_balance_endpoint))
        .route(endpoints::FAMILY_BALANCES, get(list_family_balances_endpoint))
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(endpoints::TRANSACTION, get(get_transaction_endpoint))
        .route(
            endpoints::TASKS,
            get(list_tasks_endpoint).post(create_task_endpoint),
        )
        .route(
            endpoints::TASK,
            get(get_task_endpoint)
                .put(update_task_endpoint)
                .delete(delete_task_endpoint),
        )
        .route(
            endpoints::SERVICES,
            get(list_services_endpoint).post(create_service_endpoint),
        )
        .route(
            endpoints::SERVICE,
            get(get_service_endpoint)
                .put(update_service_endpoint)
                .delete(delete_service_endpoint),
        )
        .route(endpoints::SERVICE_PURCHASE, post(purchase_service_endpoint))
        .route(
            endpoints::REWARDS,
            get(list_rewards_endpoint).post(create_reward_endpoint),
        )
        .route(
            endpoints::REWARD,
            get(get_reward_endpoint).put(update_reward_endpoint),
        )
        .route_layer(middleware::from_fn_with_state(
            AuthState::from_ref(&state),
            auth_guard,
        ));

    protected_routes
        .merge(unprotected_routes)
        .nest_service(endpoints::STATIC, ServeDir::new(&state.config.upload_dir))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// Report that the server is up.
async fn get_health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn get_404_not_found() -> Error {
    Error::NotFound("route")
}
