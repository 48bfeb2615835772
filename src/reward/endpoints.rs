//! The route handlers for reward requests.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error, LedgerPolicy, RewardId, UserId,
    db::lock_connection,
    family::gate::{require_member, resolve_scope},
    pagination::{ListQuery, PaginationConfig},
    reward::{
        NewReward, Reward, RewardUpdate,
        core::{create_reward, get_reward, list_rewards, update_reward_status},
    },
};

/// The state needed for the reward routes.
#[derive(Debug, Clone)]
pub struct RewardState {
    /// The database connection for managing rewards.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The defaults and limits for listing rewards.
    pub pagination: PaginationConfig,
    /// Whether approving a reward credits the applicant through the ledger.
    pub ledger_policy: LedgerPolicy,
}

impl FromRef<AppState> for RewardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination: state.config.pagination.clone(),
            ledger_policy: state.config.ledger_policy,
        }
    }
}

/// List rewards, either of one family or those the caller applied for.
pub async fn list_rewards_endpoint(
    State(state): State<RewardState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Reward>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let scope = resolve_scope(user_id, query.family_id, &connection)?;

    list_rewards(scope, query.paging(&state.pagination), &connection).map(Json)
}

/// Request a reward.
pub async fn create_reward_endpoint(
    State(state): State<RewardState>,
    Extension(user_id): Extension<UserId>,
    Json(new_reward): Json<NewReward>,
) -> Result<Json<Reward>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    create_reward(new_reward, user_id, &connection).map(Json)
}

/// Get a reward from a family the caller belongs to.
pub async fn get_reward_endpoint(
    State(state): State<RewardState>,
    Extension(user_id): Extension<UserId>,
    Path(reward_id): Path<RewardId>,
) -> Result<Json<Reward>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let reward = get_reward(reward_id, &connection)?;
    require_member(user_id, reward.family_id, &connection)?;

    Ok(Json(reward))
}

/// Approve or reject a reward. Family admins only.
pub async fn update_reward_endpoint(
    State(state): State<RewardState>,
    Extension(user_id): Extension<UserId>,
    Path(reward_id): Path<RewardId>,
    Json(update): Json<RewardUpdate>,
) -> Result<Json<Reward>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    update_reward_status(
        reward_id,
        update.status,
        user_id,
        &state.ledger_policy,
        &connection,
    )
    .map(Json)
}

#[cfg(test)]
mod reward_endpoint_tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        Money, RewardId,
        endpoints::{self, format_endpoint},
        family::{Role, add_member},
        test_utils::{TestApp, create_test_family},
    };

    #[tokio::test]
    async fn request_and_approve_reward() {
        let app = TestApp::new();
        let alice = app.user("alice");
        let bob = app.user("bob");
        let (family, _) = create_test_family(&app.connection(), alice.id);
        let b = add_member(family.id, bob.id, Role::Member, Money::zero(), &app.connection())
            .unwrap();

        let response = app
            .post(endpoints::REWARDS, &bob)
            .json(&json!({
                "family_id": family.id,
                "amount": "2.50",
                "reason": "Tidy room all week",
            }))
            .await;
        response.assert_status_ok();
        let reward = response.json::<Value>();
        assert_eq!(reward["status"], "pending");
        assert_eq!(reward["member_id"], b.id.to_string());
        let path = format_endpoint(endpoints::REWARD, reward["id"].as_str().unwrap());

        app.put(&path, &bob)
            .json(&json!({ "status": "approved" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = app
            .put(&path, &alice)
            .json(&json!({ "status": "approved" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "approved");

        let balance_path = format_endpoint(
            &format_endpoint(endpoints::MEMBER_BALANCE, family.id),
            b.id,
        );
        let response = app.get(&balance_path, &bob).await;
        assert_eq!(response.json::<Value>()["balance"], "2.50");

        app.put(&path, &alice)
            .json(&json!({ "status": "rejected" }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let response = app.get(endpoints::REWARDS, &bob).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Vec<Value>>().len(), 1);
    }

    #[tokio::test]
    async fn rewards_cannot_be_deleted() {
        let app = TestApp::new();
        let alice = app.user("alice");
        let (family, _) = create_test_family(&app.connection(), alice.id);
        let response = app
            .post(endpoints::REWARDS, &alice)
            .json(&json!({ "family_id": family.id, "amount": 1 }))
            .await;
        let path = format_endpoint(endpoints::REWARD, response.json::<Value>()["id"].as_str().unwrap());

        app.delete(&path, &alice)
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_reward_is_not_found() {
        let app = TestApp::new();
        let alice = app.user("alice");

        app.get(&format_endpoint(endpoints::REWARD, RewardId::new_random()), &alice)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
