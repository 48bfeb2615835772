//! The route handlers for bounty tasks.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::{
    AppState, Error, LedgerPolicy, TaskId, UserId,
    db::lock_connection,
    family::gate::{require_member, resolve_scope},
    pagination::{ListQuery, PaginationConfig},
    task::{
        BountyTask, NewTask, TaskUpdate,
        core::{create_task, delete_task, get_task, list_tasks, update_task},
    },
};

/// The state needed for the task routes.
#[derive(Debug, Clone)]
pub struct TaskState {
    /// The database connection for managing tasks.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The defaults and limits for listing tasks.
    pub pagination: PaginationConfig,
    /// Whether completing a task pays its reward through the ledger.
    pub ledger_policy: LedgerPolicy,
}

impl FromRef<AppState> for TaskState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination: state.config.pagination.clone(),
            ledger_policy: state.config.ledger_policy,
        }
    }
}

/// List tasks, either of one family or those the caller created or was assigned.
pub async fn list_tasks_endpoint(
    State(state): State<TaskState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BountyTask>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let scope = resolve_scope(user_id, query.family_id, &connection)?;

    list_tasks(scope, query.paging(&state.pagination), &connection).map(Json)
}

/// Post a new task.
pub async fn create_task_endpoint(
    State(state): State<TaskState>,
    Extension(user_id): Extension<UserId>,
    Json(new_task): Json<NewTask>,
) -> Result<Json<BountyTask>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    create_task(new_task, user_id, &connection).map(Json)
}

/// Get a task from a family the caller belongs to.
pub async fn get_task_endpoint(
    State(state): State<TaskState>,
    Extension(user_id): Extension<UserId>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<BountyTask>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let task = get_task(task_id, &connection)?;
    require_member(user_id, task.family_id, &connection)?;

    Ok(Json(task))
}

/// Edit a task or move it along its workflow.
pub async fn update_task_endpoint(
    State(state): State<TaskState>,
    Extension(user_id): Extension<UserId>,
    Path(task_id): Path<TaskId>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<BountyTask>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    update_task(task_id, update, user_id, &state.ledger_policy, &connection).map(Json)
}

/// Delete a task. Only its creator or a family admin may do this.
pub async fn delete_task_endpoint(
    State(state): State<TaskState>,
    Extension(user_id): Extension<UserId>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Value>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    delete_task(task_id, user_id, &connection)?;

    Ok(Json(json!({ "message": "Task deleted successfully" })))
}
