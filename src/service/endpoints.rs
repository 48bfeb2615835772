//! The route handlers for paid services.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::{
    AppState, Error, LedgerPolicy, ServiceId, UserId,
    db::lock_connection,
    family::gate::{require_member, resolve_scope},
    ledger::TransactionEvent,
    pagination::{ListQuery, PaginationConfig},
    service::{
        NewService, Service, ServiceUpdate,
        core::{
            create_service, delete_service, get_service, list_services, purchase_service,
            update_service,
        },
    },
};

/// The state needed for the service routes.
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// The database connection for managing services.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The defaults and limits for listing services.
    pub pagination: PaginationConfig,
    /// The rules applied when a purchase is posted to the ledger.
    pub ledger_policy: LedgerPolicy,
}

impl FromRef<AppState> for ServiceState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination: state.config.pagination.clone(),
            ledger_policy: state.config.ledger_policy,
        }
    }
}

/// List active services, either of one family or those the caller provides.
pub async fn list_services_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Service>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let scope = resolve_scope(user_id, query.family_id, &connection)?;

    list_services(scope, query.paging(&state.pagination), &connection).map(Json)
}

/// Offer a new service.
pub async fn create_service_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Json(new_service): Json<NewService>,
) -> Result<Json<Service>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    create_service(new_service, user_id, &connection).map(Json)
}

/// Get a service from a family the caller belongs to.
pub async fn get_service_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Path(service_id): Path<ServiceId>,
) -> Result<Json<Service>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let service = get_service(service_id, &connection)?;
    require_member(user_id, service.family_id, &connection)?;

    Ok(Json(service))
}

/// Edit a service's title, price or status.
pub async fn update_service_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Path(service_id): Path<ServiceId>,
    Json(update): Json<ServiceUpdate>,
) -> Result<Json<Service>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    update_service(service_id, update, user_id, &connection).map(Json)
}

/// Delete a service.
pub async fn delete_service_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Path(service_id): Path<ServiceId>,
) -> Result<Json<Value>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    delete_service(service_id, user_id, &connection)?;

    Ok(Json(json!({ "message": "Service deleted successfully" })))
}

/// Buy a service and return the ledger event that paid for it.
pub async fn purchase_service_endpoint(
    State(state): State<ServiceState>,
    Extension(user_id): Extension<UserId>,
    Path(service_id): Path<ServiceId>,
) -> Result<Json<TransactionEvent>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    purchase_service(service_id, user_id, &state.ledger_policy, &connection).map(Json)
}
