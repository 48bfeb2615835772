//! The route handlers for transactions and balances.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error, FamilyId, MemberId, TransactionId, UserId,
    db::lock_connection,
    family::{
        gate::{require_member, resolve_scope},
        get_member_of_family,
    },
    ledger::{
        LedgerPolicy, MemberBalance, NewTransactionEvent, TransactionEvent,
        core::{get_event, get_member_balance, list_events, list_family_balances, post_event},
    },
    pagination::{ListQuery, PaginationConfig},
};

/// The state needed for the ledger routes.
#[derive(Debug, Clone)]
pub struct LedgerState {
    /// The database connection holding the ledger.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The defaults and limits for listing transactions.
    pub pagination: PaginationConfig,
    /// The rules the ledger applies when posting.
    pub ledger_policy: LedgerPolicy,
}

impl FromRef<AppState> for LedgerState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination: state.config.pagination.clone(),
            ledger_policy: state.config.ledger_policy,
        }
    }
}

/// List transactions, either of one family or those involving the caller.
pub async fn list_transactions_endpoint(
    State(state): State<LedgerState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TransactionEvent>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let scope = resolve_scope(user_id, query.family_id, &connection)?;

    list_events(scope, query.paging(&state.pagination), &connection).map(Json)
}

/// Post a transaction to a family's ledger.
pub async fn create_transaction_endpoint(
    State(state): State<LedgerState>,
    Extension(user_id): Extension<UserId>,
    Json(new_event): Json<NewTransactionEvent>,
) -> Result<Json<TransactionEvent>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    post_event(new_event, user_id, &state.ledger_policy, &connection).map(Json)
}

/// Get a single transaction from a family the caller belongs to.
pub async fn get_transaction_endpoint(
    State(state): State<LedgerState>,
    Extension(user_id): Extension<UserId>,
    Path(transaction_id): Path<TransactionId>,
) -> Result<Json<TransactionEvent>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let event = get_event(transaction_id, &connection)?;
    require_member(user_id, event.family_id, &connection)?;

    Ok(Json(event))
}

/// Get the balance of one member of a family the caller belongs to.
pub async fn get_member_balance_endpoint(
    State(state): State<LedgerState>,
    Extension(user_id): Extension<UserId>,
    Path((family_id, member_id)): Path<(FamilyId, MemberId)>,
) -> Result<Json<MemberBalance>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    require_member(user_id, family_id, &connection)?;
    let member = get_member_of_family(member_id, family_id, "member", &connection)?;

    get_member_balance(member.id, &connection).map(Json)
}

/// Get the balances of all members of a family the caller belongs to.
pub async fn list_family_balances_endpoint(
    State(state): State<LedgerState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<Vec<MemberBalance>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    require_member(user_id, family_id, &connection)?;

    list_family_balances(family_id, &connection).map(Json)
}
