//! The route handlers for families and their members.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState, Error, FamilyId, MemberId, Money, Patch, UserId,
    db::lock_connection,
    family::{
        Family, FamilyMember, MemberUpdate, Role,
        core::{
            add_member, create_family, delete_family, get_family, list_families_for_user,
            list_members, remove_member, update_family, update_member,
        },
        gate::{require_admin, require_member},
    },
    pagination::{PageQuery, PaginationConfig},
};

/// The state needed for the family routes.
#[derive(Debug, Clone)]
pub struct FamilyState {
    /// The database connection for managing families.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The defaults and limits for listing families.
    pub pagination: PaginationConfig,
}

impl FromRef<AppState> for FamilyState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination: state.config.pagination.clone(),
        }
    }
}

/// The body for creating a family.
#[derive(Debug, Deserialize)]
pub struct NewFamilyData {
    /// The display name of the family.
    pub name: String,
    /// A key for the family's avatar image.
    pub avatar_key: Option<String>,
}

/// The body for editing a family.
#[derive(Debug, Default, Deserialize)]
pub struct FamilyUpdate {
    /// The new name, cannot be cleared.
    #[serde(default)]
    pub name: Patch<String>,
    /// The new avatar key.
    #[serde(default)]
    pub avatar_key: Patch<String>,
}

/// The body for adding a member to a family.
#[derive(Debug, Deserialize)]
pub struct NewMemberData {
    /// The user to add.
    pub user_id: UserId,
    /// The role to give them, `member` if not specified.
    #[serde(default = "default_role")]
    pub role: Role,
    /// Their monthly allowance.
    #[serde(default)]
    pub monthly_quota: Money,
}

fn default_role() -> Role {
    Role::Member
}

/// List the caller's families.
pub async fn list_families_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Family>>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    list_families_for_user(user_id, query.paging(&state.pagination), &connection).map(Json)
}

/// Create a family with the caller as its admin.
pub async fn create_family_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Json(data): Json<NewFamilyData>,
) -> Result<Json<Family>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let (family, _) = create_family(&data.name, data.avatar_key, user_id, &connection)?;

    tracing::info!("User {user_id} created family {}", family.id);

    Ok(Json(family))
}

/// Get a family the caller is a member of.
pub async fn get_family_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<Family>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;
    require_member(user_id, family.id, &connection)?;

    Ok(Json(family))
}

/// Edit a family's name or avatar. Admins only.
pub async fn update_family_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
    Json(update): Json<FamilyUpdate>,
) -> Result<Json<Family>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let mut family = get_family(family_id, &connection)?;
    require_admin(user_id, family.id, &connection)?;

    update.name.apply_to_required(&mut family.name, "name")?;
    update.avatar_key.apply_to(&mut family.avatar_key);
    update_family(&family, &connection)?;

    get_family(family.id, &connection).map(Json)
}

/// Delete a family and everything in it. Only the family's creator may do this.
pub async fn delete_family_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<Value>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;

    if family.created_by != user_id {
        return Err(Error::Forbidden(
            "only the creator can delete the family".to_owned(),
        ));
    }

    delete_family(family.id, &connection)?;
    tracing::info!("User {user_id} deleted family {}", family.id);

    Ok(Json(json!({ "message": "Family deleted successfully" })))
}

/// Join a family as an ordinary member.
pub async fn join_family_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<FamilyMember>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    add_member(family_id, user_id, Role::Member, Money::zero(), &connection).map(Json)
}

/// List the members of a family the caller belongs to.
pub async fn list_members_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<Vec<FamilyMember>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;
    require_member(user_id, family.id, &connection)?;

    list_members(family.id, &connection).map(Json)
}

/// Add a user to a family. Admins only.
pub async fn add_member_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path(family_id): Path<FamilyId>,
    Json(data): Json<NewMemberData>,
) -> Result<Json<FamilyMember>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;
    require_admin(user_id, family.id, &connection)?;

    add_member(
        family.id,
        data.user_id,
        data.role,
        data.monthly_quota,
        &connection,
    )
    .map(Json)
}

/// Change a member's role or quota. Admins only.
pub async fn update_member_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path((family_id, member_id)): Path<(FamilyId, MemberId)>,
    Json(update): Json<MemberUpdate>,
) -> Result<Json<FamilyMember>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;
    require_admin(user_id, family.id, &connection)?;

    update_member(&family, member_id, update, &connection).map(Json)
}

/// Remove a member from a family. Admins only.
pub async fn remove_member_endpoint(
    State(state): State<FamilyState>,
    Extension(user_id): Extension<UserId>,
    Path((family_id, member_id)): Path<(FamilyId, MemberId)>,
) -> Result<Json<Value>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let family = get_family(family_id, &connection)?;
    require_admin(user_id, family.id, &connection)?;

    remove_member(&family, member_id, &connection)?;

    Ok(Json(json!({ "message": "Member removed successfully" })))
}
