//! Authorization checks for family-scoped resources.
//!
//! Every family-scoped read or write runs one of the `require_*` functions
//! before touching data, so a non-member never learns anything about a
//! family's contents.

use rusqlite::Connection;

use crate::{
    Error, FamilyId, MemberId, UserId,
    family::{FamilyMember, Role, Scope, find_membership},
};

/// Whether `user_id` is a member of `family_id`.
pub fn is_member(
    user_id: UserId,
    family_id: FamilyId,
    connection: &Connection,
) -> Result<bool, Error> {
    find_membership(user_id, family_id, connection).map(|membership| membership.is_some())
}

/// Whether `user_id` is an admin of `family_id`.
pub fn is_admin(
    user_id: UserId,
    family_id: FamilyId,
    connection: &Connection,
) -> Result<bool, Error> {
    find_membership(user_id, family_id, connection)
        .map(|membership| membership.is_some_and(|member| member.role == Role::Admin))
}

/// Whether `membership` is one of the members a resource belongs to, e.g.
/// the creator of a task or the provider of a service.
pub fn is_resource_party(membership: &FamilyMember, parties: &[MemberId]) -> bool {
    parties.contains(&membership.id)
}

/// Get the caller's membership of `family_id`.
///
/// # Errors
///
/// Returns [Error::Forbidden] if `user_id` is not a member.
pub fn require_member(
    user_id: UserId,
    family_id: FamilyId,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    find_membership(user_id, family_id, connection)?
        .ok_or_else(|| Error::Forbidden("you are not a member of this family".to_owned()))
}

/// Get the caller's membership of `family_id`, which must be an admin.
///
/// # Errors
///
/// Returns [Error::Forbidden] if `user_id` is not an admin of the family.
pub fn require_admin(
    user_id: UserId,
    family_id: FamilyId,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    let membership = require_member(user_id, family_id, connection)?;

    if membership.role != Role::Admin {
        return Err(Error::Forbidden(
            "you are not an admin of this family".to_owned(),
        ));
    }

    Ok(membership)
}

/// Get the caller's membership of `family_id`, which must be one of
/// `parties` or an admin.
///
/// # Errors
///
/// Returns [Error::Forbidden] if `user_id` is neither.
pub fn require_party_or_admin(
    user_id: UserId,
    family_id: FamilyId,
    parties: &[MemberId],
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    let membership = require_member(user_id, family_id, connection)?;

    if membership.role == Role::Admin || is_resource_party(&membership, parties) {
        Ok(membership)
    } else {
        Err(Error::Forbidden(
            "only the owner or a family admin may do this".to_owned(),
        ))
    }
}

/// Turn the optional `family_id` filter of a list query into a [Scope].
///
/// # Errors
///
/// Returns [Error::Forbidden] if a family is given that the caller is not a
/// member of.
pub fn resolve_scope(
    user_id: UserId,
    family_id: Option<FamilyId>,
    connection: &Connection,
) -> Result<Scope, Error> {
    match family_id {
        Some(family_id) => {
            require_member(user_id, family_id, connection)?;
            Ok(Scope::Family(family_id))
        }
        None => Ok(Scope::User(user_id)),
    }
}
