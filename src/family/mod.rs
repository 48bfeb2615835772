//! Families, their members and the authorization checks built on membership.

mod core;
mod endpoints;
pub mod gate;

pub use core::{
    Family, FamilyMember, MemberUpdate, Role, Scope, add_member, create_family,
    create_family_tables, delete_family, find_membership, get_family, get_member,
    get_member_of_family, list_families_for_user, list_members, remove_member, update_family,
    update_member,
};
pub use endpoints::{
    FamilyState, add_member_endpoint, create_family_endpoint, delete_family_endpoint,
    get_family_endpoint, join_family_endpoint, list_families_endpoint, list_members_endpoint,
    remove_member_endpoint, update_family_endpoint, update_member_endpoint,
};
