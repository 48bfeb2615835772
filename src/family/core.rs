//! The family membership registry: families, their members and member roles.

use rusqlite::{
    Connection, OptionalExtension, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FamilyId, MemberId, Money, Patch, UserId, auth::get_user_by_id, db::begin_immediate,
    pagination::Paging,
};

/// The role of a member within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May manage the family and its members, and decide reward requests.
    Admin,
    /// An ordinary member.
    Member,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(FromSqlError::Other(
                format!("unknown family role {other:?}").into(),
            )),
        }
    }
}

/// A group of users sharing a ledger, tasks, services and rewards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Family {
    /// The ID of the family.
    pub id: FamilyId,
    /// The display name of the family.
    pub name: String,
    /// A key for the family's avatar image.
    pub avatar_key: Option<String>,
    /// The user who created the family. Only they may delete it.
    pub created_by: UserId,
    /// When the family was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A user's membership in one family.
///
/// Tasks, services, rewards and ledger events all refer to members rather
/// than to users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyMember {
    /// The ID of the membership.
    pub id: MemberId,
    /// The family the user is a member of.
    pub family_id: FamilyId,
    /// The member's user account.
    pub user_id: UserId,
    /// What the member may do in the family.
    pub role: Role,
    /// The member's monthly allowance.
    pub monthly_quota: Money,
    /// When the user joined the family.
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Which records a list query should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every record in the family.
    Family(FamilyId),
    /// The records, across all families, that involve one of the user's
    /// memberships.
    User(UserId),
}

/// A change to a member's role or quota.
#[derive(Debug, Default, Deserialize)]
pub struct MemberUpdate {
    /// The new role.
    #[serde(default)]
    pub role: Patch<Role>,
    /// The new monthly quota.
    #[serde(default)]
    pub monthly_quota: Patch<Money>,
}

/// Create the family and family member tables.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_family_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS family (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                avatar_key TEXT,
                created_by TEXT NOT NULL REFERENCES user(id),
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS family_member (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES user(id),
                role TEXT NOT NULL CHECK (role IN ('admin', 'member')),
                monthly_quota INTEGER NOT NULL DEFAULT 0,
                joined_at TEXT NOT NULL,
                UNIQUE(family_id, user_id)
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_family_member_user ON family_member(user_id)",
        (),
    )?;

    Ok(())
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        Err(Error::InvalidInput("the family name cannot be empty".to_owned()))
    } else {
        Ok(())
    }
}

fn validate_quota(monthly_quota: Money) -> Result<(), Error> {
    if monthly_quota < Money::zero() {
        Err(Error::InvalidInput(
            "the monthly quota cannot be negative".to_owned(),
        ))
    } else {
        Ok(())
    }
}

/// Create a family with `creator` as its first member and admin.
///
/// The family and the creator's membership are written in one transaction.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] if `name` is blank, or an
/// [Error::NotFound] if `creator` is not a registered user.
pub fn create_family(
    name: &str,
    avatar_key: Option<String>,
    creator: UserId,
    connection: &Connection,
) -> Result<(Family, FamilyMember), Error> {
    validate_name(name)?;

    let transaction = begin_immediate(connection)?;
    get_user_by_id(creator, &transaction)?;

    let family = Family {
        id: FamilyId::new_random(),
        name: name.trim().to_owned(),
        avatar_key,
        created_by: creator,
        created_at: OffsetDateTime::now_utc(),
    };

    transaction.execute(
        "INSERT INTO family (id, name, avatar_key, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            family.id,
            &family.name,
            &family.avatar_key,
            family.created_by,
            family.created_at,
        ),
    )?;

    let member = insert_member(family.id, creator, Role::Admin, Money::zero(), &transaction)?;

    transaction.commit()?;

    Ok((family, member))
}

fn map_family_row(row: &Row) -> Result<Family, rusqlite::Error> {
    Ok(Family {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_key: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Get the family with `family_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the family does not exist.
pub fn get_family(family_id: FamilyId, connection: &Connection) -> Result<Family, Error> {
    connection
        .prepare("SELECT id, name, avatar_key, created_by, created_at FROM family WHERE id = ?1")?
        .query_row([family_id], map_family_row)
        .optional()?
        .ok_or(Error::NotFound("family"))
}

/// List the families that `user_id` is a member of, oldest membership first.
pub fn list_families_for_user(
    user_id: UserId,
    paging: Paging,
    connection: &Connection,
) -> Result<Vec<Family>, Error> {
    connection
        .prepare(
            "SELECT f.id, f.name, f.avatar_key, f.created_by, f.created_at
             FROM family f
             INNER JOIN family_member m ON m.family_id = f.id
             WHERE m.user_id = ?1
             ORDER BY m.rowid
             LIMIT ?2 OFFSET ?3",
        )?
        .query_map((user_id, paging.limit, paging.offset), map_family_row)?
        .map(|maybe_family| maybe_family.map_err(Error::from))
        .collect()
}

/// Save the name and avatar of `family`.
pub fn update_family(family: &Family, connection: &Connection) -> Result<(), Error> {
    validate_name(&family.name)?;

    let rows_affected = connection.execute(
        "UPDATE family SET name = ?1, avatar_key = ?2 WHERE id = ?3",
        (family.name.trim(), &family.avatar_key, family.id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("family"));
    }

    Ok(())
}

/// Delete a family and everything scoped to it: members, balances, ledger
/// events, tasks, services and rewards.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the family does not exist.
pub fn delete_family(family_id: FamilyId, connection: &Connection) -> Result<(), Error> {
    let transaction = begin_immediate(connection)?;

    let rows_affected = transaction.execute("DELETE FROM family WHERE id = ?1", [family_id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound("family"));
    }

    transaction.commit()?;

    Ok(())
}

const SELECT_MEMBER: &str =
    "SELECT id, family_id, user_id, role, monthly_quota, joined_at FROM family_member";

fn map_member_row(row: &Row) -> Result<FamilyMember, rusqlite::Error> {
    Ok(FamilyMember {
        id: row.get(0)?,
        family_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        monthly_quota: row.get(4)?,
        joined_at: row.get(5)?,
    })
}

/// Get the membership with `member_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the member does not exist.
pub fn get_member(member_id: MemberId, connection: &Connection) -> Result<FamilyMember, Error> {
    connection
        .prepare(&format!("{SELECT_MEMBER} WHERE id = ?1"))?
        .query_row([member_id], map_member_row)
        .optional()?
        .ok_or(Error::NotFound("member"))
}

/// Get the member with `member_id` only if it belongs to `family_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] naming `what` if the member does not exist
/// or belongs to another family.
pub fn get_member_of_family(
    member_id: MemberId,
    family_id: FamilyId,
    what: &'static str,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    match get_member(member_id, connection) {
        Ok(member) if member.family_id == family_id => Ok(member),
        Ok(_) | Err(Error::NotFound(_)) => Err(Error::NotFound(what)),
        Err(error) => Err(error),
    }
}

/// Get the membership of `user_id` in `family_id`, if there is one.
pub fn find_membership(
    user_id: UserId,
    family_id: FamilyId,
    connection: &Connection,
) -> Result<Option<FamilyMember>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_MEMBER} WHERE user_id = ?1 AND family_id = ?2"
        ))?
        .query_row((user_id, family_id), map_member_row)
        .optional()
        .map_err(Error::from)
}

/// List the members of a family in the order they joined.
pub fn list_members(
    family_id: FamilyId,
    connection: &Connection,
) -> Result<Vec<FamilyMember>, Error> {
    connection
        .prepare(&format!("{SELECT_MEMBER} WHERE family_id = ?1 ORDER BY rowid"))?
        .query_map([family_id], map_member_row)?
        .map(|maybe_member| maybe_member.map_err(Error::from))
        .collect()
}

fn insert_member(
    family_id: FamilyId,
    user_id: UserId,
    role: Role,
    monthly_quota: Money,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    let member = FamilyMember {
        id: MemberId::new_random(),
        family_id,
        user_id,
        role,
        monthly_quota,
        joined_at: OffsetDateTime::now_utc(),
    };

    connection.execute(
        "INSERT INTO family_member (id, family_id, user_id, role, monthly_quota, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            member.id,
            member.family_id,
            member.user_id,
            member.role,
            member.monthly_quota,
            member.joined_at,
        ),
    )?;

    Ok(member)
}

/// Add `user_id` to a family.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the user or family does not exist,
/// - [Error::Conflict] if the user is already a member of the family,
/// - [Error::InvalidInput] if the quota is negative.
pub fn add_member(
    family_id: FamilyId,
    user_id: UserId,
    role: Role,
    monthly_quota: Money,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    validate_quota(monthly_quota)?;
    get_family(family_id, connection)?;
    get_user_by_id(user_id, connection)?;

    insert_member(family_id, user_id, role, monthly_quota, connection)
}

/// Change the role or quota of a member of `family`.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the member is not part of `family`,
/// - [Error::Conflict] if the update would demote the family's creator,
/// - [Error::InvalidInput] if a field is `null` or the quota is negative.
pub fn update_member(
    family: &Family,
    member_id: MemberId,
    update: MemberUpdate,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    let mut member = get_member_of_family(member_id, family.id, "member", connection)?;

    update.role.apply_to_required(&mut member.role, "role")?;
    update
        .monthly_quota
        .apply_to_required(&mut member.monthly_quota, "monthly_quota")?;
    validate_quota(member.monthly_quota)?;

    if member.user_id == family.created_by && member.role != Role::Admin {
        return Err(Error::Conflict(
            "the family creator must remain an admin".to_owned(),
        ));
    }

    connection.execute(
        "UPDATE family_member SET role = ?1, monthly_quota = ?2 WHERE id = ?3",
        (member.role, member.monthly_quota, member.id),
    )?;

    Ok(member)
}

/// Remove a member from `family`.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the member is not part of `family`,
/// - [Error::Conflict] if the member is the family's creator, or is still
///   referenced by a task, service, reward or ledger event.
pub fn remove_member(
    family: &Family,
    member_id: MemberId,
    connection: &Connection,
) -> Result<(), Error> {
    let member = get_member_of_family(member_id, family.id, "member", connection)?;

    if member.user_id == family.created_by {
        return Err(Error::Conflict(
            "cannot remove the family creator".to_owned(),
        ));
    }

    match connection.execute("DELETE FROM family_member WHERE id = ?1", [member.id]) {
        Ok(_) => Ok(()),
        Err(error) => match Error::from(error) {
            Error::Conflict(_) => Err(Error::Conflict(
                "the member still has tasks, services, rewards or transactions".to_owned(),
            )),
            error => Err(error),
        },
    }
}

#[cfg(test)]
mod family_tests {
    use rusqlite::Connection;

    use crate::{
        Error, MemberId, Money, Patch,
        auth::User,
        family::{
            Family, FamilyMember, Role,
            core::{
                MemberUpdate, add_member, create_family, delete_family, find_membership,
                get_family, list_families_for_user, list_members, remove_member, update_family,
                update_member,
            },
        },
        ledger::{EventType, LedgerPolicy, NewTransactionEvent, get_balance, post_event},
        pagination::PaginationConfig,
        reward::{NewReward, create_reward},
        service::{NewService, create_service},
        task::{NewTask, create_task},
        test_utils::{create_test_user, get_test_connection},
    };

    fn setup() -> Connection {
        get_test_connection()
    }

    struct Referenced {
        connection: Connection,
        family: Family,
        bob: User,
        member: FamilyMember,
    }

    fn setup_member_to_reference() -> Referenced {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();
        let member =
            add_member(family.id, bob.id, Role::Member, Money::zero(), &connection).unwrap();

        Referenced {
            connection,
            family,
            bob,
            member,
        }
    }

    #[track_caller]
    fn assert_removal_conflicts(r: &Referenced) {
        let result = remove_member(&r.family, r.member.id, &r.connection);

        assert!(matches!(result, Err(Error::Conflict(_))), "got {result:?}");
        assert_eq!(
            find_membership(r.bob.id, r.family.id, &r.connection),
            Ok(Some(r.member.clone()))
        );
    }

    #[test]
    fn remove_member_with_transactions_conflicts() {
        let r = setup_member_to_reference();
        post_event(
            NewTransactionEvent {
                family_id: r.family.id,
                event_type: EventType::Transfer,
                amount: Money::from_cents(1_00),
                from_member_id: None,
                to_member_id: Some(r.member.id),
                reference_id: None,
                description: None,
            },
            r.bob.id,
            &LedgerPolicy::default(),
            &r.connection,
        )
        .unwrap();

        assert_removal_conflicts(&r);
        assert_eq!(
            get_balance(r.member.id, &r.connection),
            Ok(Money::from_cents(1_00))
        );
    }

    #[test]
    fn remove_member_with_task_conflicts() {
        let r = setup_member_to_reference();
        create_task(
            NewTask {
                family_id: r.family.id,
                title: "Mow the lawn".to_owned(),
                reward_amount: Money::from_cents(2_00),
                created_by: None,
                assigned_to: None,
            },
            r.bob.id,
            &r.connection,
        )
        .unwrap();

        assert_removal_conflicts(&r);
    }

    #[test]
    fn remove_member_with_service_conflicts() {
        let r = setup_member_to_reference();
        create_service(
            NewService {
                family_id: r.family.id,
                title: "Haircut".to_owned(),
                price: Money::from_cents(5_00),
                provider_id: None,
                status: None,
            },
            r.bob.id,
            &r.connection,
        )
        .unwrap();

        assert_removal_conflicts(&r);
    }

    #[test]
    fn remove_member_with_reward_conflicts() {
        let r = setup_member_to_reference();
        create_reward(
            NewReward {
                family_id: r.family.id,
                member_id: None,
                amount: Money::from_cents(3_00),
                reason: Some("Good grades".to_owned()),
            },
            r.bob.id,
            &r.connection,
        )
        .unwrap();

        assert_removal_conflicts(&r);
    }

    #[test]
    fn create_family_makes_creator_admin() {
        let connection = setup();
        let user = create_test_user(&connection, "alice");

        let (family, member) = create_family("Smiths", None, user.id, &connection).unwrap();

        assert_eq!(family.created_by, user.id);
        assert_eq!(member.role, Role::Admin);
        assert_eq!(member.family_id, family.id);
        assert_eq!(
            find_membership(user.id, family.id, &connection).unwrap(),
            Some(member)
        );
    }

    #[test]
    fn create_family_rejects_blank_name() {
        let connection = setup();
        let user = create_test_user(&connection, "alice");

        let result = create_family("  ", None, user.id, &connection);

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn list_families_only_returns_own_families() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (first, _) = create_family("First", None, alice.id, &connection).unwrap();
        let (second, _) = create_family("Second", None, alice.id, &connection).unwrap();
        create_family("Bob's", None, bob.id, &connection).unwrap();
        let paging = PaginationConfig::default().paging(None, None);

        let families = list_families_for_user(alice.id, paging, &connection).unwrap();

        assert_eq!(families, vec![first.clone(), second]);

        let paging = PaginationConfig::default().paging(Some(0), Some(1));
        let families = list_families_for_user(alice.id, paging, &connection).unwrap();
        assert_eq!(families, vec![first]);
    }

    #[test]
    fn update_family_changes_name() {
        let connection = setup();
        let user = create_test_user(&connection, "alice");
        let (mut family, _) = create_family("Smiths", None, user.id, &connection).unwrap();
        family.name = "Joneses".to_owned();
        family.avatar_key = Some("avatar.png".to_owned());

        update_family(&family, &connection).unwrap();

        assert_eq!(get_family(family.id, &connection), Ok(family));
    }

    #[test]
    fn duplicate_membership_is_conflict() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();
        add_member(family.id, bob.id, Role::Member, Money::zero(), &connection).unwrap();

        let result = add_member(family.id, bob.id, Role::Member, Money::zero(), &connection);

        assert!(matches!(result, Err(Error::Conflict(_))), "got {result:?}");
        assert_eq!(list_members(family.id, &connection).unwrap().len(), 2);
    }

    #[test]
    fn add_unknown_user_is_not_found() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();

        let result = add_member(
            family.id,
            crate::UserId::new_random(),
            Role::Member,
            Money::zero(),
            &connection,
        );

        assert_eq!(result, Err(Error::NotFound("user")));
    }

    #[test]
    fn creator_cannot_be_demoted_or_removed() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let (family, creator) = create_family("Smiths", None, alice.id, &connection).unwrap();

        let demote = update_member(
            &family,
            creator.id,
            MemberUpdate {
                role: Patch::Value(Role::Member),
                monthly_quota: Patch::Absent,
            },
            &connection,
        );
        let remove = remove_member(&family, creator.id, &connection);

        assert!(matches!(demote, Err(Error::Conflict(_))), "got {demote:?}");
        assert!(matches!(remove, Err(Error::Conflict(_))), "got {remove:?}");
        assert_eq!(
            find_membership(alice.id, family.id, &connection).unwrap(),
            Some(creator)
        );
    }

    #[test]
    fn update_member_changes_role_and_quota() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();
        let member =
            add_member(family.id, bob.id, Role::Member, Money::zero(), &connection).unwrap();

        let updated = update_member(
            &family,
            member.id,
            MemberUpdate {
                role: Patch::Value(Role::Admin),
                monthly_quota: Patch::Value(Money::from_cents(2_000)),
            },
            &connection,
        )
        .unwrap();

        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.monthly_quota, Money::from_cents(2_000));
        assert_eq!(
            find_membership(bob.id, family.id, &connection).unwrap(),
            Some(updated)
        );
    }

    #[test]
    fn remove_member_from_other_family_is_not_found() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();
        let (other_family, bobs_membership) =
            create_family("Bob's", None, bob.id, &connection).unwrap();
        assert_ne!(family.id, other_family.id);

        let result = remove_member(&family, bobs_membership.id, &connection);

        assert_eq!(result, Err(Error::NotFound("member")));
        let result = remove_member(&family, MemberId::new_random(), &connection);
        assert_eq!(result, Err(Error::NotFound("member")));
    }

    #[test]
    fn remove_member_succeeds() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();
        let member =
            add_member(family.id, bob.id, Role::Member, Money::zero(), &connection).unwrap();

        remove_member(&family, member.id, &connection).unwrap();

        assert_eq!(find_membership(bob.id, family.id, &connection), Ok(None));
    }

    #[test]
    fn delete_family_removes_members() {
        let connection = setup();
        let alice = create_test_user(&connection, "alice");
        let (family, _) = create_family("Smiths", None, alice.id, &connection).unwrap();

        delete_family(family.id, &connection).unwrap();

        assert_eq!(get_family(family.id, &connection), Err(Error::NotFound("family")));
        assert_eq!(find_membership(alice.id, family.id, &connection), Ok(None));
        assert_eq!(
            delete_family(family.id, &connection),
            Err(Error::NotFound("family"))
        );
    }
}
