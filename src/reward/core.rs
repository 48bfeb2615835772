//! Reward requests: a member asks to be credited an amount, and a family
//! admin approves or rejects the request.

use rusqlite::{
    Connection, OptionalExtension, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FamilyId, MemberId, Money, RewardId, UserId,
    db::begin_immediate,
    family::{
        Scope,
        gate::{require_admin, require_member},
        get_member_of_family,
    },
    ledger::{EventType, LedgerPolicy, NewTransactionEvent, post_event_in},
    pagination::Paging,
};

/// Whether a reward request has been decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    /// Waiting for an admin.
    Pending,
    /// Granted and credited to the applicant.
    Approved,
    /// Turned down.
    Rejected,
}

impl RewardStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Pending => "pending",
            RewardStatus::Approved => "approved",
            RewardStatus::Rejected => "rejected",
        }
    }
}

impl ToSql for RewardStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RewardStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(RewardStatus::Pending),
            "approved" => Ok(RewardStatus::Approved),
            "rejected" => Ok(RewardStatus::Rejected),
            other => Err(FromSqlError::Other(
                format!("unknown reward status {other:?}").into(),
            )),
        }
    }
}

/// A member's request to be rewarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reward {
    /// The ID of the reward.
    pub id: RewardId,
    /// The family the request was made in.
    pub family_id: FamilyId,
    /// The applicant.
    pub member_id: MemberId,
    /// How much the applicant asks for.
    pub amount: Money,
    /// What the reward is for.
    pub reason: Option<String>,
    /// Whether the request has been decided.
    pub status: RewardStatus,
    /// When the request was made.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data needed to request a reward.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReward {
    /// The family to request the reward in.
    pub family_id: FamilyId,
    /// The applicant, the caller's membership if not given.
    #[serde(default)]
    pub member_id: Option<MemberId>,
    /// How much to ask for.
    pub amount: Money,
    /// What the reward is for.
    #[serde(default)]
    pub reason: Option<String>,
}

/// An admin's decision on a reward request.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardUpdate {
    /// The new status.
    pub status: RewardStatus,
}

/// Create the reward table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_reward_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS reward (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id) ON DELETE CASCADE,
                member_id TEXT NOT NULL REFERENCES family_member(id),
                amount INTEGER NOT NULL CHECK (amount > 0),
                reason TEXT,
                status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_reward_family ON reward(family_id)",
        (),
    )?;

    Ok(())
}

/// Request a reward. The request starts out pending.
///
/// # Errors
///
/// Returns:
/// - [Error::Forbidden] if `actor` is not a member of the family,
/// - [Error::NotFound] if the applicant is not part of the family,
/// - [Error::InvalidInput] if the amount is not positive.
pub fn create_reward(
    new_reward: NewReward,
    actor: UserId,
    connection: &Connection,
) -> Result<Reward, Error> {
    if !new_reward.amount.is_positive() {
        return Err(Error::InvalidInput(
            "the amount must be greater than zero".to_owned(),
        ));
    }

    let membership = require_member(actor, new_reward.family_id, connection)?;
    let member_id = new_reward.member_id.unwrap_or(membership.id);
    get_member_of_family(member_id, new_reward.family_id, "applicant", connection)?;

    let reward = Reward {
        id: RewardId::new_random(),
        family_id: new_reward.family_id,
        member_id,
        amount: new_reward.amount,
        reason: new_reward.reason,
        status: RewardStatus::Pending,
        created_at: OffsetDateTime::now_utc(),
    };

    connection.execute(
        "INSERT INTO reward (id, family_id, member_id, amount, reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            reward.id,
            reward.family_id,
            reward.member_id,
            reward.amount,
            &reward.reason,
            reward.status,
            reward.created_at,
        ),
    )?;

    Ok(reward)
}

const SELECT_REWARD: &str =
    "SELECT id, family_id, member_id, amount, reason, status, created_at FROM reward";

fn map_reward_row(row: &Row) -> Result<Reward, rusqlite::Error> {
    Ok(Reward {
        id: row.get(0)?,
        family_id: row.get(1)?,
        member_id: row.get(2)?,
        amount: row.get(3)?,
        reason: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Get the reward with `reward_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the reward does not exist.
pub fn get_reward(reward_id: RewardId, connection: &Connection) -> Result<Reward, Error> {
    connection
        .prepare(&format!("{SELECT_REWARD} WHERE id = ?1"))?
        .query_row([reward_id], map_reward_row)
        .optional()?
        .ok_or(Error::NotFound("reward"))
}

/// List rewards in the order they were requested.
///
/// For [Scope::User], the rewards requested by one of the user's memberships
/// are listed.
pub fn list_rewards(
    scope: Scope,
    paging: Paging,
    connection: &Connection,
) -> Result<Vec<Reward>, Error> {
    let (filter, id) = match scope {
        Scope::Family(family_id) => ("family_id = ?1", family_id.to_string()),
        Scope::User(user_id) => (
            "member_id IN (SELECT id FROM family_member WHERE user_id = ?1)",
            user_id.to_string(),
        ),
    };

    connection
        .prepare(&format!(
            "{SELECT_REWARD} WHERE {filter} ORDER BY rowid LIMIT ?2 OFFSET ?3"
        ))?
        .query_map((id, paging.limit, paging.offset), map_reward_row)?
        .map(|maybe_reward| maybe_reward.map_err(Error::from))
        .collect()
}

/// Approve or reject a pending reward. Family admins only.
///
/// Approving credits the applicant through the ledger when
/// `policy.post_workflow_events` is set, in the same SQL transaction as the
/// status change.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the reward does not exist,
/// - [Error::Forbidden] if `actor` is not an admin of the reward's family,
/// - [Error::InvalidInput] if the reward has already been decided, or the new
///   status is `pending`.
pub fn update_reward_status(
    reward_id: RewardId,
    status: RewardStatus,
    actor: UserId,
    policy: &LedgerPolicy,
    connection: &Connection,
) -> Result<Reward, Error> {
    let transaction = begin_immediate(connection)?;
    let mut reward = get_reward(reward_id, &transaction)?;
    require_admin(actor, reward.family_id, &transaction)?;

    if reward.status != RewardStatus::Pending {
        return Err(Error::InvalidInput(format!(
            "the reward has already been {}",
            reward.status.as_str()
        )));
    }

    if status == RewardStatus::Pending {
        return Err(Error::InvalidInput(
            "a reward can only be approved or rejected".to_owned(),
        ));
    }

    reward.status = status;

    if reward.status == RewardStatus::Approved && policy.post_workflow_events {
        post_event_in(
            NewTransactionEvent {
                family_id: reward.family_id,
                event_type: EventType::Reward,
                amount: reward.amount,
                from_member_id: None,
                to_member_id: Some(reward.member_id),
                reference_id: Some(reward.id.into()),
                description: reward.reason.clone(),
            },
            actor,
            policy,
            &transaction,
        )?;
    }

    transaction.execute(
        "UPDATE reward SET status = ?1 WHERE id = ?2",
        (reward.status, reward.id),
    )?;
    transaction.commit()?;

    tracing::info!("Reward {} was {}", reward.id, reward.status.as_str());

    Ok(reward)
}

#[cfg(test)]
mod reward_tests {
    use rusqlite::Connection;

    use crate::{
        Error, Money,
        auth::User,
        family::{FamilyMember, Role, Scope, add_member},
        ledger::{EventType, LedgerPolicy, get_balance, list_events},
        pagination::PaginationConfig,
        reward::{
            NewReward, RewardStatus, create_reward, get_reward, list_rewards,
            update_reward_status,
        },
        test_utils::{create_test_family, create_test_user, get_test_connection},
    };

    struct Fixture {
        connection: Connection,
        alice: User,
        bob: User,
        b: FamilyMember,
    }

    fn setup() -> Fixture {
        let connection = get_test_connection();
        let alice = create_test_user(&connection, "alice");
        let bob = create_test_user(&connection, "bob");
        let (family, _) = create_test_family(&connection, alice.id);
        let b = add_member(family.id, bob.id, Role::Member, Money::zero(), &connection).unwrap();

        Fixture {
            connection,
            alice,
            bob,
            b,
        }
    }

    fn new_reward(f: &Fixture) -> NewReward {
        NewReward {
            family_id: f.b.family_id,
            member_id: None,
            amount: Money::from_cents(3_00),
            reason: Some("Good grades".to_owned()),
        }
    }

    #[test]
    fn create_is_pending_for_caller() {
        let f = setup();

        let reward = create_reward(new_reward(&f), f.bob.id, &f.connection).unwrap();

        assert_eq!(reward.status, RewardStatus::Pending);
        assert_eq!(reward.member_id, f.b.id);
        assert_eq!(get_reward(reward.id, &f.connection), Ok(reward));
    }

    #[test]
    fn create_rejects_zero_amount() {
        let f = setup();

        let result = create_reward(
            NewReward {
                amount: Money::zero(),
                ..new_reward(&f)
            },
            f.bob.id,
            &f.connection,
        );

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn approval_credits_applicant() {
        let f = setup();
        let reward = create_reward(new_reward(&f), f.bob.id, &f.connection).unwrap();

        let reward = update_reward_status(
            reward.id,
            RewardStatus::Approved,
            f.alice.id,
            &LedgerPolicy::default(),
            &f.connection,
        )
        .unwrap();

        assert_eq!(reward.status, RewardStatus::Approved);
        assert_eq!(get_balance(f.b.id, &f.connection), Ok(Money::from_cents(3_00)));
        let events = list_events(
            Scope::User(f.bob.id),
            PaginationConfig::default().paging(None, None),
            &f.connection,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Reward);
        assert_eq!(events[0].from_member_id, None);
        assert_eq!(events[0].reference_id, Some(reward.id.into()));
    }

    #[test]
    fn rejection_does_not_post() {
        let f = setup();
        let reward = create_reward(new_reward(&f), f.bob.id, &f.connection).unwrap();

        update_reward_status(
            reward.id,
            RewardStatus::Rejected,
            f.alice.id,
            &LedgerPolicy::default(),
            &f.connection,
        )
        .unwrap();

        assert_eq!(get_balance(f.b.id, &f.connection), Ok(Money::zero()));
    }

    #[test]
    fn only_admin_decides_once() {
        let f = setup();
        let reward = create_reward(new_reward(&f), f.bob.id, &f.connection).unwrap();
        let policy = LedgerPolicy::default();

        let by_member =
            update_reward_status(reward.id, RewardStatus::Approved, f.bob.id, &policy, &f.connection);
        assert!(matches!(by_member, Err(Error::Forbidden(_))), "got {by_member:?}");

        let back_to_pending = update_reward_status(
            reward.id,
            RewardStatus::Pending,
            f.alice.id,
            &policy,
            &f.connection,
        );
        assert!(matches!(back_to_pending, Err(Error::InvalidInput(_))));

        update_reward_status(reward.id, RewardStatus::Rejected, f.alice.id, &policy, &f.connection)
            .unwrap();
        let again =
            update_reward_status(reward.id, RewardStatus::Approved, f.alice.id, &policy, &f.connection);
        assert!(matches!(again, Err(Error::InvalidInput(_))), "got {again:?}");
        assert_eq!(
            get_reward(reward.id, &f.connection).unwrap().status,
            RewardStatus::Rejected
        );
    }

    #[test]
    fn list_rewards_for_applicant() {
        let f = setup();
        let reward = create_reward(new_reward(&f), f.bob.id, &f.connection).unwrap();
        let paging = PaginationConfig::default().paging(None, None);

        assert_eq!(
            list_rewards(Scope::User(f.bob.id), paging, &f.connection),
            Ok(vec![reward.clone()])
        );
        assert_eq!(
            list_rewards(Scope::User(f.alice.id), paging, &f.connection),
            Ok(vec![])
        );
        assert_eq!(
            list_rewards(Scope::Family(f.b.family_id), paging, &f.connection),
            Ok(vec![reward])
        );
    }
}
