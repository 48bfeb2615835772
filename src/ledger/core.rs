//! The ledger engine: the append-only history of transaction events and the
//! per-member balance snapshots derived from it.
//!
//! The snapshot of a member always equals the sum of the amounts the member
//! received minus the sum of the amounts the member paid. Both are only ever
//! changed together, inside one SQLite transaction, by [post_event_in].

use rusqlite::{
    Connection, OptionalExtension, Row, Transaction as SqlTransaction,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FamilyId, MemberId, Money, ReferenceId, TransactionId, UserId,
    db::begin_immediate,
    family::{Scope, gate::require_member, get_member_of_family},
    pagination::Paging,
};

/// What caused money to move between members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A member bought another member's service.
    Service,
    /// A bounty task was completed.
    Task,
    /// A reward request was approved.
    Reward,
    /// A plain transfer or top-up.
    Transfer,
}

impl EventType {
    fn as_str(&self) -> &'static str {
        match self {
            EventType::Service => "service",
            EventType::Task => "task",
            EventType::Reward => "reward",
            EventType::Transfer => "transfer",
        }
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "service" => Ok(EventType::Service),
            "task" => Ok(EventType::Task),
            "reward" => Ok(EventType::Reward),
            "transfer" => Ok(EventType::Transfer),
            other => Err(FromSqlError::Other(
                format!("unknown event type {other:?}").into(),
            )),
        }
    }
}

/// The status every posted event has.
pub const CONFIRMED: &str = "confirmed";

/// A movement of money between members of a family. Never changed once posted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionEvent {
    /// The ID of the event.
    pub id: TransactionId,
    /// The family whose ledger the event belongs to.
    pub family_id: FamilyId,
    /// What caused the event.
    pub event_type: EventType,
    /// How much money moved, always positive.
    pub amount: Money,
    /// The member who paid, if any.
    pub from_member_id: Option<MemberId>,
    /// The member who was paid, if any.
    pub to_member_id: Option<MemberId>,
    /// The task, service or reward the event was posted for.
    pub reference_id: Option<ReferenceId>,
    /// A note about the event.
    pub description: Option<String>,
    /// Always "confirmed".
    pub status: String,
    /// The user who posted the event.
    pub created_by: UserId,
    /// When the event was posted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data needed to post a transaction event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransactionEvent {
    /// The family whose ledger to post to.
    pub family_id: FamilyId,
    /// What caused the event.
    pub event_type: EventType,
    /// How much money moves.
    pub amount: Money,
    /// The member who pays.
    #[serde(default)]
    pub from_member_id: Option<MemberId>,
    /// The member who is paid.
    #[serde(default)]
    pub to_member_id: Option<MemberId>,
    /// The task, service or reward the event is for.
    #[serde(default)]
    pub reference_id: Option<ReferenceId>,
    /// A note about the event.
    #[serde(default)]
    pub description: Option<String>,
}

/// The rules the ledger applies when posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Skip the balance check for a payer who has never had a snapshot.
    ///
    /// When false, a payer without a snapshot is treated as having a zero
    /// balance and cannot pay anything.
    pub allow_unchecked_first_debit: bool,

    /// Post ledger events when a task is completed or a reward is approved.
    pub post_workflow_events: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            allow_unchecked_first_debit: true,
            post_workflow_events: true,
        }
    }
}

/// A member's current balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberBalance {
    /// The member the balance belongs to.
    pub member_id: MemberId,
    /// Credits minus debits over the member's history.
    pub balance: Money,
    /// When the balance last changed, `None` if the member has no history.
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Create the transaction event and balance snapshot tables.
///
/// Updates to posted events are rejected by a trigger.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_ledger_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transaction_event (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL CHECK (event_type IN ('service', 'task', 'reward', 'transfer')),
                amount INTEGER NOT NULL CHECK (amount > 0),
                from_member_id TEXT REFERENCES family_member(id),
                to_member_id TEXT REFERENCES family_member(id),
                reference_id TEXT,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'confirmed',
                created_by TEXT NOT NULL REFERENCES user(id),
                created_at TEXT NOT NULL,
                CHECK (from_member_id IS NOT NULL OR to_member_id IS NOT NULL),
                CHECK (from_member_id IS NULL OR to_member_id IS NULL OR from_member_id != to_member_id)
                )",
        (),
    )?;

    connection.execute(
        "CREATE TRIGGER IF NOT EXISTS transaction_event_append_only
            BEFORE UPDATE ON transaction_event
            BEGIN
                SELECT RAISE(ABORT, 'transaction events are append-only');
            END",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_event_family ON transaction_event(family_id)",
        (),
    )?;
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_event_from ON transaction_event(from_member_id)",
        (),
    )?;
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_event_to ON transaction_event(to_member_id)",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS member_balance_snapshot (
                member_id TEXT PRIMARY KEY REFERENCES family_member(id) ON DELETE CASCADE,
                balance INTEGER NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn validate(new_event: &NewTransactionEvent) -> Result<(), Error> {
    if !new_event.amount.is_positive() {
        return Err(Error::InvalidInput(
            "the amount must be greater than zero".to_owned(),
        ));
    }

    match (new_event.from_member_id, new_event.to_member_id) {
        (None, None) => Err(Error::InvalidInput(
            "a transaction needs a payer, a payee or both".to_owned(),
        )),
        (Some(from), Some(to)) if from == to => Err(Error::InvalidInput(
            "a member cannot pay themselves".to_owned(),
        )),
        _ => Ok(()),
    }
}

/// Post an event to a family's ledger and update the balances it touches.
///
/// `actor` must be a member of the family. The whole operation runs in one
/// `IMMEDIATE` SQLite transaction, so either the event and both balance
/// changes are stored or nothing is.
///
/// # Errors
///
/// Returns:
/// - [Error::InvalidInput] if the amount is not positive, neither member is
///   given, or both are the same member,
/// - [Error::Forbidden] if `actor` is not a member of the family,
/// - [Error::NotFound] if a member is not part of the family,
/// - [Error::InsufficientBalance] if the payer cannot cover the amount,
/// - [Error::InvalidInput] if a resulting balance would be above
///   9,999,999,999.99 or below its negative.
pub fn post_event(
    new_event: NewTransactionEvent,
    actor: UserId,
    policy: &LedgerPolicy,
    connection: &Connection,
) -> Result<TransactionEvent, Error> {
    let transaction = begin_immediate(connection)?;
    let event = post_event_in(new_event, actor, policy, &transaction)?;
    transaction.commit()?;

    tracing::info!(
        "Posted {} event {} of {} in family {}",
        event.event_type.as_str(),
        event.id,
        event.amount,
        event.family_id
    );

    Ok(event)
}

/// Post an event as part of a transaction the caller already opened.
///
/// Nothing is committed; the caller commits or rolls back together with its
/// own changes. See [post_event] for the checks applied.
pub fn post_event_in(
    new_event: NewTransactionEvent,
    actor: UserId,
    policy: &LedgerPolicy,
    transaction: &SqlTransaction,
) -> Result<TransactionEvent, Error> {
    validate(&new_event)?;
    require_member(actor, new_event.family_id, transaction)?;

    if let Some(from_member_id) = new_event.from_member_id {
        get_member_of_family(
            from_member_id,
            new_event.family_id,
            "from member",
            transaction,
        )?;
    }

    if let Some(to_member_id) = new_event.to_member_id {
        get_member_of_family(to_member_id, new_event.family_id, "to member", transaction)?;
    }

    let payer_balance = match new_event.from_member_id {
        Some(from_member_id) => {
            let snapshot = get_snapshot(from_member_id, transaction)?;
            let available = match snapshot {
                Some(balance) => Some(balance),
                None if policy.allow_unchecked_first_debit => None,
                None => Some(Money::zero()),
            };

            if available.is_some_and(|balance| balance < new_event.amount) {
                return Err(Error::InsufficientBalance);
            }

            let balance = snapshot
                .unwrap_or_default()
                .checked_sub(new_event.amount)
                .ok_or_else(balance_out_of_range)?;
            Some((from_member_id, balance))
        }
        None => None,
    };

    let payee_balance = match new_event.to_member_id {
        Some(to_member_id) => {
            let balance = get_snapshot(to_member_id, transaction)?
                .unwrap_or_default()
                .checked_add(new_event.amount)
                .ok_or_else(balance_out_of_range)?;
            Some((to_member_id, balance))
        }
        None => None,
    };

    let event = TransactionEvent {
        id: TransactionId::new_random(),
        family_id: new_event.family_id,
        event_type: new_event.event_type,
        amount: new_event.amount,
        from_member_id: new_event.from_member_id,
        to_member_id: new_event.to_member_id,
        reference_id: new_event.reference_id,
        description: new_event.description,
        status: CONFIRMED.to_owned(),
        created_by: actor,
        created_at: OffsetDateTime::now_utc(),
    };

    transaction.execute(
        "INSERT INTO transaction_event
            (id, family_id, event_type, amount, from_member_id, to_member_id, reference_id,
             description, status, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            event.id,
            event.family_id,
            event.event_type,
            event.amount,
            event.from_member_id,
            event.to_member_id,
            event.reference_id,
            event.description,
            event.status,
            event.created_by,
            event.created_at,
        ],
    )?;

    for (member_id, balance) in payer_balance.into_iter().chain(payee_balance) {
        set_snapshot(member_id, balance, event.created_at, transaction)?;
    }

    Ok(event)
}

fn get_snapshot(member_id: MemberId, connection: &Connection) -> Result<Option<Money>, Error> {
    connection
        .query_row(
            "SELECT balance FROM member_balance_snapshot WHERE member_id = ?1",
            [member_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
}

fn balance_out_of_range() -> Error {
    Error::InvalidInput("the resulting balance is outside the supported range".to_owned())
}

fn set_snapshot(
    member_id: MemberId,
    balance: Money,
    updated_at: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO member_balance_snapshot (member_id, balance, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(member_id) DO UPDATE SET
            balance = excluded.balance,
            updated_at = excluded.updated_at",
        (member_id, balance, updated_at),
    )?;

    Ok(())
}

/// Get the current balance of a member, zero if they have no history.
pub fn get_balance(member_id: MemberId, connection: &Connection) -> Result<Money, Error> {
    get_snapshot(member_id, connection).map(|balance| balance.unwrap_or_default())
}

/// Get the balance of a member along with when it last changed.
pub fn get_member_balance(
    member_id: MemberId,
    connection: &Connection,
) -> Result<MemberBalance, Error> {
    let snapshot = connection
        .query_row(
            "SELECT balance, updated_at FROM member_balance_snapshot WHERE member_id = ?1",
            [member_id],
            |row| Ok((row.get::<_, Money>(0)?, row.get::<_, OffsetDateTime>(1)?)),
        )
        .optional()?;

    Ok(match snapshot {
        Some((balance, updated_at)) => MemberBalance {
            member_id,
            balance,
            updated_at: Some(updated_at),
        },
        None => MemberBalance {
            member_id,
            balance: Money::zero(),
            updated_at: None,
        },
    })
}

/// Get the balance of every member of a family, in the order they joined.
pub fn list_family_balances(
    family_id: FamilyId,
    connection: &Connection,
) -> Result<Vec<MemberBalance>, Error> {
    connection
        .prepare(
            "SELECT m.id, COALESCE(s.balance, 0), s.updated_at
             FROM family_member m
             LEFT JOIN member_balance_snapshot s ON s.member_id = m.id
             WHERE m.family_id = ?1
             ORDER BY m.rowid",
        )?
        .query_map([family_id], |row| {
            Ok(MemberBalance {
                member_id: row.get(0)?,
                balance: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?
        .map(|maybe_balance| maybe_balance.map_err(Error::from))
        .collect()
}

/// Derive a member's balance from their full event history, ignoring the
/// snapshot.
pub fn recompute_balance(member_id: MemberId, connection: &Connection) -> Result<Money, Error> {
    let mut statement = connection.prepare(
        "SELECT amount, from_member_id IS ?1 FROM transaction_event
         WHERE from_member_id = ?1 OR to_member_id = ?1
         ORDER BY rowid",
    )?;

    let entries = statement.query_map([member_id], |row| {
        Ok((row.get::<_, Money>(0)?, row.get::<_, bool>(1)?))
    })?;

    entries.into_iter().try_fold(Money::zero(), |balance, entry| {
        let (amount, is_debit) = entry?;
        let balance = if is_debit {
            balance.checked_sub(amount)
        } else {
            balance.checked_add(amount)
        };
        balance.ok_or_else(balance_out_of_range)
    })
}

const SELECT_EVENT: &str = "SELECT id, family_id, event_type, amount, from_member_id, to_member_id, reference_id, description, status, created_by, created_at FROM transaction_event";

fn map_event_row(row: &Row) -> Result<TransactionEvent, rusqlite::Error> {
    Ok(TransactionEvent {
        id: row.get(0)?,
        family_id: row.get(1)?,
        event_type: row.get(2)?,
        amount: row.get(3)?,
        from_member_id: row.get(4)?,
        to_member_id: row.get(5)?,
        reference_id: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        created_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Get the event with `transaction_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the event does not exist.
pub fn get_event(
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<TransactionEvent, Error> {
    connection
        .prepare(&format!("{SELECT_EVENT} WHERE id = ?1"))?
        .query_row([transaction_id], map_event_row)
        .optional()?
        .ok_or(Error::NotFound("transaction"))
}

/// List events in the order they were posted.
///
/// For [Scope::User], the events where one of the user's memberships paid or
/// was paid are listed.
pub fn list_events(
    scope: Scope,
    paging: Paging,
    connection: &Connection,
) -> Result<Vec<TransactionEvent>, Error> {
    let (filter, id) = match scope {
        Scope::Family(family_id) => ("family_id = ?1", family_id.to_string()),
        Scope::User(user_id) => (
            "from_member_id IN (SELECT id FROM family_member WHERE user_id = ?1)
             OR to_member_id IN (SELECT id FROM family_member WHERE user_id = ?1)",
            user_id.to_string(),
        ),
    };

    connection
        .prepare(&format!(
            "{SELECT_EVENT} WHERE {filter} ORDER BY rowid LIMIT ?2 OFFSET ?3"
        ))?
        .query_map((id, paging.limit, paging.offset), map_event_row)?
        .map(|maybe_event| maybe_event.map_err(Error::from))
        .collect()
}
