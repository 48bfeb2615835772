//! Bounty tasks: jobs a member posts with a reward for whoever does them.
//!
//! A task moves `open → in_progress → completed`, or to `cancelled` from
//! either of the first two. Completing a task pays its reward from the
//! creator to the assignee through the ledger.

use rusqlite::{
    Connection, OptionalExtension, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FamilyId, MemberId, Money, Patch, TaskId, UserId,
    db::begin_immediate,
    family::{
        Scope,
        gate::{require_member, require_party_or_admin},
        get_member_of_family,
    },
    ledger::{EventType, LedgerPolicy, NewTransactionEvent, post_event_in},
    pagination::Paging,
};

/// Where a bounty task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for someone to pick it up.
    Open,
    /// Being worked on.
    InProgress,
    /// Done and paid out.
    Completed,
    /// Called off.
    Cancelled,
}

impl TaskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Whether no further changes are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Whether a task may move from this status to `next`.
    ///
    /// Staying in the same status is always allowed.
    pub fn can_become(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        *self == next
            || matches!(
                (self, next),
                (Open, InProgress) | (InProgress, Completed) | (Open | InProgress, Cancelled)
            )
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(FromSqlError::Other(
                format!("unknown task status {other:?}").into(),
            )),
        }
    }
}

/// A job posted with a reward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BountyTask {
    /// The ID of the task.
    pub id: TaskId,
    /// The family the task belongs to.
    pub family_id: FamilyId,
    /// What needs doing.
    pub title: String,
    /// What the assignee is paid on completion.
    pub reward_amount: Money,
    /// The member who posted the task and pays the reward.
    pub created_by: MemberId,
    /// The member doing the task.
    pub assigned_to: Option<MemberId>,
    /// Where the task is in its life.
    pub status: TaskStatus,
    /// When the task was posted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data needed to post a task.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    /// The family to post the task in.
    pub family_id: FamilyId,
    /// What needs doing.
    pub title: String,
    /// What the assignee is paid on completion.
    pub reward_amount: Money,
    /// The member posting the task, the caller's membership if not given.
    #[serde(default)]
    pub created_by: Option<MemberId>,
    /// The member to do the task.
    #[serde(default)]
    pub assigned_to: Option<MemberId>,
}

/// A change to a task.
#[derive(Debug, Default, Deserialize)]
pub struct TaskUpdate {
    /// The new title.
    #[serde(default)]
    pub title: Patch<String>,
    /// The new reward.
    #[serde(default)]
    pub reward_amount: Patch<Money>,
    /// The new assignee, `null` to unassign.
    #[serde(default)]
    pub assigned_to: Patch<MemberId>,
    /// The new status.
    #[serde(default)]
    pub status: Patch<TaskStatus>,
}

/// Create the bounty task table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_task_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS bounty_task (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                reward_amount INTEGER NOT NULL CHECK (reward_amount > 0),
                created_by TEXT NOT NULL REFERENCES family_member(id),
                assigned_to TEXT REFERENCES family_member(id),
                status TEXT NOT NULL CHECK (status IN ('open', 'in_progress', 'completed', 'cancelled')),
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_bounty_task_family ON bounty_task(family_id)",
        (),
    )?;

    Ok(())
}

fn validate_title(title: &str) -> Result<(), Error> {
    if title.trim().is_empty() {
        Err(Error::InvalidInput("the title cannot be empty".to_owned()))
    } else {
        Ok(())
    }
}

fn validate_reward(reward_amount: Money) -> Result<(), Error> {
    if reward_amount.is_positive() {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "the reward must be greater than zero".to_owned(),
        ))
    }
}

/// Post a new open task.
///
/// # Errors
///
/// Returns:
/// - [Error::Forbidden] if `actor` is not a member of the family,
/// - [Error::NotFound] if the creator or assignee is not part of the family,
/// - [Error::InvalidInput] if the title is blank or the reward not positive.
pub fn create_task(
    new_task: NewTask,
    actor: UserId,
    connection: &Connection,
) -> Result<BountyTask, Error> {
    validate_title(&new_task.title)?;
    validate_reward(new_task.reward_amount)?;

    let membership = require_member(actor, new_task.family_id, connection)?;
    let created_by = new_task.created_by.unwrap_or(membership.id);
    get_member_of_family(created_by, new_task.family_id, "creator", connection)?;

    if let Some(assigned_to) = new_task.assigned_to {
        get_member_of_family(assigned_to, new_task.family_id, "assignee", connection)?;
    }

    let task = BountyTask {
        id: TaskId::new_random(),
        family_id: new_task.family_id,
        title: new_task.title.trim().to_owned(),
        reward_amount: new_task.reward_amount,
        created_by,
        assigned_to: new_task.assigned_to,
        status: TaskStatus::Open,
        created_at: OffsetDateTime::now_utc(),
    };

    connection.execute(
        "INSERT INTO bounty_task (id, family_id, title, reward_amount, created_by, assigned_to, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            task.id,
            task.family_id,
            &task.title,
            task.reward_amount,
            task.created_by,
            task.assigned_to,
            task.status,
            task.created_at,
        ),
    )?;

    Ok(task)
}

const SELECT_TASK: &str = "SELECT id, family_id, title, reward_amount, created_by, assigned_to, status, created_at FROM bounty_task";

fn map_task_row(row: &Row) -> Result<BountyTask, rusqlite::Error> {
    Ok(BountyTask {
        id: row.get(0)?,
        family_id: row.get(1)?,
        title: row.get(2)?,
        reward_amount: row.get(3)?,
        created_by: row.get(4)?,
        assigned_to: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Get the task with `task_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the task does not exist.
pub fn get_task(task_id: TaskId, connection: &Connection) -> Result<BountyTask, Error> {
    connection
        .prepare(&format!("{SELECT_TASK} WHERE id = ?1"))?
        .query_row([task_id], map_task_row)
        .optional()?
        .ok_or(Error::NotFound("task"))
}

/// List tasks in the order they were posted.
///
/// For [Scope::User], the tasks created by or assigned to one of the user's
/// memberships are listed.
pub fn list_tasks(
    scope: Scope,
    paging: Paging,
    connection: &Connection,
) -> Result<Vec<BountyTask>, Error> {
    let (filter, id) = match scope {
        Scope::Family(family_id) => ("family_id = ?1", family_id.to_string()),
        Scope::User(user_id) => (
            "created_by IN (SELECT id FROM family_member WHERE user_id = ?1)
             OR assigned_to IN (SELECT id FROM family_member WHERE user_id = ?1)",
            user_id.to_string(),
        ),
    };

    connection
        .prepare(&format!(
            "{SELECT_TASK} WHERE {filter} ORDER BY rowid LIMIT ?2 OFFSET ?3"
        ))?
        .query_map((id, paging.limit, paging.offset), map_task_row)?
        .map(|maybe_task| maybe_task.map_err(Error::from))
        .collect()
}

/// Apply `update` to a task.
///
/// Any member of the task's family may update it. Moving the task to
/// `completed` pays the reward from the creator to the assignee when
/// `policy.post_workflow_events` is set; the payment and the status change
/// are committed together, so a failed payment leaves the task unchanged.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the task or the new assignee does not exist,
/// - [Error::Forbidden] if `actor` is not a member of the task's family,
/// - [Error::InvalidInput] if the task is already finished, the status
///   change is not allowed, or the task is completed without an assignee,
/// - [Error::InsufficientBalance] if the creator cannot pay the reward.
pub fn update_task(
    task_id: TaskId,
    update: TaskUpdate,
    actor: UserId,
    policy: &LedgerPolicy,
    connection: &Connection,
) -> Result<BountyTask, Error> {
    let transaction = begin_immediate(connection)?;
    let mut task = get_task(task_id, &transaction)?;
    require_member(actor, task.family_id, &transaction)?;

    let previous_status = task.status;

    if previous_status.is_terminal() {
        let is_noop = update.title.is_absent()
            && update.reward_amount.is_absent()
            && update.assigned_to.is_absent()
            && (update.status.is_absent() || update.status == Patch::Value(previous_status));

        if is_noop {
            return Ok(task);
        }

        return Err(Error::InvalidInput(format!(
            "the task is already {}",
            previous_status.as_str()
        )));
    }

    update.title.apply_to_required(&mut task.title, "title")?;
    validate_title(&task.title)?;
    task.title = task.title.trim().to_owned();

    update
        .reward_amount
        .apply_to_required(&mut task.reward_amount, "reward_amount")?;
    validate_reward(task.reward_amount)?;

    update.assigned_to.apply_to(&mut task.assigned_to);
    if let Some(assigned_to) = task.assigned_to {
        get_member_of_family(assigned_to, task.family_id, "assignee", &transaction)?;
    }

    update.status.apply_to_required(&mut task.status, "status")?;
    if !previous_status.can_become(task.status) {
        return Err(Error::InvalidInput(format!(
            "a task cannot go from {} to {}",
            previous_status.as_str(),
            task.status.as_str()
        )));
    }

    if task.status == TaskStatus::Completed && policy.post_workflow_events {
        let Some(assigned_to) = task.assigned_to else {
            return Err(Error::InvalidInput(
                "a task must be assigned before it can be completed".to_owned(),
            ));
        };

        post_event_in(
            NewTransactionEvent {
                family_id: task.family_id,
                event_type: EventType::Task,
                amount: task.reward_amount,
                from_member_id: Some(task.created_by),
                to_member_id: Some(assigned_to),
                reference_id: Some(task.id.into()),
                description: Some(format!("Bounty task: {}", task.title)),
            },
            actor,
            policy,
            &transaction,
        )?;
    }

    transaction.execute(
        "UPDATE bounty_task SET title = ?1, reward_amount = ?2, assigned_to = ?3, status = ?4 WHERE id = ?5",
        (
            &task.title,
            task.reward_amount,
            task.assigned_to,
            task.status,
            task.id,
        ),
    )?;

    transaction.commit()?;

    if task.status != previous_status {
        tracing::info!(
            "Task {} went from {} to {}",
            task.id,
            previous_status.as_str(),
            task.status.as_str()
        );
    }

    Ok(task)
}

/// Delete a task. Only its creator or a family admin may do this.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the task does not exist, or an
/// [Error::Forbidden] if `actor` is neither the creator nor an admin.
pub fn delete_task(task_id: TaskId, actor: UserId, connection: &Connection) -> Result<(), Error> {
    let task = get_task(task_id, connection)?;
    require_party_or_admin(actor, task.family_id, &[task.created_by], connection)?;

    connection.execute("DELETE FROM bounty_task WHERE id = ?1", [task.id])?;

    Ok(())
}
