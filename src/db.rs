//! Database set-up and the helpers shared by every module that touches SQLite.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    auth::create_user_table,
    family::create_family_tables,
    ledger::create_ledger_tables,
    reward::create_reward_table,
    service::create_service_table,
    task::create_task_table,
};

/// Create the tables for all the domain models if they do not exist yet.
///
/// Foreign key enforcement is switched on for `connection`, since the
/// family cascade and the member reference checks rely on it.
///
/// # Errors
/// Returns an error if any of the tables could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_family_tables(&transaction)?;
    create_ledger_tables(&transaction)?;
    create_task_table(&transaction)?;
    create_service_table(&transaction)?;
    create_reward_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Acquire the shared database connection for the current request.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the lock is poisoned.
pub(crate) fn lock_connection(
    db_connection: &Mutex<Connection>,
) -> Result<MutexGuard<'_, Connection>, Error> {
    db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}

/// Start a transaction that takes the database write lock immediately.
///
/// Read-check-write sequences (e.g. a balance check followed by a debit) must
/// run inside one of these so no other writer can interleave.
pub(crate) fn begin_immediate(connection: &Connection) -> Result<SqlTransaction<'_>, Error> {
    SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate).map_err(Error::from)
}
