//! Newtype wrappers for the UUID primary keys of each table.
//!
//! Each ID type is distinct so that, for example, a [MemberId] cannot be passed
//! where a [UserId] is expected. IDs are stored in SQLite as hyphenated TEXT
//! and serialised to JSON as strings.

use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random (v4) ID.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.hyphenated().to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Uuid::parse_str(text)
                    .map(Self)
                    .map_err(|error| FromSqlError::Other(Box::new(error)))
            }
        }
    };
}

uuid_id!(
    /// The ID of a registered user.
    UserId
);
uuid_id!(
    /// The ID of a family.
    FamilyId
);
uuid_id!(
    /// The ID of a family membership, the unit every domain record refers to.
    MemberId
);
uuid_id!(
    /// The ID of a bounty task.
    TaskId
);
uuid_id!(
    /// The ID of a paid service.
    ServiceId
);
uuid_id!(
    /// The ID of a reward request.
    RewardId
);
uuid_id!(
    /// The ID of a ledger transaction event.
    TransactionId
);
uuid_id!(
    /// The ID of the task, service or reward that a transaction event was
    /// posted for.
    ReferenceId
);

impl From<TaskId> for ReferenceId {
    fn from(value: TaskId) -> Self {
        Self(value.0)
    }
}

impl From<ServiceId> for ReferenceId {
    fn from(value: ServiceId) -> Self {
        Self(value.0)
    }
}

impl From<RewardId> for ReferenceId {
    fn from(value: RewardId) -> Self {
        Self(value.0)
    }
}
