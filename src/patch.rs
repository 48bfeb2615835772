//! Tri-state values for partial updates.
//!
//! A JSON update body can leave a field out, set it to `null`, or set it to a
//! value. `Option<T>` cannot tell the first two apart, so update payloads use
//! [Patch] with `#[serde(default)]` on each field.

use serde::{Deserialize, Deserializer};

use crate::Error;

/// One field of a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    /// The field was not present; leave the stored value alone.
    #[default]
    Absent,
    /// The field was explicitly `null`; clear the stored value.
    Null,
    /// The field was set to a new value.
    Value(T),
}

impl<T> Patch<T> {
    /// Whether the field was left out of the update.
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Apply the patch to a nullable field.
    pub fn apply_to(self, field: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Null => *field = None,
            Patch::Value(value) => *field = Some(value),
        }
    }

    /// Apply the patch to a field that must always have a value.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidInput] naming `field_name` if the patch is `null`.
    pub fn apply_to_required(self, field: &mut T, field_name: &str) -> Result<(), Error> {
        match self {
            Patch::Absent => Ok(()),
            Patch::Null => Err(Error::InvalidInput(format!("{field_name} cannot be null"))),
            Patch::Value(value) => {
                *field = value;
                Ok(())
            }
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only called when the field is present, missing fields use `Default`.
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}
