//! The closed set of state transitions the store accepts.

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::model::{Meetup, MeetupPatch, User};

/// A single, synchronous transition of the [`Snapshot`](crate::Snapshot).
///
/// Workflows never touch the snapshot directly; they submit mutations to
/// the [`StateStore`](crate::StateStore), which applies each one to
/// completion before any reader can observe it.
///
/// Uses adjacently tagged serialization (`"type"` + `"data"`) so a mutation
/// log can be recorded or replayed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Mutation {
    /// Replace the cached meetups wholesale.
    SetMeetups(Vec<Meetup>),
    /// Append one meetup. Duplicate ids are not checked.
    AddMeetup(Meetup),
    /// Partially update a cached meetup; no-op if it is not cached.
    UpdateMeetup { id: String, patch: MeetupPatch },
    /// Replace the current user; `None` means signed out.
    SetUser(Option<User>),
    /// Record a registration for the current user. Idempotent.
    RegisterUserForMeetup {
        meetup_id: String,
        registration_key: String,
    },
    /// Drop a registration from the current user; no-op if absent.
    UnregisterUserFromMeetup { meetup_id: String },
    /// Set or clear the in-flight indicator.
    SetLoading(bool),
    /// Record the last identity failure.
    SetError(RemoteError),
    /// Drop the recorded error.
    ClearError,
}

impl Mutation {
    /// Short name used as a structured logging field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetMeetups(_) => "set_meetups",
            Self::AddMeetup(_) => "add_meetup",
            Self::UpdateMeetup { .. } => "update_meetup",
            Self::SetUser(_) => "set_user",
            Self::RegisterUserForMeetup { .. } => "register_user_for_meetup",
            Self::UnregisterUserFromMeetup { .. } => "unregister_user_from_meetup",
            Self::SetLoading(_) => "set_loading",
            Self::SetError(_) => "set_error",
            Self::ClearError => "clear_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_adjacently_tagged() {
        let m = Mutation::RegisterUserForMeetup {
            meetup_id: "m1".into(),
            registration_key: "k1".into(),
        };
        let value = serde_json::to_value(&m).expect("serialization should succeed");
        assert_eq!(
            value,
            json!({
                "type": "RegisterUserForMeetup",
                "data": { "meetup_id": "m1", "registration_key": "k1" }
            })
        );
    }

    #[test]
    fn fieldless_variant_has_no_data() {
        let value = serde_json::to_value(Mutation::ClearError).unwrap();
        assert_eq!(value, json!({ "type": "ClearError" }));
    }

    #[test]
    fn deserializes_from_log_entry() {
        let m: Mutation = serde_json::from_value(json!({ "type": "SetLoading", "data": true }))
            .expect("deserialization should succeed");
        assert_eq!(m, Mutation::SetLoading(true));
        assert_eq!(m.name(), "set_loading");
    }
}
