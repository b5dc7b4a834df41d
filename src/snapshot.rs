//! The in-memory state owned by the store and the pure transition function
//! that folds a [`Mutation`] into it.

use serde::{Deserialize, Serialize};

use crate::error::{PreconditionError, RemoteError};
use crate::model::{Meetup, User};
use crate::mutation::Mutation;

/// Complete application state at a point in time.
///
/// `loading` is only `true` while a workflow is between its first and
/// terminal step. `error` holds the last identity-related failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meetups: Vec<Meetup>,
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<RemoteError>,
}

impl Snapshot {
    /// Apply a single mutation in place.
    ///
    /// Every mutation is total except
    /// [`RegisterUserForMeetup`](Mutation::RegisterUserForMeetup), which
    /// needs a signed-in user. On error the snapshot is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError::NoCurrentUser`] when registering while
    /// signed out.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), PreconditionError> {
        match mutation {
            Mutation::SetMeetups(meetups) => self.meetups = meetups.clone(),
            Mutation::AddMeetup(meetup) => self.meetups.push(meetup.clone()),
            Mutation::UpdateMeetup { id, patch } => {
                if let Some(meetup) = self.meetups.iter_mut().find(|m| &m.id == id) {
                    meetup.apply_patch(patch);
                }
            }
            Mutation::SetUser(user) => self.user = user.clone(),
            Mutation::RegisterUserForMeetup {
                meetup_id,
                registration_key,
            } => {
                let user = self
                    .user
                    .as_mut()
                    .ok_or(PreconditionError::NoCurrentUser)?;
                user.register(meetup_id, registration_key);
            }
            Mutation::UnregisterUserFromMeetup { meetup_id } => {
                if let Some(user) = self.user.as_mut() {
                    user.unregister(meetup_id);
                }
            }
            Mutation::SetLoading(loading) => self.loading = *loading,
            Mutation::SetError(error) => self.error = Some(error.clone()),
            Mutation::ClearError => self.error = None,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MeetupPatch;

    fn meetup(id: &str, title: &str) -> Meetup {
        Meetup {
            id: id.into(),
            title: title.into(),
            location: "Room 1".into(),
            description: "d".into(),
            image_url: None,
            date: "2024-01-01T00:00:00.000Z".into(),
            creator_id: "u1".into(),
        }
    }

    fn signed_in() -> Snapshot {
        Snapshot {
            user: Some(User::new("u1")),
            ..Snapshot::default()
        }
    }

    /// Every key in the registration map must also be a registered meetup.
    fn assert_subset(snapshot: &Snapshot) {
        if let Some(user) = &snapshot.user {
            for (meetup_id, _) in user.registration_keys() {
                assert!(user.is_registered(meetup_id), "{meetup_id} missing from set");
            }
        }
    }

    #[test]
    fn set_and_add_meetups() {
        let mut s = Snapshot::default();
        s.apply(&Mutation::SetMeetups(vec![meetup("a", "A")])).unwrap();
        s.apply(&Mutation::AddMeetup(meetup("a", "dup"))).unwrap();
        assert_eq!(s.meetups.len(), 2, "add does not dedupe");

        s.apply(&Mutation::SetMeetups(vec![])).unwrap();
        assert!(s.meetups.is_empty());
    }

    #[test]
    fn update_missing_meetup_is_noop() {
        let mut s = Snapshot::default();
        s.apply(&Mutation::SetMeetups(vec![meetup("a", "A")])).unwrap();
        let before = s.clone();
        s.apply(&Mutation::UpdateMeetup {
            id: "zzz".into(),
            patch: MeetupPatch::title("X"),
        })
        .unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn update_changes_only_given_fields() {
        let mut s = Snapshot::default();
        s.apply(&Mutation::SetMeetups(vec![meetup("a", "A")])).unwrap();
        s.apply(&Mutation::UpdateMeetup {
            id: "a".into(),
            patch: MeetupPatch::title("X"),
        })
        .unwrap();
        let m = &s.meetups[0];
        assert_eq!(m.title, "X");
        assert_eq!(m.location, "Room 1");
        assert_eq!(m.description, "d");
        assert_eq!(m.date, "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn register_without_user_fails_and_leaves_state() {
        let mut s = Snapshot::default();
        let result = s.apply(&Mutation::RegisterUserForMeetup {
            meetup_id: "m1".into(),
            registration_key: "k1".into(),
        });
        assert_eq!(result, Err(PreconditionError::NoCurrentUser));
        assert_eq!(s, Snapshot::default());
    }

    #[test]
    fn register_twice_equals_register_once() {
        let register = Mutation::RegisterUserForMeetup {
            meetup_id: "m1".into(),
            registration_key: "k1".into(),
        };
        let mut once = signed_in();
        once.apply(&register).unwrap();

        let mut twice = signed_in();
        twice.apply(&register).unwrap();
        twice
            .apply(&Mutation::RegisterUserForMeetup {
                meetup_id: "m1".into(),
                registration_key: "k2".into(),
            })
            .unwrap();

        assert_eq!(once, twice);
        assert_subset(&twice);
    }

    #[test]
    fn unregister_absent_is_noop_even_signed_out() {
        let mut s = Snapshot::default();
        s.apply(&Mutation::UnregisterUserFromMeetup {
            meetup_id: "m1".into(),
        })
        .unwrap();
        assert_eq!(s, Snapshot::default());
    }

    #[test]
    fn subset_invariant_holds_across_sequence() {
        let mut s = signed_in();
        let steps = [
            Mutation::RegisterUserForMeetup {
                meetup_id: "m1".into(),
                registration_key: "k1".into(),
            },
            Mutation::RegisterUserForMeetup {
                meetup_id: "m2".into(),
                registration_key: "k2".into(),
            },
            Mutation::UnregisterUserFromMeetup {
                meetup_id: "m1".into(),
            },
            Mutation::UnregisterUserFromMeetup {
                meetup_id: "m9".into(),
            },
            Mutation::RegisterUserForMeetup {
                meetup_id: "m1".into(),
                registration_key: "k3".into(),
            },
        ];
        for step in &steps {
            s.apply(step).unwrap();
            assert_subset(&s);
        }
        let user = s.user.as_ref().unwrap();
        assert_eq!(user.registration_key("m1"), Some("k3"));
        assert_eq!(user.registration_key("m2"), Some("k2"));
    }

    #[test]
    fn flags_and_error_transitions() {
        let mut s = Snapshot::default();
        s.apply(&Mutation::SetLoading(true)).unwrap();
        s.apply(&Mutation::SetError(RemoteError::new("boom"))).unwrap();
        assert!(s.loading);
        assert_eq!(s.error.as_ref().map(|e| e.message.as_str()), Some("boom"));

        s.apply(&Mutation::ClearError).unwrap();
        s.apply(&Mutation::SetLoading(false)).unwrap();
        assert!(!s.loading);
        assert!(s.error.is_none());
    }

    #[test]
    fn set_user_none_signs_out() {
        let mut s = signed_in();
        s.apply(&Mutation::SetUser(None)).unwrap();
        assert!(s.user.is_none());
    }
}
