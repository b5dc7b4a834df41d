//! The state store: sole owner of the [`Snapshot`].
//!
//! The snapshot lives inside a `tokio::sync::watch` channel. Each commit
//! runs synchronously under the channel's lock, so readers observe either
//! the state before a mutation or the state after it, never a mix. The
//! same channel notifies subscribers after every successful commit.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::error::{PreconditionError, RemoteError};
use crate::model::{Meetup, MeetupPatch, User};
use crate::mutation::Mutation;
use crate::snapshot::Snapshot;

/// Cloneable handle to the application state.
///
/// Constructed explicitly and passed to [`Workflows`](crate::Workflows) and
/// [`ReadViews`](crate::ReadViews); there is no global instance. `Clone` is
/// cheap -- all handles share the same `Arc`-wrapped channel.
#[derive(Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.tx.borrow();
        f.debug_struct("StateStore")
            .field("meetups", &snapshot.meetups.len())
            .field("signed_in", &snapshot.user.is_some())
            .field("loading", &snapshot.loading)
            .finish()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create a store holding an empty snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::default())
    }

    /// Create a store seeded with an existing snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let (tx, _rx) = watch::channel(snapshot);
        Self { tx: Arc::new(tx) }
    }

    /// Apply a mutation atomically and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] if the mutation cannot be applied to
    /// the current snapshot. The snapshot is unchanged and subscribers are
    /// not notified in that case.
    pub fn commit(&self, mutation: Mutation) -> Result<(), PreconditionError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|snapshot| match snapshot.apply(&mutation) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        match &outcome {
            Ok(()) => tracing::debug!(mutation = mutation.name(), "mutation committed"),
            Err(e) => tracing::warn!(mutation = mutation.name(), error = %e, "mutation rejected"),
        }
        outcome
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current snapshot without cloning it.
    ///
    /// `f` must not call back into [`commit`](StateStore::commit) on this
    /// store; the snapshot is read-locked for the duration of the call.
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Receiver that is marked changed after every successful commit.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Stream of snapshots: the current one, then one per commit.
    ///
    /// Intermediate snapshots may be skipped if the consumer falls behind;
    /// the latest state is always delivered.
    pub fn changes(&self) -> WatchStream<Snapshot> {
        WatchStream::new(self.subscribe())
    }

    // --- Named mutation primitives ---

    /// Replace the cached meetups.
    pub fn set_meetups(&self, meetups: Vec<Meetup>) {
        self.commit_total(Mutation::SetMeetups(meetups));
    }

    /// Append a meetup to the cache.
    pub fn add_meetup(&self, meetup: Meetup) {
        self.commit_total(Mutation::AddMeetup(meetup));
    }

    /// Apply `patch` to the cached meetup `id`, if present.
    pub fn update_meetup(&self, id: impl Into<String>, patch: MeetupPatch) {
        self.commit_total(Mutation::UpdateMeetup {
            id: id.into(),
            patch,
        });
    }

    /// Replace the current user; `None` signs out.
    pub fn set_user(&self, user: Option<User>) {
        self.commit_total(Mutation::SetUser(user));
    }

    /// Record a registration for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError::NoCurrentUser`] when signed out.
    pub fn register_user_for_meetup(
        &self,
        meetup_id: impl Into<String>,
        registration_key: impl Into<String>,
    ) -> Result<(), PreconditionError> {
        self.commit(Mutation::RegisterUserForMeetup {
            meetup_id: meetup_id.into(),
            registration_key: registration_key.into(),
        })
    }

    /// Drop the current user's registration for `meetup_id`, if any.
    pub fn unregister_user_from_meetup(&self, meetup_id: impl Into<String>) {
        self.commit_total(Mutation::UnregisterUserFromMeetup {
            meetup_id: meetup_id.into(),
        });
    }

    /// Set the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.commit_total(Mutation::SetLoading(loading));
    }

    /// Record an identity failure.
    pub fn set_error(&self, error: RemoteError) {
        self.commit_total(Mutation::SetError(error));
    }

    /// Clear the recorded error.
    pub fn clear_error(&self) {
        self.commit_total(Mutation::ClearError);
    }

    /// Commit a mutation that [`Snapshot::apply`] never rejects.
    fn commit_total(&self, mutation: Mutation) {
        // Only `RegisterUserForMeetup` can fail, and it never comes through here.
        let _ = self.commit(mutation);
    }

    /// Set `loading` now and clear it when the returned guard drops.
    pub(crate) fn loading_scope(&self) -> LoadingGuard {
        self.set_loading(true);
        LoadingGuard {
            store: self.clone(),
        }
    }
}

/// Clears the loading flag on drop.
///
/// Held for the lifetime of a workflow so every exit path -- success,
/// error, early return, or the future being dropped -- resets `loading`.
pub(crate) struct LoadingGuard {
    store: StateStore,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.store.set_loading(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn commit_applies_and_snapshot_reflects() {
        let store = StateStore::new();
        store.set_user(Some(User::new("u1")));
        store
            .register_user_for_meetup("m1", "k1")
            .expect("signed in, should register");

        let user = store.snapshot().user.expect("user should be set");
        assert!(user.is_registered("m1"));
    }

    #[test]
    fn rejected_commit_does_not_notify() {
        let store = StateStore::new();
        let rx = store.subscribe();

        let err = store.register_user_for_meetup("m1", "k1").unwrap_err();
        assert_eq!(err, PreconditionError::NoCurrentUser);
        assert!(!rx.has_changed().expect("sender alive"));
    }

    #[test]
    fn successful_commit_notifies_subscribers() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.set_loading(true);
        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().loading);
    }

    #[test]
    fn clones_share_state() {
        let store = StateStore::new();
        let other = store.clone();
        other.set_meetups(vec![]);
        other.set_error(RemoteError::new("x"));
        assert!(store.read(|s| s.error.is_some()));
        store.clear_error();
        assert!(other.read(|s| s.error.is_none()));
    }

    #[test]
    fn loading_guard_clears_on_drop() {
        let store = StateStore::new();
        {
            let _guard = store.loading_scope();
            assert!(store.read(|s| s.loading));
        }
        assert!(!store.read(|s| s.loading));
    }

    #[tokio::test]
    async fn changes_stream_yields_current_then_updates() {
        let store = StateStore::new();
        let mut changes = store.changes();

        let first = changes.next().await.expect("initial snapshot");
        assert!(!first.loading);

        store.set_loading(true);
        let second = changes.next().await.expect("updated snapshot");
        assert!(second.loading);
    }

    #[test]
    fn debug_output_summarizes_state() {
        let store = StateStore::new();
        let out = format!("{store:?}");
        assert!(out.contains("StateStore"));
        assert!(out.contains("signed_in: false"));
    }
}
