//! Derived, read-only views over the [`Snapshot`].
//!
//! Every view is a pure function of the snapshot: no I/O, no mutation. The
//! free functions work on any `&Snapshot`; [`ReadViews`] binds them to a
//! live [`StateStore`] for callers that just want the current answer.

use std::cmp::Ordering;

use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::model::{Meetup, User};
use crate::snapshot::Snapshot;
use crate::store::StateStore;

/// Three-way ordering of two meetups by date.
///
/// Dates are compared as parsed RFC 3339 instants, so offsets and
/// precision differences order correctly. Meetups whose date does not
/// parse sort after all parseable ones, and among themselves by raw string.
pub fn compare_by_date(a: &Meetup, b: &Meetup) -> Ordering {
    match (a.parsed_date(), b.parsed_date()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.date.cmp(&b.date),
    }
}

/// All cached meetups, earliest first. The sort is stable.
pub fn all_meetups(snapshot: &Snapshot) -> Vec<Meetup> {
    let mut meetups = snapshot.meetups.clone();
    meetups.sort_by(compare_by_date);
    meetups
}

/// The first `n` meetups of [`all_meetups`].
pub fn featured(snapshot: &Snapshot, n: usize) -> Vec<Meetup> {
    let mut meetups = all_meetups(snapshot);
    meetups.truncate(n);
    meetups
}

/// The cached meetup with the given id.
pub fn meetup_by_id<'a>(snapshot: &'a Snapshot, id: &str) -> Option<&'a Meetup> {
    snapshot.meetups.iter().find(|m| m.id == id)
}

/// Cached meetups the current user is registered for, earliest first.
///
/// Registrations for meetups that are not cached are left out.
pub fn registered_meetups(snapshot: &Snapshot) -> Vec<Meetup> {
    let Some(user) = &snapshot.user else {
        return Vec::new();
    };
    let mut meetups: Vec<Meetup> = snapshot
        .meetups
        .iter()
        .filter(|m| user.is_registered(&m.id))
        .cloned()
        .collect();
    meetups.sort_by(compare_by_date);
    meetups
}

/// Read handle that answers view queries against a live store.
///
/// `Clone` is cheap; it shares the store.
#[derive(Debug, Clone)]
pub struct ReadViews {
    store: StateStore,
    featured_count: usize,
}

impl ReadViews {
    /// Views with the default featured count.
    pub fn new(store: StateStore) -> Self {
        Self::with_config(store, &SyncConfig::default())
    }

    /// Views using `config.featured_count`.
    pub fn with_config(store: StateStore, config: &SyncConfig) -> Self {
        Self {
            store,
            featured_count: config.featured_count,
        }
    }

    /// All cached meetups, earliest first.
    pub fn all_meetups(&self) -> Vec<Meetup> {
        self.store.read(all_meetups)
    }

    /// The configured number of earliest meetups (5 by default).
    pub fn featured(&self) -> Vec<Meetup> {
        self.featured_n(self.featured_count)
    }

    /// The `n` earliest meetups.
    pub fn featured_n(&self, n: usize) -> Vec<Meetup> {
        self.store.read(|s| featured(s, n))
    }

    /// The cached meetup with the given id.
    pub fn meetup(&self, id: &str) -> Option<Meetup> {
        self.store.read(|s| meetup_by_id(s, id).cloned())
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<User> {
        self.store.read(|s| s.user.clone())
    }

    /// The last recorded identity failure.
    pub fn current_error(&self) -> Option<RemoteError> {
        self.store.read(|s| s.error.clone())
    }

    /// Whether a workflow is in flight.
    pub fn is_loading(&self) -> bool {
        self.store.read(|s| s.loading)
    }

    /// Cached meetups the current user is registered for, earliest first.
    pub fn registered_meetups(&self) -> Vec<Meetup> {
        self.store.read(registered_meetups)
    }

    /// Whether the current user is registered for `meetup_id`.
    /// Always `false` when signed out.
    pub fn is_registered(&self, meetup_id: &str) -> bool {
        self.store.read(|s| {
            s.user
                .as_ref()
                .is_some_and(|u| u.is_registered(meetup_id))
        })
    }

    /// Whether the current user created `meetup_id` (and may edit it).
    pub fn is_creator(&self, meetup_id: &str) -> bool {
        self.store.read(|s| match (&s.user, meetup_by_id(s, meetup_id)) {
            (Some(user), Some(meetup)) => meetup.creator_id == user.id,
            _ => false,
        })
    }
}
