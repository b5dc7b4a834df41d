//! Client-side state container for meetups, users, and registrations, kept
//! in sync with a remote backend.
//!
//! A [`StateStore`] holds the observable [`Snapshot`]. [`Workflows`] run
//! the asynchronous operations that talk to the backend through the
//! [`DocumentStore`], [`BlobStore`], and [`IdentityProvider`] capabilities
//! and commit [`Mutation`]s at checkpoints. [`ReadViews`] answer derived
//! queries such as "featured meetups" or "is the user registered".

mod config;
mod error;
mod memory;
mod model;
mod mutation;
mod remote;
mod snapshot;
mod store;
pub mod views;
mod workflow;

pub use config::SyncConfig;
pub use error::{BuildError, PreconditionError, RemoteError, SyncError};
pub use memory::{Call, MemoryBackend, Operation};
pub use model::{
    AuthMode, Credentials, ImageUpload, Meetup, MeetupDraft, MeetupPatch, MeetupRecord, User,
    format_date,
};
pub use mutation::Mutation;
pub use remote::{BlobStore, DocumentStore, Documents, IdentityProvider};
pub use snapshot::Snapshot;
pub use store::StateStore;
pub use views::ReadViews;
pub use workflow::{Unregistration, Workflows, WorkflowsBuilder};
