//! Capability contract for the remote backend.
//!
//! The crate never talks to a network itself. Applications implement
//! [`DocumentStore`], [`BlobStore`], and [`IdentityProvider`] for their
//! backend (a hosted realtime database, an object store, an auth service)
//! and hand them to [`WorkflowsBuilder`](crate::WorkflowsBuilder). The
//! [`MemoryBackend`](crate::MemoryBackend) implements all three in memory.
//!
//! Paths are `/`-separated, relative to the backend root, and never start
//! or end with a slash (e.g. `users/u1/registrations`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// Child documents of a collection, keyed by their remote key.
pub type Documents = BTreeMap<String, Value>;

/// Hierarchical document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every child document under `path`.
    ///
    /// A path with no children yields an empty map, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on transport or permission failures.
    async fn read_all(&self, path: &str) -> Result<Documents, RemoteError>;

    /// One-shot read of `path`. Identical to [`read_all`](DocumentStore::read_all)
    /// for pull-only backends, which is the default.
    async fn read_once(&self, path: &str) -> Result<Documents, RemoteError> {
        self.read_all(path).await
    }

    /// Append `record` as a new child of `path` and return its assigned key.
    async fn write(&self, path: &str, record: Value) -> Result<String, RemoteError>;

    /// Merge `fields` into the document at `path`, leaving other fields intact.
    async fn patch(&self, path: &str, fields: Map<String, Value>) -> Result<(), RemoteError>;

    /// Remove the document at `path`.
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;
}

/// Binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, replacing anything already there.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError>;

    /// Long-lived public URL of the object at `path`.
    async fn durable_url(&self, path: &str) -> Result<String, RemoteError>;
}

/// Email/password identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account and return its user id.
    async fn create_account(&self, email: &str, password: &str) -> Result<String, RemoteError>;

    /// Verify credentials and return the user id.
    async fn authenticate(&self, email: &str, password: &str) -> Result<String, RemoteError>;

    /// End the provider-side session.
    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// User id of a session the provider already holds (e.g. persisted
    /// from a previous run). Providers without session persistence return
    /// `None`, which is the default.
    async fn current_user(&self) -> Option<String> {
        None
    }
}
