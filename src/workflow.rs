//! Asynchronous workflows that sequence remote calls and commit store
//! mutations at checkpoints.
//!
//! Each operation awaits its remote steps one after another; the first
//! failing step short-circuits the rest and is returned as a [`SyncError`].
//! Remote steps that already succeeded are never rolled back. Operations
//! that reach the backend hold a loading guard, so `loading` is cleared on
//! every exit path.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::SyncConfig;
use crate::error::{BuildError, PreconditionError, RemoteError, SyncError};
use crate::model::{
    AuthMode, Credentials, ImageUpload, Meetup, MeetupDraft, MeetupPatch, MeetupRecord, User,
};
use crate::remote::{BlobStore, DocumentStore, Documents, IdentityProvider};
use crate::store::StateStore;
use crate::views::ReadViews;

/// Outcome of [`Workflows::unregister_from_meetup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    /// The remote registration was deleted and the local one dropped.
    Removed,
    /// Nothing to do: signed out, or no registration key is known for the
    /// meetup. The backend was not contacted.
    NotRegistered,
}

/// Entry point for every state-changing operation.
///
/// Owns handles to the three remote capabilities and the [`StateStore`]
/// it commits to. Operations on one `Workflows` may run concurrently; they
/// are not serialized against each other, so the last checkpoint to commit
/// wins.
///
/// `Clone` is cheap -- all internal state is `Arc`-wrapped.
#[derive(Clone)]
pub struct Workflows {
    store: StateStore,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    identity: Arc<dyn IdentityProvider>,
    config: Arc<SyncConfig>,
}

// Manual `Debug` because the capability trait objects are not `Debug`.
impl std::fmt::Debug for Workflows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflows")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl Workflows {
    /// Start configuring workflows that commit to `store`.
    pub fn builder(store: StateStore) -> WorkflowsBuilder {
        WorkflowsBuilder::new(store)
    }

    /// Workflows backed by a single type implementing every capability,
    /// with default configuration.
    pub fn with_backend<B>(store: StateStore, backend: Arc<B>) -> Self
    where
        B: DocumentStore + BlobStore + IdentityProvider + 'static,
    {
        Self {
            store,
            documents: backend.clone(),
            blobs: backend.clone(),
            identity: backend,
            config: Arc::new(SyncConfig::default()),
        }
    }

    /// The store this instance commits to.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Configuration in effect for this instance.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Read views over the same store, using this instance's configuration.
    pub fn views(&self) -> ReadViews {
        ReadViews::with_config(self.store.clone(), &self.config)
    }

    // --- Meetups ---

    /// Fetch every meetup from the backend and replace the local cache.
    ///
    /// Records that do not decode as meetups are skipped with a warning.
    ///
    /// # Returns
    ///
    /// The number of meetups now cached.
    ///
    /// # Errors
    ///
    /// [`SyncError::RemoteRead`] if the read fails; the cache is untouched.
    pub async fn load_meetups(&self) -> Result<usize, SyncError> {
        let _loading = self.store.loading_scope();
        let documents = self
            .remote(self.documents.read_once(&self.config.meetups_path))
            .await
            .map_err(|e| failed("load_meetups", SyncError::RemoteRead(e)))?;

        let meetups = decode_meetups(documents);
        let count = meetups.len();
        self.store.set_meetups(meetups);
        tracing::info!(count, "meetups loaded");
        Ok(count)
    }

    /// Create a meetup, upload its image, and cache the result.
    ///
    /// Steps, each awaited before the next:
    /// 1. write the record (without image URL) and obtain its key;
    /// 2. upload the image to `<meetups_path>/<key><ext>`;
    /// 3. resolve the image's durable URL;
    /// 4. patch the record with `imageURL`;
    /// 5. commit the finished meetup to the store.
    ///
    /// If a step after (1) fails, the record stays on the backend without
    /// an image URL and nothing is cached locally.
    ///
    /// # Arguments
    ///
    /// * `draft` - Meetup fields and image. When `draft.creator_id` is
    ///   `None`, the signed-in user becomes the creator.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Precondition`] -- no creator given and nobody signed in.
    /// * [`SyncError::RemoteWrite`] -- the write, upload, or patch failed.
    /// * [`SyncError::RemoteRead`] -- resolving the image URL failed.
    pub async fn create_meetup(&self, draft: MeetupDraft) -> Result<Meetup, SyncError> {
        let Some(creator_id) = draft.creator_id.clone().or_else(|| self.current_user_id()) else {
            return Err(failed("create_meetup", PreconditionError::NoCurrentUser.into()));
        };
        let _loading = self.store.loading_scope();

        let record = draft.to_record(&creator_id);
        let value = serde_json::to_value(&record).map_err(|e| {
            failed(
                "create_meetup",
                SyncError::RemoteWrite(RemoteError::with_code("invalid-record", e.to_string())),
            )
        })?;
        let id = self
            .remote(self.documents.write(&self.config.meetups_path, value))
            .await
            .map_err(|e| failed("create_meetup", SyncError::RemoteWrite(e)))?;
        tracing::debug!(meetup_id = %id, "meetup record written");

        let image_url = match self.attach_image(&id, draft.image).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    meetup_id = %id,
                    "meetup record left on the backend without an image"
                );
                return Err(failed("create_meetup", e));
            }
        };

        let meetup = Meetup::from_record(
            id,
            MeetupRecord {
                image_url: Some(image_url),
                ..record
            },
        );
        self.store.add_meetup(meetup.clone());
        tracing::info!(meetup_id = %meetup.id, "meetup created");
        Ok(meetup)
    }

    /// Upload, resolve, and link the image of a freshly written meetup.
    async fn attach_image(&self, id: &str, image: ImageUpload) -> Result<String, SyncError> {
        let path = self.config.image_path(id, &image.extension());
        self.remote(self.blobs.upload(&path, image.bytes))
            .await
            .map_err(SyncError::RemoteWrite)?;
        tracing::debug!(meetup_id = %id, path = %path, "image uploaded");

        let url = self
            .remote(self.blobs.durable_url(&path))
            .await
            .map_err(SyncError::RemoteRead)?;

        let mut fields = Map::new();
        fields.insert("imageURL".to_owned(), Value::from(url.clone()));
        self.remote(self.documents.patch(&self.config.meetup_path(id), fields))
            .await
            .map_err(SyncError::RemoteWrite)?;
        Ok(url)
    }

    /// Write the non-empty fields of `patch` to the meetup, then apply the
    /// same patch to the cached copy.
    ///
    /// A meetup that is not cached locally is still patched remotely.
    ///
    /// # Errors
    ///
    /// [`SyncError::RemoteWrite`] if the patch fails; the cache is untouched.
    pub async fn update_meetup(&self, id: &str, patch: MeetupPatch) -> Result<(), SyncError> {
        let _loading = self.store.loading_scope();
        self.remote(
            self.documents
                .patch(&self.config.meetup_path(id), patch.to_fields()),
        )
        .await
        .map_err(|e| failed("update_meetup", SyncError::RemoteWrite(e)))?;

        self.store.update_meetup(id, patch);
        tracing::info!(meetup_id = %id, "meetup updated");
        Ok(())
    }

    // --- Registrations ---

    /// Register the signed-in user for a meetup.
    ///
    /// Every call writes a registration record, even if the user is already
    /// registered; the local store ignores the duplicate and keeps the
    /// first registration key.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Precondition`] -- nobody is signed in (no remote call
    ///   is made), or the user changed before the write completed.
    /// * [`SyncError::RemoteWrite`] -- the write failed.
    pub async fn register_for_meetup(&self, meetup_id: &str) -> Result<(), SyncError> {
        let Some(uid) = self.current_user_id() else {
            return Err(failed("register_for_meetup", PreconditionError::NoCurrentUser.into()));
        };
        let _loading = self.store.loading_scope();

        let key = self
            .remote(
                self.documents
                    .write(&self.config.registrations_path(&uid), Value::from(meetup_id)),
            )
            .await
            .map_err(|e| failed("register_for_meetup", SyncError::RemoteWrite(e)))?;

        if !self.still_signed_in(&uid) {
            tracing::warn!(
                meetup_id,
                user_id = %uid,
                registration_key = %key,
                "user changed during registration, record left under previous user"
            );
            return Err(failed("register_for_meetup", PreconditionError::NoCurrentUser.into()));
        }

        self.store
            .register_user_for_meetup(meetup_id, key.as_str())
            .map_err(|e| failed("register_for_meetup", e.into()))?;
        tracing::info!(meetup_id, user_id = %uid, registration_key = %key, "registered for meetup");
        Ok(())
    }

    /// Remove the signed-in user's registration for a meetup.
    ///
    /// When no registration key is known (signed out, never registered, or
    /// registrations not yet refreshed) the call returns
    /// [`Unregistration::NotRegistered`] without contacting the backend.
    ///
    /// # Errors
    ///
    /// * [`SyncError::RemoteWrite`] -- the delete failed; the local
    ///   registration is kept.
    /// * [`SyncError::Precondition`] -- the user changed while the delete
    ///   was in flight; the new user's registrations are left alone.
    pub async fn unregister_from_meetup(
        &self,
        meetup_id: &str,
    ) -> Result<Unregistration, SyncError> {
        let target = self.store.read(|s| {
            s.user.as_ref().and_then(|u| {
                u.registration_key(meetup_id)
                    .map(|key| (u.id.clone(), key.to_owned()))
            })
        });
        let Some((uid, key)) = target else {
            tracing::warn!(meetup_id, "no registration key known, nothing to unregister");
            return Ok(Unregistration::NotRegistered);
        };
        let _loading = self.store.loading_scope();

        self.remote(
            self.documents
                .delete(&self.config.registration_path(&uid, &key)),
        )
        .await
        .map_err(|e| failed("unregister_from_meetup", SyncError::RemoteWrite(e)))?;

        if !self.still_signed_in(&uid) {
            tracing::warn!(
                meetup_id,
                user_id = %uid,
                registration_key = %key,
                "user changed during unregistration, local state not updated"
            );
            return Err(failed("unregister_from_meetup", PreconditionError::NoCurrentUser.into()));
        }

        self.store.unregister_user_from_meetup(meetup_id);
        tracing::info!(meetup_id, user_id = %uid, "unregistered from meetup");
        Ok(Unregistration::Removed)
    }

    // --- Identity ---

    /// Sign up or sign in, replacing the current user.
    ///
    /// Clears the error field first. On success the new user has no
    /// registrations; call [`refresh_profile`](Workflows::refresh_profile)
    /// to load them.
    ///
    /// # Errors
    ///
    /// [`SyncError::Auth`] if the provider rejects the request. The error is
    /// also recorded in the snapshot and the current user is left as is.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        mode: AuthMode,
    ) -> Result<User, SyncError> {
        let _loading = self.store.loading_scope();
        self.store.clear_error();

        let result = match mode {
            AuthMode::SignUp => {
                self.remote(
                    self.identity
                        .create_account(&credentials.email, &credentials.password),
                )
                .await
            }
            AuthMode::SignIn => {
                self.remote(
                    self.identity
                        .authenticate(&credentials.email, &credentials.password),
                )
                .await
            }
        };

        match result {
            Ok(uid) => {
                let user = User::new(uid);
                self.store.set_user(Some(user.clone()));
                tracing::info!(user_id = %user.id, ?mode, "authenticated");
                Ok(user)
            }
            Err(e) => {
                self.store.set_error(e.clone());
                Err(failed("authenticate", SyncError::Auth(e)))
            }
        }
    }

    /// [`authenticate`](Workflows::authenticate) with [`AuthMode::SignUp`].
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<User, SyncError> {
        self.authenticate(credentials, AuthMode::SignUp).await
    }

    /// [`authenticate`](Workflows::authenticate) with [`AuthMode::SignIn`].
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<User, SyncError> {
        self.authenticate(credentials, AuthMode::SignIn).await
    }

    /// Rebuild the signed-in user's registrations from the backend.
    ///
    /// The registration set and key map are replaced, not merged. If the
    /// user signs out (or another user signs in) while the read is in
    /// flight, the result is discarded.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Precondition`] -- nobody is signed in, or the user
    ///   changed during the read.
    /// * [`SyncError::RemoteRead`] -- the read failed; the user is unchanged.
    pub async fn refresh_profile(&self) -> Result<User, SyncError> {
        let Some(uid) = self.current_user_id() else {
            return Err(failed("refresh_profile", PreconditionError::NoCurrentUser.into()));
        };
        let _loading = self.store.loading_scope();

        let documents = self
            .remote(
                self.documents
                    .read_once(&self.config.registrations_path(&uid)),
            )
            .await
            .map_err(|e| failed("refresh_profile", SyncError::RemoteRead(e)))?;

        if !self.still_signed_in(&uid) {
            tracing::warn!(
                user_id = %uid,
                "user changed during profile refresh, discarding result"
            );
            return Err(failed("refresh_profile", PreconditionError::NoCurrentUser.into()));
        }

        let user = User::from_registrations(uid, decode_registrations(documents));
        self.store.set_user(Some(user.clone()));
        tracing::info!(
            user_id = %user.id,
            registrations = user.registered_meetups().len(),
            "profile refreshed"
        );
        Ok(user)
    }

    /// Adopt a session the identity provider reports as already signed in.
    ///
    /// Sets a bare user with no registrations; does not contact the backend.
    pub fn resume_session(&self, uid: impl Into<String>) -> User {
        let user = User::new(uid);
        self.store.set_user(Some(user.clone()));
        tracing::info!(user_id = %user.id, "session resumed");
        user
    }

    /// Handle the provider's "already signed in" notification: resume the
    /// session, then load the user's registrations.
    ///
    /// # Errors
    ///
    /// Propagates [`refresh_profile`](Workflows::refresh_profile) errors.
    /// The bare user stays signed in even if the refresh fails.
    pub async fn session_resumed(&self, uid: impl Into<String>) -> Result<User, SyncError> {
        self.resume_session(uid);
        self.refresh_profile().await
    }

    /// Ask the provider for a persisted session and, if there is one,
    /// resume it.
    ///
    /// # Returns
    ///
    /// The restored user with registrations loaded, or `None` if the
    /// provider holds no session.
    ///
    /// # Errors
    ///
    /// Propagates [`refresh_profile`](Workflows::refresh_profile) errors.
    pub async fn restore_session(&self) -> Result<Option<User>, SyncError> {
        match self.identity.current_user().await {
            Some(uid) => self.session_resumed(uid).await.map(Some),
            None => Ok(None),
        }
    }

    /// Sign out with the provider and clear the current user.
    ///
    /// The user is cleared whether or not the provider call succeeds.
    ///
    /// # Errors
    ///
    /// [`SyncError::Auth`] if the provider call failed (after the user has
    /// already been cleared locally).
    pub async fn sign_out(&self) -> Result<(), SyncError> {
        let result = self.remote(self.identity.sign_out()).await;
        self.store.set_user(None);
        match result {
            Ok(()) => {
                tracing::info!("signed out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "provider sign-out failed, local user cleared anyway");
                Err(SyncError::Auth(e))
            }
        }
    }

    /// Clear the recorded error.
    pub fn clear_error(&self) {
        self.store.clear_error();
    }

    // --- Helpers ---

    fn current_user_id(&self) -> Option<String> {
        self.store.read(|s| s.user.as_ref().map(|u| u.id.clone()))
    }

    /// Whether `uid` is still the signed-in user after an await point.
    fn still_signed_in(&self, uid: &str) -> bool {
        self.store
            .read(|s| s.user.as_ref().is_some_and(|u| u.id == uid))
    }

    /// Await a remote call, bounded by the configured request timeout.
    async fn remote<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(RemoteError::timed_out(limit))),
            None => call.await,
        }
    }
}

/// Log a failed workflow and hand the error back for returning.
fn failed(workflow: &'static str, error: SyncError) -> SyncError {
    tracing::error!(workflow, error = %error, "workflow failed");
    error
}

/// Decode meetup records keyed by remote key, skipping malformed ones.
fn decode_meetups(documents: Documents) -> Vec<Meetup> {
    documents
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<MeetupRecord>(value) {
            Ok(record) => Some(Meetup::from_record(key, record)),
            Err(e) => {
                tracing::warn!(meetup_id = %key, error = %e, "skipping malformed meetup record");
                None
            }
        })
        .collect()
}

/// Turn `{registration_key: meetup_id}` documents into pairs, skipping
/// records whose value is not a string.
fn decode_registrations(documents: Documents) -> Vec<(String, String)> {
    documents
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(meetup_id) => Some((key, meetup_id)),
            _ => {
                tracing::warn!(registration_key = %key, "skipping malformed registration record");
                None
            }
        })
        .collect()
}

/// Builder for [`Workflows`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use meetup_sync::{MemoryBackend, StateStore, SyncConfig, Workflows};
///
/// let backend = Arc::new(MemoryBackend::new());
/// let workflows = Workflows::builder(StateStore::new())
///     .documents(backend.clone())
///     .blobs(backend.clone())
///     .identity(backend)
///     .config(SyncConfig::default())
///     .build()
///     .expect("all capabilities supplied");
/// assert_eq!(workflows.config().featured_count, 5);
/// ```
pub struct WorkflowsBuilder {
    store: StateStore,
    documents: Option<Arc<dyn DocumentStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    config: SyncConfig,
}

impl WorkflowsBuilder {
    /// Builder with no capabilities and default configuration.
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            documents: None,
            blobs: None,
            identity: None,
            config: SyncConfig::default(),
        }
    }

    /// Document store for meetups and registrations.
    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Blob store for meetup images.
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Identity provider for sign-up, sign-in, and sign-out.
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Supply all three capabilities from one backend.
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: DocumentStore + BlobStore + IdentityProvider + 'static,
    {
        self.documents(backend.clone())
            .blobs(backend.clone())
            .identity(backend)
    }

    /// Replace the default [`SyncConfig`].
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the [`Workflows`].
    ///
    /// # Errors
    ///
    /// [`BuildError::Missing`] naming the first capability not supplied.
    pub fn build(self) -> Result<Workflows, BuildError> {
        Ok(Workflows {
            store: self.store,
            documents: self.documents.ok_or(BuildError::Missing("documents"))?,
            blobs: self.blobs.ok_or(BuildError::Missing("blobs"))?,
            identity: self.identity.ok_or(BuildError::Missing("identity"))?,
            config: Arc::new(self.config),
        })
    }
}
