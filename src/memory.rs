//! In-memory implementation of every remote capability.
//!
//! [`MemoryBackend`] behaves like a small hosted backend: documents live in
//! keyed collections, blobs get a durable URL, and accounts follow the usual
//! email/password rules. It records every call and can be told to fail a
//! given [`Operation`], which makes it the stub of choice for tests and the
//! default backend for demos.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::remote::{BlobStore, DocumentStore, Documents, IdentityProvider};

/// Default prefix for durable blob URLs.
const DEFAULT_URL_BASE: &str = "memory://blobs";

/// Minimum password length accepted by [`IdentityProvider::create_account`].
const MIN_PASSWORD_LEN: usize = 6;

/// Every remote call the backend can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadAll,
    Write,
    Patch,
    Delete,
    Upload,
    DurableUrl,
    CreateAccount,
    Authenticate,
    SignOut,
}

/// One recorded call: the operation and the path (or email) it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub target: String,
}

#[derive(Debug)]
struct Account {
    password: String,
    uid: String,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Documents>,
    blobs: HashMap<String, Vec<u8>>,
    accounts: HashMap<String, Account>,
    session: Option<String>,
    keys: VecDeque<String>,
    failing: HashSet<Operation>,
    calls: Vec<Call>,
}

impl Inner {
    /// Log the call, then fail it if the operation has been scripted to fail.
    fn enter(&mut self, op: Operation, target: &str) -> Result<(), RemoteError> {
        self.calls.push(Call {
            op,
            target: target.to_owned(),
        });
        if self.failing.contains(&op) {
            return Err(RemoteError::with_code(
                "memory/unavailable",
                format!("{op:?} failed for {target}"),
            ));
        }
        Ok(())
    }

    /// Next scripted key, or a fresh random one once the script runs out.
    fn next_key(&mut self) -> String {
        self.keys
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Split `a/b/c` into `("a/b", "c")`.
fn split_parent(path: &str) -> Result<(&str, &str), RemoteError> {
    path.rsplit_once('/')
        .filter(|(parent, key)| !parent.is_empty() && !key.is_empty())
        .ok_or_else(|| {
            RemoteError::with_code("memory/invalid-path", format!("not a document path: {path}"))
        })
}

/// Thread-safe in-memory backend implementing [`DocumentStore`],
/// [`BlobStore`], and [`IdentityProvider`].
///
/// # Examples
///
/// ```
/// # async fn example() -> Result<(), meetup_sync::RemoteError> {
/// use meetup_sync::{DocumentStore, MemoryBackend};
///
/// let backend = MemoryBackend::new().with_keys(["m1"]);
/// let key = backend.write("meetups", serde_json::json!({ "title": "t" })).await?;
/// assert_eq!(key, "m1");
/// assert_eq!(backend.read_all("meetups").await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    url_base: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty backend with random keys and `memory://blobs` URLs.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            url_base: DEFAULT_URL_BASE.to_owned(),
        }
    }

    /// Script the keys handed out by `write` and `create_account`, in order.
    ///
    /// Once the script is exhausted, random keys are generated.
    pub fn with_keys<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Set the prefix of durable URLs. The URL of a blob is
    /// `<base>/<last path segment>`.
    pub fn with_url_base(mut self, base: impl Into<String>) -> Self {
        self.url_base = base.into().trim_end_matches('/').to_owned();
        self
    }

    /// Register an account up front.
    pub fn with_account(
        self,
        email: impl Into<String>,
        password: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        self.lock().accounts.insert(
            email.into(),
            Account {
                password: password.into(),
                uid: uid.into(),
            },
        );
        self
    }

    /// Start with a provider-side session for `uid`, as if restored from a
    /// previous run.
    pub fn with_session(self, uid: impl Into<String>) -> Self {
        self.lock().session = Some(uid.into());
        self
    }

    /// Store a document under `collection` with a fixed key.
    pub fn seed(&self, collection: &str, key: &str, document: Value) {
        self.lock()
            .collections
            .entry(collection.to_owned())
            .or_default()
            .insert(key.to_owned(), document);
    }

    /// Make every subsequent `op` call fail until [`recover`](MemoryBackend::recover).
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    /// Undo [`fail`](MemoryBackend::fail).
    pub fn recover(&self, op: Operation) {
        self.lock().failing.remove(&op);
    }

    /// All calls received so far, oldest first. Failed calls are included.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Operations received so far, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|c| c.op).collect()
    }

    /// Number of calls received for `op`.
    pub fn count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Current documents of `collection`.
    pub fn documents(&self, collection: &str) -> Documents {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored bytes of the blob at `path`.
    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory backend mutex poisoned")
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn read_all(&self, path: &str) -> Result<Documents, RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::ReadAll, path)?;
        Ok(inner.collections.get(path).cloned().unwrap_or_default())
    }

    async fn write(&self, path: &str, record: Value) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::Write, path)?;
        let key = inner.next_key();
        inner
            .collections
            .entry(path.to_owned())
            .or_default()
            .insert(key.clone(), record);
        Ok(key)
    }

    async fn patch(&self, path: &str, fields: Map<String, Value>) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::Patch, path)?;
        let (parent, key) = split_parent(path)?;
        let document = inner
            .collections
            .entry(parent.to_owned())
            .or_default()
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        // Patching a scalar replaces it with an object, as hosted stores do.
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        if let Value::Object(existing) = document {
            existing.extend(fields);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::Delete, path)?;
        let (parent, key) = split_parent(path)?;
        if let Some(collection) = inner.collections.get_mut(parent) {
            collection.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::Upload, path)?;
        inner.blobs.insert(path.to_owned(), bytes);
        Ok(())
    }

    async fn durable_url(&self, path: &str) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::DurableUrl, path)?;
        if !inner.blobs.contains_key(path) {
            return Err(RemoteError::with_code(
                "storage/object-not-found",
                format!("no object at {path}"),
            ));
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        Ok(format!("{}/{name}", self.url_base))
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::CreateAccount, email)?;
        if !email.contains('@') {
            return Err(RemoteError::with_code(
                "auth/invalid-email",
                "the email address is badly formatted",
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(RemoteError::with_code(
                "auth/weak-password",
                format!("password should be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if inner.accounts.contains_key(email) {
            return Err(RemoteError::with_code(
                "auth/email-already-in-use",
                "the email address is already in use by another account",
            ));
        }
        let uid = inner.next_key();
        inner.accounts.insert(
            email.to_owned(),
            Account {
                password: password.to_owned(),
                uid: uid.clone(),
            },
        );
        inner.session = Some(uid.clone());
        Ok(uid)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::Authenticate, email)?;
        let uid = match inner.accounts.get(email) {
            None => {
                return Err(RemoteError::with_code(
                    "auth/user-not-found",
                    "there is no user record corresponding to this identifier",
                ));
            }
            Some(account) if account.password != password => {
                return Err(RemoteError::with_code(
                    "auth/wrong-password",
                    "the password is invalid",
                ));
            }
            Some(account) => account.uid.clone(),
        };
        inner.session = Some(uid.clone());
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.enter(Operation::SignOut, "")?;
        inner.session = None;
        Ok(())
    }

    async fn current_user(&self) -> Option<String> {
        self.lock().session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_assigns_scripted_then_random_keys() {
        let backend = MemoryBackend::new().with_keys(["a"]);
        let first = backend.write("c", json!(1)).await.unwrap();
        let second = backend.write("c", json!(2)).await.unwrap();
        assert_eq!(first, "a");
        assert_ne!(second, "a");
        assert_eq!(backend.documents("c").len(), 2);
    }

    #[tokio::test]
    async fn read_all_of_unknown_path_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.read_all("nothing/here").await.unwrap().is_empty());
        assert!(backend.read_once("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_merges_fields() {
        let backend = MemoryBackend::new();
        backend.seed("meetups", "m1", json!({ "title": "a", "location": "x" }));
        let mut fields = Map::new();
        fields.insert("title".into(), json!("b"));
        backend.patch("meetups/m1", fields).await.unwrap();

        let doc = &backend.documents("meetups")["m1"];
        assert_eq!(doc["title"], "b");
        assert_eq!(doc["location"], "x");
    }

    #[tokio::test]
    async fn patch_rejects_collection_root() {
        let backend = MemoryBackend::new();
        let err = backend.patch("meetups", Map::new()).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("memory/invalid-path"));
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let backend = MemoryBackend::new();
        backend.seed("users/u1/registrations", "k1", json!("m1"));
        backend.delete("users/u1/registrations/k1").await.unwrap();
        assert!(backend.documents("users/u1/registrations").is_empty());
    }

    #[tokio::test]
    async fn durable_url_uses_base_and_file_name() {
        let backend = MemoryBackend::new().with_url_base("https://x/");
        backend.upload("meetups/m1.png", vec![1, 2]).await.unwrap();
        let url = backend.durable_url("meetups/m1.png").await.unwrap();
        assert_eq!(url, "https://x/m1.png");
        assert_eq!(backend.blob("meetups/m1.png"), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn durable_url_of_missing_blob_fails() {
        let backend = MemoryBackend::new();
        let err = backend.durable_url("meetups/none.png").await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("storage/object-not-found"));
    }

    #[tokio::test]
    async fn scripted_failure_is_logged_and_recoverable() {
        let backend = MemoryBackend::new();
        backend.fail(Operation::Write);
        assert!(backend.write("c", json!(1)).await.is_err());
        backend.recover(Operation::Write);
        assert!(backend.write("c", json!(1)).await.is_ok());
        assert_eq!(backend.count(Operation::Write), 2);
        assert_eq!(backend.documents("c").len(), 1);
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let backend = MemoryBackend::new().with_keys(["u1"]);
        let uid = backend.create_account("a@b.c", "secret1").await.unwrap();
        assert_eq!(uid, "u1");
        assert_eq!(backend.current_user().await.as_deref(), Some("u1"));

        let dup = backend.create_account("a@b.c", "secret1").await.unwrap_err();
        assert_eq!(dup.code.as_deref(), Some("auth/email-already-in-use"));

        backend.sign_out().await.unwrap();
        assert_eq!(backend.current_user().await, None);

        let wrong = backend.authenticate("a@b.c", "nope").await.unwrap_err();
        assert_eq!(wrong.code.as_deref(), Some("auth/wrong-password"));
        assert_eq!(backend.authenticate("a@b.c", "secret1").await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn create_account_validates_input() {
        let backend = MemoryBackend::new();
        let weak = backend.create_account("a@b.c", "123").await.unwrap_err();
        assert_eq!(weak.code.as_deref(), Some("auth/weak-password"));
        let bad = backend.create_account("nope", "secret1").await.unwrap_err();
        assert_eq!(bad.code.as_deref(), Some("auth/invalid-email"));
        let unknown = backend.authenticate("x@y.z", "secret1").await.unwrap_err();
        assert_eq!(unknown.code.as_deref(), Some("auth/user-not-found"));
    }
}
