//! In-process backend.
//!
//! Implements both [`IdentityProvider`] and [`DocumentStore`] on shared memory
//! so the components can be exercised without a hosted service. Accounts,
//! records and the durable session slot survive [`MemoryBackend::restart`];
//! the signed-in state does not, unless it was made durable.
//!
//! Collections can carry an owner rule mirroring `firestore.rules`: creates,
//! deletes and live queries are refused unless they concern records whose
//! owner field equals the signed-in uid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use crate::auth::{AuthError, AuthErrorCode, AuthState, IdentityProvider, Persistence, User};
use crate::lock;
use crate::store::{
    auto_id, Document, DocumentStore, Fields, Query, Snapshot, StoreError, Subscription, Value,
    WriteResult,
};

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    uid: String,
    password: String,
}

/// State that outlives a process.
struct Persistent {
    accounts: Mutex<HashMap<String, Account>>,
    collections: Mutex<HashMap<String, Vec<Document>>>,
    owner_rules: Mutex<HashMap<String, String>>,
    saved_session: Mutex<Option<User>>,
    password_resets: Mutex<Vec<String>>,
    last_server_time: Mutex<Option<DateTime<Utc>>>,
    /// Name of each collection that changed.
    changes: broadcast::Sender<String>,
}

/// State of one running process.
struct Process {
    state: watch::Sender<AuthState>,
    persistence: Mutex<Persistence>,
    auth_calls: AtomicUsize,
}

impl Process {
    fn new() -> Self {
        let (state, _) = watch::channel(AuthState::Unknown);
        Self {
            state,
            persistence: Mutex::new(Persistence::default()),
            auth_calls: AtomicUsize::new(0),
        }
    }
}

/// Identity provider and document store in one process.
#[derive(Clone)]
pub struct MemoryBackend {
    persistent: Arc<Persistent>,
    process: Arc<Process>,
}

impl MemoryBackend {
    /// Creates an empty backend whose session state is still unknown.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            persistent: Arc::new(Persistent {
                accounts: Mutex::new(HashMap::new()),
                collections: Mutex::new(HashMap::new()),
                owner_rules: Mutex::new(HashMap::new()),
                saved_session: Mutex::new(None),
                password_resets: Mutex::new(Vec::new()),
                last_server_time: Mutex::new(None),
                changes,
            }),
            process: Arc::new(Process::new()),
        }
    }

    /// Requires `field` of every record in `collection` to equal the signed-in uid.
    pub fn with_owner_rule(self, collection: &str, field: &str) -> Self {
        lock(&self.persistent.owner_rules).insert(collection.to_string(), field.to_string());
        self
    }

    /// Publishes the first session state: the durable session if one was
    /// saved, signed out otherwise.
    pub fn restore(&self) {
        let state = match lock(&self.persistent.saved_session).clone() {
            Some(user) => AuthState::SignedIn(user),
            None => AuthState::SignedOut,
        };
        self.process.state.send_replace(state);
    }

    /// Simulates a new process sharing this backend's persistent state.
    pub fn restart(&self) -> Self {
        Self {
            persistent: self.persistent.clone(),
            process: Arc::new(Process::new()),
        }
    }

    /// Registers an account without going through sign-up.
    pub fn add_account(&self, email: &str, password: &str) -> User {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        lock(&self.persistent.accounts).insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        User {
            uid,
            email: email.to_string(),
        }
    }

    /// Ends the current session from the provider side.
    pub fn revoke_session(&self) {
        *lock(&self.persistent.saved_session) = None;
        self.process.state.send_replace(AuthState::SignedOut);
    }

    /// Stores a record bypassing owner rules, as an administrator would.
    pub fn insert_unchecked(&self, collection: &str, fields: Fields) -> String {
        let id = auto_id();
        let (fields, _) = self.resolve_server_timestamps(fields);
        lock(&self.persistent.collections)
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        self.notify(collection);
        id
    }

    /// Records currently stored in `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        lock(&self.persistent.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Addresses password reset emails were sent to.
    pub fn password_reset_requests(&self) -> Vec<String> {
        lock(&self.persistent.password_resets).clone()
    }

    /// Number of identity provider calls made in this process.
    pub fn auth_calls(&self) -> usize {
        self.process.auth_calls.load(Ordering::SeqCst)
    }

    /// Current persistence setting of this process.
    pub fn persistence(&self) -> Persistence {
        *lock(&self.process.persistence)
    }

    /// Number of live queries currently open.
    pub fn listener_count(&self) -> usize {
        self.persistent.changes.receiver_count()
    }

    fn count_call(&self) {
        self.process.auth_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn establish(&self, user: User) -> User {
        let durable = self.persistence() == Persistence::Durable;
        *lock(&self.persistent.saved_session) = durable.then(|| user.clone());
        self.process
            .state
            .send_replace(AuthState::SignedIn(user.clone()));
        user
    }

    fn current_uid(&self) -> Option<String> {
        self.process.state.borrow().user().map(|u| u.uid.clone())
    }

    fn owner_field(&self, collection: &str) -> Option<String> {
        lock(&self.persistent.owner_rules).get(collection).cloned()
    }

    /// Applies the owner rule of `collection` to a record owned by `owner`.
    fn authorize(&self, collection: &str, owner: Option<&Value>) -> Result<(), StoreError> {
        if self.owner_field(collection).is_none() {
            return Ok(());
        }
        let uid = self.current_uid().ok_or(StoreError::PermissionDenied)?;
        match owner {
            Some(Value::String(owner)) if *owner == uid => Ok(()),
            _ => Err(StoreError::PermissionDenied),
        }
    }

    /// Monotonic store clock.
    fn server_time(&self) -> DateTime<Utc> {
        let mut last = lock(&self.persistent.last_server_time);
        let now = Utc::now();
        let next = match *last {
            Some(prev) if prev >= now => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    fn resolve_server_timestamps(&self, mut fields: Fields) -> (Fields, DateTime<Utc>) {
        let now = self.server_time();
        for value in fields.values_mut() {
            if *value == Value::ServerTimestamp {
                *value = Value::Timestamp(now);
            }
        }
        (fields, now)
    }

    fn snapshot(persistent: &Persistent, query: &Query) -> Snapshot {
        let documents = lock(&persistent.collections)
            .get(&query.collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();
        Snapshot { documents }
    }

    fn notify(&self, collection: &str) {
        // No receivers simply means nobody is listening.
        let _ = self.persistent.changes.send(collection.to_string());
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn invalid_email() -> AuthError {
    AuthError::new(
        AuthErrorCode::InvalidEmail,
        "The email address is badly formatted.",
    )
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn set_persistence(&self, persistence: Persistence) -> Result<(), AuthError> {
        self.count_call();
        *lock(&self.process.persistence) = persistence;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.count_call();
        if !is_valid_email(email) {
            return Err(invalid_email());
        }

        let uid = match lock(&self.persistent.accounts).get(email) {
            Some(account) if account.password == password => account.uid.clone(),
            _ => {
                return Err(AuthError::new(
                    AuthErrorCode::InvalidCredential,
                    "The supplied auth credential is incorrect.",
                ))
            }
        };

        Ok(self.establish(User {
            uid,
            email: email.to_string(),
        }))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.count_call();
        if !is_valid_email(email) {
            return Err(invalid_email());
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::new(
                AuthErrorCode::WeakPassword,
                "Password should be at least 6 characters",
            ));
        }
        if lock(&self.persistent.accounts).contains_key(email) {
            return Err(AuthError::new(
                AuthErrorCode::EmailAlreadyInUse,
                "The email address is already in use by another account.",
            ));
        }

        let user = self.add_account(email, password);
        Ok(self.establish(user))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.count_call();
        if !is_valid_email(email) {
            return Err(invalid_email());
        }
        if !lock(&self.persistent.accounts).contains_key(email) {
            return Err(AuthError::new(
                AuthErrorCode::UserNotFound,
                "There is no user record corresponding to this identifier.",
            ));
        }
        lock(&self.persistent.password_resets).push(email.to_string());
        Ok(())
    }

    async fn sign_out(&self) {
        self.count_call();
        *lock(&self.persistent.saved_session) = None;
        self.process.state.send_replace(AuthState::SignedOut);
    }

    fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.process.state.subscribe()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn add(&self, collection: &str, fields: Fields) -> Result<WriteResult, StoreError> {
        if let Some(owner_field) = self.owner_field(collection) {
            self.authorize(collection, fields.get(&owner_field))?;
        }

        let id = auto_id();
        let (fields, server_time) = self.resolve_server_timestamps(fields);

        lock(&self.persistent.collections)
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        self.notify(collection);

        Ok(WriteResult { id, server_time })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let owner_field = self.owner_field(collection);
        {
            let mut collections = lock(&self.persistent.collections);
            let Some(docs) = collections.get_mut(collection) else {
                return Ok(());
            };
            let Some(pos) = docs.iter().position(|d| d.id == id) else {
                return Ok(());
            };
            if let Some(owner_field) = &owner_field {
                self.authorize(collection, docs[pos].get(owner_field))?;
            }
            docs.remove(pos);
        }
        self.notify(collection);
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        if let Some(owner_field) = self.owner_field(&query.collection) {
            self.authorize(&query.collection, query.pinned(&owner_field))?;
        }

        let persistent = self.persistent.clone();
        let mut changes = persistent.changes.subscribe();

        Ok(Subscription::spawn(move |tx| async move {
            loop {
                let snapshot = Self::snapshot(&persistent, &query);
                if tx.send(Ok(snapshot)).await.is_err() {
                    return;
                }
                loop {
                    match changes.recv().await {
                        Ok(collection) if collection == query.collection => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_fields(uid: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("userId".into(), uid.into());
        fields.insert("createdAt".into(), Value::ServerTimestamp);
        fields
    }

    #[tokio::test]
    async fn test_sign_up_rules() {
        let backend = MemoryBackend::new();
        backend.restore();

        let err = backend.sign_up("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidEmail);

        let err = backend.sign_up("a@example.com", "12345").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::WeakPassword);

        backend.sign_up("a@example.com", "123456").await.unwrap();
        let err = backend.sign_up("a@example.com", "123456").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::EmailAlreadyInUse);
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let backend = MemoryBackend::new();
        backend.add_account("a@example.com", "secret1");

        let err = backend.sign_in("a@example.com", "nope").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidCredential);
        let err = backend.sign_in("b@example.com", "secret1").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidCredential);
    }

    #[tokio::test]
    async fn test_durable_session_survives_restart() {
        let backend = MemoryBackend::new();
        backend.add_account("a@example.com", "secret1");
        backend.set_persistence(Persistence::Durable).await.unwrap();
        let user = backend.sign_in("a@example.com", "secret1").await.unwrap();

        let restarted = backend.restart();
        assert_eq!(*restarted.auth_state().borrow(), AuthState::Unknown);
        restarted.restore();
        assert_eq!(*restarted.auth_state().borrow(), AuthState::SignedIn(user));
    }

    #[tokio::test]
    async fn test_ephemeral_session_ends_with_process() {
        let backend = MemoryBackend::new();
        backend.add_account("a@example.com", "secret1");
        backend
            .set_persistence(Persistence::Ephemeral)
            .await
            .unwrap();
        backend.sign_in("a@example.com", "secret1").await.unwrap();

        let restarted = backend.restart();
        restarted.restore();
        assert_eq!(*restarted.auth_state().borrow(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_add_resolves_server_timestamp() {
        let backend = MemoryBackend::new();
        let first = backend.add("things", owned_fields("u1")).await.unwrap();
        let second = backend.add("things", owned_fields("u1")).await.unwrap();

        assert!(second.server_time > first.server_time);
        let docs = backend.documents("things");
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].get("createdAt"),
            Some(&Value::Timestamp(first.server_time))
        );
    }

    #[tokio::test]
    async fn test_owner_rule() {
        let backend = MemoryBackend::new().with_owner_rule("things", "userId");
        backend.restore();

        // Signed out: nothing is allowed.
        assert_eq!(
            backend.add("things", owned_fields("u1")).await.unwrap_err(),
            StoreError::PermissionDenied
        );

        backend.add_account("a@example.com", "secret1");
        let user = backend.sign_in("a@example.com", "secret1").await.unwrap();

        assert_eq!(
            backend.add("things", owned_fields("someone-else")).await.unwrap_err(),
            StoreError::PermissionDenied
        );
        let own = backend.add("things", owned_fields(&user.uid)).await.unwrap();

        let foreign = backend.insert_unchecked("things", owned_fields("someone-else"));
        assert_eq!(
            backend.delete("things", &foreign).await.unwrap_err(),
            StoreError::PermissionDenied
        );

        let unfiltered = backend.subscribe(Query::new("things")).await;
        assert_eq!(unfiltered.unwrap_err(), StoreError::PermissionDenied);

        backend.delete("things", &own.id).await.unwrap();
        assert_eq!(backend.documents("things").len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_pushes_changes() {
        let backend = MemoryBackend::new();
        let query = Query::new("things").where_eq("userId", "u1");
        let mut sub = backend.subscribe(query).await.unwrap();

        assert!(sub.next_snapshot().await.unwrap().unwrap().documents.is_empty());

        backend.add("things", owned_fields("u2")).await.unwrap();
        let snapshot = sub.next_snapshot().await.unwrap().unwrap();
        assert!(snapshot.documents.is_empty());

        let added = backend.add("things", owned_fields("u1")).await.unwrap();
        let snapshot = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.documents.len(), 1);
        assert_eq!(snapshot.documents[0].id, added.id);

        assert_eq!(backend.listener_count(), 1);
        sub.unsubscribe();
        for _ in 0..10 {
            if backend.listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_password_reset_requests_are_recorded() {
        let backend = MemoryBackend::new();
        backend.add_account("a@example.com", "secret1");

        backend.send_password_reset("a@example.com").await.unwrap();
        let err = backend
            .send_password_reset("b@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UserNotFound);

        assert_eq!(backend.password_reset_requests(), vec!["a@example.com"]);
        assert_eq!(backend.auth_calls(), 2);
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@@example.com"));
    }
}
