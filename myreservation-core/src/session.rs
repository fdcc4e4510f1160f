//! Session gate and the explicit session context.

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{AuthState, IdentityProvider, User};
use crate::store::DocumentStore;

/// The single view the gate exposes at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// No session notification has arrived yet.
    Loading,
    /// Show the credential form.
    SignedOut,
    /// Show the app shell for this user.
    SignedIn(User),
}

impl From<&AuthState> for View {
    fn from(state: &AuthState) -> Self {
        match state {
            AuthState::Unknown => View::Loading,
            AuthState::SignedOut => View::SignedOut,
            AuthState::SignedIn(user) => View::SignedIn(user.clone()),
        }
    }
}

/// Chooses between the credential form and the app shell.
pub struct SessionGate {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Receiver<AuthState>,
}

impl SessionGate {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let state = provider.auth_state();
        Self { provider, state }
    }

    pub fn view(&self) -> View {
        View::from(&*self.state.borrow())
    }

    /// Waits for the next session change.
    ///
    /// Intermediate states that were replaced before this call observed them
    /// are skipped. Returns `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<View> {
        self.state.changed().await.ok()?;
        Some(View::from(&*self.state.borrow_and_update()))
    }

    /// Builds the context components need while signed in.
    pub fn context(&self, store: Arc<dyn DocumentStore>) -> Option<SessionContext> {
        match self.view() {
            View::SignedIn(user) => Some(SessionContext::new(user, store)),
            _ => None,
        }
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// User-initiated sign-out. Always ends in [`View::SignedOut`].
    pub async fn sign_out(&self) {
        self.provider.sign_out().await;
    }
}

/// Who is signed in and where their records live.
///
/// Passed explicitly to components instead of reading a global current user.
#[derive(Clone)]
pub struct SessionContext {
    user: User,
    store: Arc<dyn DocumentStore>,
}

impl SessionContext {
    pub fn new(user: User, store: Arc<dyn DocumentStore>) -> Self {
        Self { user, store }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
