//! Identity provider seam.
//!
//! The provider owns the user session: it signs users in and out, decides how
//! long a session survives and reports every session change through a
//! [`watch`] channel. Components only ever see the [`AuthState`] it publishes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable unique id assigned by the provider.
    pub uid: String,
    /// Contact address the user signed up with.
    pub email: String,
}

/// Session state as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// The provider has not reported a session state yet.
    #[default]
    Unknown,
    SignedOut,
    SignedIn(User),
}

impl AuthState {
    /// Returns the signed-in user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }
}

/// How long a session outlives the process that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Session survives restarts.
    Durable,
    /// Session ends with the running process.
    #[default]
    Ephemeral,
}

impl std::fmt::Display for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Persistence::Durable => write!(f, "durable"),
            Persistence::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Provider error codes the client distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    InvalidCredential,
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmail,
    UserNotFound,
    Network,
    /// Any other provider code, kept verbatim.
    Other(String),
}

impl AuthErrorCode {
    /// Parses an `auth/...` code string.
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/invalid-credential" => AuthErrorCode::InvalidCredential,
            "auth/email-already-in-use" => AuthErrorCode::EmailAlreadyInUse,
            "auth/weak-password" => AuthErrorCode::WeakPassword,
            "auth/invalid-email" => AuthErrorCode::InvalidEmail,
            "auth/user-not-found" => AuthErrorCode::UserNotFound,
            "auth/network-request-failed" => AuthErrorCode::Network,
            other => AuthErrorCode::Other(other.to_string()),
        }
    }

    /// Returns the `auth/...` code string.
    pub fn as_code(&self) -> &str {
        match self {
            AuthErrorCode::InvalidCredential => "auth/invalid-credential",
            AuthErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthErrorCode::WeakPassword => "auth/weak-password",
            AuthErrorCode::InvalidEmail => "auth/invalid-email",
            AuthErrorCode::UserNotFound => "auth/user-not-found",
            AuthErrorCode::Network => "auth/network-request-failed",
            AuthErrorCode::Other(code) => code,
        }
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Error returned by an identity provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// An external service issuing and validating user sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Selects the storage scope of the next session created by
    /// [`sign_in`](Self::sign_in) or [`sign_up`](Self::sign_up).
    async fn set_persistence(&self, persistence: Persistence) -> Result<(), AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Asks the provider to send a password reset email.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Ends the current session. Local session state is always cleared.
    async fn sign_out(&self);

    /// Subscribes to session changes. Dropping the receiver unsubscribes.
    fn auth_state(&self) -> watch::Receiver<AuthState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_known_codes() {
        for code in [
            AuthErrorCode::InvalidCredential,
            AuthErrorCode::EmailAlreadyInUse,
            AuthErrorCode::WeakPassword,
            AuthErrorCode::InvalidEmail,
            AuthErrorCode::UserNotFound,
            AuthErrorCode::Network,
        ] {
            assert_eq!(AuthErrorCode::from_code(code.as_code()), code);
        }
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let code = AuthErrorCode::from_code("auth/too-many-requests");
        assert_eq!(code, AuthErrorCode::Other("auth/too-many-requests".into()));
        assert_eq!(code.to_string(), "auth/too-many-requests");
    }

    #[test]
    fn test_auth_state_user() {
        let user = User {
            uid: "u1".into(),
            email: "a@example.com".into(),
        };
        assert_eq!(AuthState::SignedIn(user.clone()).user(), Some(&user));
        assert!(AuthState::SignedOut.user().is_none());
        assert!(AuthState::Unknown.user().is_none());
    }

    #[test]
    fn test_persistence_defaults_to_ephemeral() {
        assert_eq!(Persistence::default(), Persistence::Ephemeral);
        let parsed: Persistence = serde_json::from_str("\"durable\"").unwrap();
        assert_eq!(parsed, Persistence::Durable);
    }
}
