//! Credential form: sign-in, sign-up and password reset.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{IdentityProvider, Persistence, User};
use crate::messages::AuthMessage;

/// Whether the form signs into an existing account or registers a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    SignIn,
    SignUp,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::SignIn => Mode::SignUp,
            Mode::SignUp => Mode::SignIn,
        }
    }
}

/// State of the credential form shown while signed out.
pub struct CredentialForm {
    provider: Arc<dyn IdentityProvider>,
    mode: Mode,
    persistence: Persistence,
    error: Option<AuthMessage>,
    notice: Option<AuthMessage>,
}

impl CredentialForm {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            mode: Mode::default(),
            persistence: Persistence::default(),
            error: None,
            notice: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Chooses whether the next session survives a restart.
    pub fn set_persistence(&mut self, persistence: Persistence) {
        self.persistence = persistence;
    }

    /// Last failure, if any.
    pub fn error(&self) -> Option<AuthMessage> {
        self.error
    }

    /// Last informational message, if any.
    pub fn notice(&self) -> Option<AuthMessage> {
        self.notice
    }

    /// Switches between sign-in and sign-up and clears the previous error.
    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
        self.error = None;
    }

    /// Signs in or up according to the current mode.
    ///
    /// The chosen persistence is applied before the credentials are sent so
    /// it governs where the resulting session is kept. On failure the message
    /// is also kept in [`error`](Self::error).
    pub async fn submit(&mut self, email: &str, password: &str) -> Result<User, AuthMessage> {
        self.error = None;

        let email = email.trim();
        if email.is_empty() {
            return Err(self.fail(AuthMessage::EmailRequired));
        }
        if password.is_empty() {
            return Err(self.fail(AuthMessage::PasswordRequired));
        }

        if let Err(e) = self.provider.set_persistence(self.persistence).await {
            debug!(error = %e, "Failed to set persistence");
            return Err(self.fail(AuthMessage::for_sign_in(&e.code)));
        }

        let result = match self.mode {
            Mode::SignIn => self.provider.sign_in(email, password).await,
            Mode::SignUp => self.provider.sign_up(email, password).await,
        };

        match result {
            Ok(user) => {
                info!(uid = %user.uid, mode = ?self.mode, persistence = %self.persistence, "Signed in");
                self.notice = None;
                Ok(user)
            }
            Err(e) => {
                debug!(code = %e.code, "Authentication failed: {}", e.message);
                Err(self.fail(AuthMessage::for_sign_in(&e.code)))
            }
        }
    }

    /// Asks the provider to email a password reset link.
    ///
    /// An empty address is rejected locally without contacting the provider.
    pub async fn request_password_reset(&mut self, email: &str) -> Result<(), AuthMessage> {
        self.notice = None;

        let email = email.trim();
        if email.is_empty() {
            return Err(self.fail(AuthMessage::EmailRequired));
        }

        match self.provider.send_password_reset(email).await {
            Ok(()) => {
                self.error = None;
                self.notice = Some(AuthMessage::ResetEmailSent);
                Ok(())
            }
            Err(e) => {
                debug!(code = %e.code, "Password reset failed: {}", e.message);
                Err(self.fail(AuthMessage::for_password_reset(&e.code)))
            }
        }
    }

    fn fail(&mut self, message: AuthMessage) -> AuthMessage {
        self.error = Some(message);
        message
    }
}
