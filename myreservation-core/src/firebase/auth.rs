//! Identity Toolkit client.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{FirebaseConfig, SessionFile, StoredSession, TokenSource};
use crate::auth::{AuthError, AuthErrorCode, AuthState, IdentityProvider, Persistence, User};
use crate::lock;
use crate::store::StoreError;

/// ID tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Refresh errors meaning the session is gone for good.
const SESSION_ENDED: &[&str] = &[
    "TOKEN_EXPIRED",
    "INVALID_REFRESH_TOKEN",
    "USER_DISABLED",
    "USER_NOT_FOUND",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Failure of a REST call, before it is mapped for callers.
#[derive(Debug)]
enum RestError {
    Network(String),
    /// Error message returned by the API, e.g. `WEAK_PASSWORD : ...`.
    Api(String),
    Decode(String),
}

impl RestError {
    fn api_code(&self) -> Option<&str> {
        match self {
            RestError::Api(message) => Some(split_message(message).0),
            _ => None,
        }
    }

    fn into_auth_error(self) -> AuthError {
        match self {
            RestError::Network(e) => AuthError::new(AuthErrorCode::Network, e),
            RestError::Decode(e) => {
                AuthError::new(AuthErrorCode::Other("auth/internal-error".into()), e)
            }
            RestError::Api(message) => map_api_error(&message),
        }
    }
}

/// Splits `CODE : detail` into its parts.
fn split_message(message: &str) -> (&str, Option<&str>) {
    match message.split_once(':') {
        Some((code, detail)) => (code.trim(), Some(detail.trim())),
        None => (message.trim(), None),
    }
}

/// Maps an Identity Toolkit error message to the client error taxonomy.
pub(crate) fn map_api_error(message: &str) -> AuthError {
    let (code, detail) = split_message(message);
    let mapped = match code {
        "EMAIL_EXISTS" => AuthErrorCode::EmailAlreadyInUse,
        "INVALID_LOGIN_CREDENTIALS" | "INVALID_PASSWORD" => AuthErrorCode::InvalidCredential,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthErrorCode::UserNotFound,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthErrorCode::InvalidEmail,
        "WEAK_PASSWORD" => AuthErrorCode::WeakPassword,
        other => AuthErrorCode::Other(format!(
            "auth/{}",
            other.to_ascii_lowercase().replace('_', "-")
        )),
    };
    AuthError::new(mapped, detail.unwrap_or(code))
}

#[derive(Debug, Clone)]
struct Tokens {
    user: User,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Tokens {
    fn stored(&self) -> StoredSession {
        StoredSession {
            uid: self.user.uid.clone(),
            email: self.user.email.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now()
    }
}

fn expiry(expires_in: &str) -> DateTime<Utc> {
    let secs = expires_in.parse::<i64>().unwrap_or(3600);
    Utc::now() + Duration::seconds(secs)
}

/// Email/password sessions against Firebase Authentication.
///
/// Starts in [`AuthState::Unknown`]; call [`restore`](Self::restore) once to
/// resume a durable session or report the signed-out state.
pub struct FirebaseAuth {
    http: reqwest::Client,
    config: FirebaseConfig,
    session_file: Option<SessionFile>,
    persistence: Mutex<Persistence>,
    tokens: tokio::sync::Mutex<Option<Tokens>>,
    state: watch::Sender<AuthState>,
}

impl FirebaseAuth {
    /// Without a session file durable sessions are kept in memory only.
    pub fn new(config: FirebaseConfig, session_file: Option<SessionFile>) -> Self {
        let (state, _) = watch::channel(AuthState::Unknown);
        Self {
            http: reqwest::Client::new(),
            config,
            session_file,
            persistence: Mutex::new(Persistence::default()),
            tokens: tokio::sync::Mutex::new(None),
            state,
        }
    }

    /// Resumes the stored session, if any, and publishes the first state.
    ///
    /// The stored refresh token is not checked here. If the provider rejects
    /// it on first use the user is signed out.
    pub async fn restore(&self) {
        let stored = match &self.session_file {
            Some(file) => file.load().unwrap_or_else(|e| {
                warn!("{}", e);
                None
            }),
            None => None,
        };

        let Some(stored) = stored else {
            self.state.send_replace(AuthState::SignedOut);
            return;
        };

        *lock(&self.persistence) = Persistence::Durable;
        let user = User {
            uid: stored.uid,
            email: stored.email,
        };
        *self.tokens.lock().await = Some(Tokens {
            user: user.clone(),
            id_token: String::new(),
            refresh_token: stored.refresh_token,
            expires_at: DateTime::<Utc>::default(),
        });
        info!(uid = %user.uid, "Restored session");
        self.state.send_replace(AuthState::SignedIn(user));
    }

    fn url(&self, base: &str, method: &str) -> String {
        format!(
            "{}/{}?key={}",
            base,
            method,
            urlencoding::encode(&self.config.api_key)
        )
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, RestError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(url = %url.split('?').next().unwrap_or_default(), "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RestError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope.error.message,
                Err(_) => status.to_string(),
            };
            return Err(RestError::Api(message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| RestError::Decode(e.to_string()))
    }

    async fn password_call(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let url = self.url(&self.config.endpoints.identity_toolkit, method);
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: PasswordResponse = self
            .post(&url, &body)
            .await
            .map_err(RestError::into_auth_error)?;

        let user = User {
            uid: response.local_id,
            email: response.email.unwrap_or_else(|| email.to_string()),
        };
        let tokens = Tokens {
            user: user.clone(),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: expiry(&response.expires_in),
        };

        self.store_session(&tokens);
        *self.tokens.lock().await = Some(tokens);
        self.state.send_replace(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    /// Writes or removes the session file according to the persistence.
    fn store_session(&self, tokens: &Tokens) {
        let Some(file) = &self.session_file else {
            return;
        };
        let result = match *lock(&self.persistence) {
            Persistence::Durable => file.save(&tokens.stored()),
            Persistence::Ephemeral => file.clear(),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    fn clear_session_file(&self) {
        if let Some(file) = &self.session_file {
            if let Err(e) = file.clear() {
                warn!("{}", e);
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn set_persistence(&self, persistence: Persistence) -> Result<(), AuthError> {
        *lock(&self.persistence) = persistence;
        // An existing session moves to the new storage.
        if let Some(tokens) = self.tokens.lock().await.as_ref() {
            self.store_session(tokens);
        }
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.password_call("accounts:signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.password_call("accounts:signUp", email, password).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let url = self.url(&self.config.endpoints.identity_toolkit, "accounts:sendOobCode");
        let body = OobRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        self.post::<_, serde_json::Value>(&url, &body)
            .await
            .map_err(RestError::into_auth_error)?;
        Ok(())
    }

    async fn sign_out(&self) {
        if let Some(tokens) = self.tokens.lock().await.take() {
            info!(uid = %tokens.user.uid, "Signed out");
        }
        self.clear_session_file();
        self.state.send_replace(AuthState::SignedOut);
    }

    fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

#[async_trait]
impl TokenSource for FirebaseAuth {
    async fn id_token(&self) -> Result<Option<String>, StoreError> {
        let mut guard = self.tokens.lock().await;
        let Some(tokens) = guard.as_mut() else {
            return Ok(None);
        };
        if tokens.is_fresh() {
            return Ok(Some(tokens.id_token.clone()));
        }

        let url = self.url(&self.config.endpoints.secure_token, "token");
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &tokens.refresh_token,
        };

        match self.post::<_, RefreshResponse>(&url, &body).await {
            Ok(response) => {
                debug!(uid = %tokens.user.uid, "Refreshed ID token");
                let rotated = response.refresh_token != tokens.refresh_token;
                tokens.id_token = response.id_token;
                tokens.refresh_token = response.refresh_token;
                tokens.expires_at = expiry(&response.expires_in);
                if rotated {
                    self.store_session(tokens);
                }
                Ok(Some(tokens.id_token.clone()))
            }
            Err(e) if e.api_code().is_some_and(|code| SESSION_ENDED.contains(&code)) => {
                warn!(uid = %tokens.user.uid, error = ?e, "Session rejected by provider, signing out");
                *guard = None;
                drop(guard);
                self.clear_session_file();
                self.state.send_replace(AuthState::SignedOut);
                Err(StoreError::Unauthenticated)
            }
            Err(RestError::Network(e)) => Err(StoreError::Transport(e)),
            Err(RestError::Api(message)) => Err(StoreError::Backend {
                status: split_message(&message).0.to_string(),
                message,
            }),
            Err(RestError::Decode(e)) => Err(StoreError::Decode(e)),
        }
    }
}
