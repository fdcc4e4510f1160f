//! Firebase REST adapter.
//!
//! [`FirebaseAuth`] implements [`IdentityProvider`](crate::IdentityProvider)
//! over the Identity Toolkit and Secure Token APIs; [`Firestore`] implements
//! [`DocumentStore`](crate::DocumentStore) over the Firestore REST API, with
//! live queries served by polling.

mod auth;
mod firestore;
mod session_file;
mod wire;

use async_trait::async_trait;

pub use auth::FirebaseAuth;
pub use firestore::Firestore;
pub use session_file::{SessionFile, SessionFileError, StoredSession};

use crate::store::StoreError;

/// Base URLs of the Firebase REST APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub identity_toolkit: String,
    pub secure_token: String,
    pub firestore: String,
}

impl Endpoints {
    pub fn production() -> Self {
        Self {
            identity_toolkit: "https://identitytoolkit.googleapis.com/v1".to_string(),
            secure_token: "https://securetoken.googleapis.com/v1".to_string(),
            firestore: "https://firestore.googleapis.com/v1".to_string(),
        }
    }

    /// Production endpoints, with each service pointed at its emulator when a
    /// `host:port` is given.
    pub fn with_emulators(auth_host: Option<&str>, firestore_host: Option<&str>) -> Self {
        let mut endpoints = Self::production();
        if let Some(host) = auth_host {
            endpoints.identity_toolkit = format!("http://{}/identitytoolkit.googleapis.com/v1", host);
            endpoints.secure_token = format!("http://{}/securetoken.googleapis.com/v1", host);
        }
        if let Some(host) = firestore_host {
            endpoints.firestore = format!("http://{}/v1", host);
        }
        endpoints
    }

    /// Points every service at `base`. Used against mock servers.
    pub fn at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            identity_toolkit: format!("{}/identitytoolkit.googleapis.com/v1", base),
            secure_token: format!("{}/securetoken.googleapis.com/v1", base),
            firestore: format!("{}/v1", base),
        }
    }
}

/// Project settings shared by the auth and Firestore clients.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub database: String,
    pub endpoints: Endpoints,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            database: "(default)".to_string(),
            endpoints: Endpoints::production(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// `projects/{project}/databases/{database}/documents`
    pub fn documents_path(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }
}

/// Supplies the bearer token attached to Firestore requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current ID token, refreshed if close to expiry. `None` while signed out.
    async fn id_token(&self) -> Result<Option<String>, StoreError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_endpoints() {
        let endpoints = Endpoints::with_emulators(Some("127.0.0.1:9099"), Some("127.0.0.1:8080"));
        assert_eq!(
            endpoints.identity_toolkit,
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1"
        );
        assert_eq!(
            endpoints.secure_token,
            "http://127.0.0.1:9099/securetoken.googleapis.com/v1"
        );
        assert_eq!(endpoints.firestore, "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn test_partial_emulator_keeps_production() {
        let endpoints = Endpoints::with_emulators(None, Some("localhost:8080"));
        assert_eq!(
            endpoints.identity_toolkit,
            Endpoints::production().identity_toolkit
        );
        assert_eq!(endpoints.firestore, "http://localhost:8080/v1");
    }

    #[test]
    fn test_documents_path() {
        let config = FirebaseConfig::new("key", "salon-demo");
        assert_eq!(
            config.documents_path(),
            "projects/salon-demo/databases/(default)/documents"
        );
    }
}
