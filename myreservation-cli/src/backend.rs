//! Wiring of the identity provider and document store used by commands.

use std::sync::Arc;
use std::time::Duration;

use myreservation_core::firebase::{FirebaseAuth, Firestore, SessionFile, TokenSource};
use myreservation_core::{DocumentStore, IdentityProvider, StoreError};
use tracing::warn;

use crate::config::{Config, ConfigError};

pub struct Backend {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl Backend {
    /// Connects to Firebase and resumes the stored session, if any.
    pub async fn connect(config: &Config) -> Result<Self, ConfigError> {
        let firebase = config.firebase_config()?;
        let session_file = SessionFile::in_dir(&config.data_dir.value);

        let auth = Arc::new(FirebaseAuth::new(firebase.clone(), Some(session_file)));
        auth.restore().await;

        let store = Firestore::new(firebase, auth.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms.value));

        Ok(Self {
            provider: auth.clone(),
            store: Arc::new(store),
            tokens: Some(auth as Arc<dyn TokenSource>),
        })
    }

    #[cfg(test)]
    pub fn memory(backend: &myreservation_core::MemoryBackend) -> Self {
        Self {
            provider: Arc::new(backend.clone()),
            store: Arc::new(backend.clone()),
            tokens: None,
        }
    }

    pub fn provider(&self) -> Arc<dyn IdentityProvider> {
        self.provider.clone()
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// Checks the restored session with the provider.
    ///
    /// A session the provider no longer accepts ends here, so commands see
    /// the signed-out state. Network failures leave the session as it is.
    pub async fn verify_session(&self) {
        let Some(tokens) = &self.tokens else {
            return;
        };
        match tokens.id_token().await {
            Ok(_) | Err(StoreError::Unauthenticated) => {}
            Err(e) => warn!(error = %e, "Could not verify session"),
        }
    }
}
