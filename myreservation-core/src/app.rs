//! Top-level application state.
//!
//! [`App`] keeps the components in step with the session: while signed out it
//! offers the credential form, while signed in it owns exactly one
//! [`Home`] scope holding the submission form and the live feed for that user.

use std::sync::Arc;

use tracing::info;

use crate::auth::IdentityProvider;
use crate::credential::CredentialForm;
use crate::feed::ReservationFeed;
use crate::session::{SessionContext, SessionGate, View};
use crate::store::{DocumentStore, StoreError};
use crate::submission::ReservationForm;

/// Something [`App::next_event`] observed.
#[derive(Debug, PartialEq)]
pub enum AppEvent {
    /// The session changed; the app has been reconciled to this view.
    Session(Result<View, StoreError>),
    /// The feed received a snapshot or a snapshot error.
    Feed(Result<(), StoreError>),
    /// The feed's subscription ended.
    FeedEnded,
}

/// Everything that exists only while a user is signed in.
pub struct Home {
    pub context: SessionContext,
    pub form: ReservationForm,
    pub feed: ReservationFeed,
}

pub struct App {
    gate: SessionGate,
    store: Arc<dyn DocumentStore>,
    pub login: CredentialForm,
    home: Option<Home>,
}

impl App {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            gate: SessionGate::new(provider.clone()),
            store,
            login: CredentialForm::new(provider),
            home: None,
        }
    }

    pub fn view(&self) -> View {
        self.gate.view()
    }

    pub fn home(&self) -> Option<&Home> {
        self.home.as_ref()
    }

    pub fn home_mut(&mut self) -> Option<&mut Home> {
        self.home.as_mut()
    }

    /// Brings the signed-in scope in line with the current session.
    ///
    /// Opens a feed when a user signs in and tears it down when they sign out
    /// or a different user signs in, so at most one subscription is open.
    pub async fn reconcile(&mut self) -> Result<View, StoreError> {
        let view = self.gate.view();

        match (&view, &self.home) {
            (View::SignedIn(user), Some(home)) if home.context.user() == user => {}
            (View::SignedIn(user), _) => {
                self.close_home();
                let context = SessionContext::new(user.clone(), self.store.clone());
                let feed = ReservationFeed::open(&context).await?;
                info!(uid = %user.uid, "Session started");
                self.home = Some(Home {
                    context,
                    form: ReservationForm::new(),
                    feed,
                });
            }
            (_, Some(_)) => self.close_home(),
            (_, None) => {}
        }

        Ok(view)
    }

    /// Waits for the next session change and reconciles.
    ///
    /// Returns `None` once the identity provider is gone.
    pub async fn changed(&mut self) -> Option<Result<View, StoreError>> {
        self.gate.changed().await?;
        Some(self.reconcile().await)
    }

    /// Waits for a session change or a feed snapshot, whichever comes first.
    ///
    /// Returns `None` once the identity provider is gone.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        enum Woke {
            Session(Option<View>),
            Feed(Option<Result<(), StoreError>>),
        }

        let woke = match self.home.as_mut() {
            Some(home) if home.feed.is_live() => tokio::select! {
                view = self.gate.changed() => Woke::Session(view),
                snapshot = home.feed.next_snapshot() => Woke::Feed(snapshot),
            },
            _ => Woke::Session(self.gate.changed().await),
        };

        match woke {
            Woke::Session(None) => None,
            Woke::Session(Some(_)) => Some(AppEvent::Session(self.reconcile().await)),
            Woke::Feed(Some(result)) => Some(AppEvent::Feed(result)),
            Woke::Feed(None) => Some(AppEvent::FeedEnded),
        }
    }

    /// Closes the signed-in scope, then signs out.
    pub async fn sign_out(&mut self) -> View {
        self.close_home();
        self.gate.sign_out().await;
        self.gate.view()
    }

    fn close_home(&mut self) {
        if let Some(home) = self.home.take() {
            info!(uid = %home.context.user().uid, "Session ended");
            home.feed.close();
        }
    }
}
