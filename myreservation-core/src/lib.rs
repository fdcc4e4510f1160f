//! MyReservation Core Library
//!
//! Reservation model and the client components of the booking app: the
//! session gate, the credential form, reservation submission and the live
//! reservation feed. Identity and persistence are delegated to an external
//! backend through the [`IdentityProvider`] and [`DocumentStore`] seams.

pub mod app;
pub mod auth;
pub mod credential;
pub mod feed;
pub mod firebase;
pub mod memory;
pub mod messages;
pub mod models;
pub mod session;
pub mod store;
pub mod submission;

pub use app::{App, AppEvent, Home};
pub use auth::{AuthError, AuthErrorCode, AuthState, IdentityProvider, Persistence, User};
pub use credential::{CredentialForm, Mode};
pub use feed::{FeedError, FeedView, PendingDelete, ReservationFeed};
pub use memory::MemoryBackend;
pub use messages::{AuthMessage, Locale, UiText};
pub use models::{
    DraftError, ModelError, Reservation, ReservationDraft, ReservationStatus, ServiceCategory,
};
pub use session::{SessionContext, SessionGate, View};
pub use store::{
    Document, DocumentStore, Fields, Filter, Query, Snapshot, StoreError, Subscription, Value,
    WriteResult,
};
pub use submission::{ReservationForm, SubmitMessage};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
