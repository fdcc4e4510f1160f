//! Live list of the signed-in user's reservations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::{field, Reservation, COLLECTION};
use crate::session::SessionContext;
use crate::store::{DocumentStore, Query, Snapshot, StoreError, Subscription};

/// What the feed currently shows.
#[derive(Debug, PartialEq)]
pub enum FeedView<'a> {
    /// No snapshot received yet.
    Loading,
    /// The "no reservations" placeholder.
    Empty,
    Reservations(&'a [Reservation]),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("Reservation not found: {0}")]
    NotListed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A subscription to the current user's reservations, sorted newest date first.
///
/// The feed never edits its list locally: deletions show up once the store
/// pushes the next snapshot.
pub struct ReservationFeed {
    store: Arc<dyn DocumentStore>,
    subscription: Subscription,
    reservations: Option<Vec<Reservation>>,
    live: bool,
}

impl ReservationFeed {
    /// Subscribes to the reservations owned by the session user.
    pub async fn open(ctx: &SessionContext) -> Result<Self, StoreError> {
        let query = Query::new(COLLECTION).where_eq(field::USER_ID, ctx.user().uid.as_str());
        let subscription = ctx.store().subscribe(query).await?;
        debug!(uid = %ctx.user().uid, "Opened reservation feed");

        Ok(Self {
            store: ctx.store().clone(),
            subscription,
            reservations: None,
            live: true,
        })
    }

    /// Waits for the next snapshot and replaces the list with it.
    ///
    /// Returns `None` once the subscription has ended. On error the previous
    /// list stays in place.
    pub async fn next_snapshot(&mut self) -> Option<Result<(), StoreError>> {
        let Some(result) = self.subscription.next_snapshot().await else {
            self.live = false;
            return None;
        };
        Some(result.map(|snapshot| self.apply(snapshot)))
    }

    /// False once the subscription has ended.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Replaces the list with `snapshot`.
    pub fn apply(&mut self, snapshot: Snapshot) {
        let mut reservations: Vec<Reservation> = snapshot
            .documents
            .iter()
            .filter_map(|doc| match Reservation::from_document(doc) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping malformed reservation");
                    None
                }
            })
            .collect();

        sort_newest_first(&mut reservations);
        self.reservations = Some(reservations);
    }

    pub fn view(&self) -> FeedView<'_> {
        match &self.reservations {
            None => FeedView::Loading,
            Some(list) if list.is_empty() => FeedView::Empty,
            Some(list) => FeedView::Reservations(list),
        }
    }

    /// Current list; empty while loading.
    pub fn reservations(&self) -> &[Reservation] {
        self.reservations.as_deref().unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Reservation> {
        self.reservations().iter().find(|r| r.id == id)
    }

    /// Starts deleting a listed reservation.
    ///
    /// Nothing is removed until the returned [`PendingDelete`] is confirmed.
    /// Only records in this feed, and therefore owned by the session user,
    /// can be deleted.
    pub fn request_delete(&self, id: &str) -> Result<PendingDelete, FeedError> {
        let reservation = self
            .get(id)
            .cloned()
            .ok_or_else(|| FeedError::NotListed(id.to_string()))?;

        Ok(PendingDelete {
            store: self.store.clone(),
            reservation,
        })
    }

    /// Unsubscribes from the store.
    pub fn close(self) {
        self.subscription.unsubscribe();
    }
}

/// Date descending; equal dates keep snapshot order.
///
/// Dates are fixed-width `YYYY-MM-DD`, so string order is date order.
fn sort_newest_first(reservations: &mut [Reservation]) {
    reservations.sort_by(|a, b| b.date.cmp(&a.date));
}

/// A deletion awaiting the user's confirmation.
#[must_use = "a pending delete does nothing unless confirmed"]
pub struct PendingDelete {
    store: Arc<dyn DocumentStore>,
    reservation: Reservation,
}

impl PendingDelete {
    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    /// Deletes the reservation from the store.
    pub async fn confirm(self) -> Result<(), FeedError> {
        self.store.delete(COLLECTION, &self.reservation.id).await?;
        info!(id = %self.reservation.id, "Reservation deleted");
        Ok(())
    }

    /// Abandons the deletion.
    pub fn cancel(self) {}
}

impl std::fmt::Debug for PendingDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDelete")
            .field("reservation", &self.reservation)
            .finish_non_exhaustive()
    }
}
