//! Reservation submission form.

use tracing::{info, warn};

use crate::messages::{Locale, UiText};
use crate::models::{DraftError, ReservationDraft, COLLECTION};
use crate::session::SessionContext;
use crate::store::WriteResult;

/// Outcome message shown under the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitMessage {
    Completed,
    /// Rejected locally before any network call.
    Invalid(DraftError),
    /// Raw message of the store error.
    Failed(String),
}

impl SubmitMessage {
    pub fn is_error(&self) -> bool {
        !matches!(self, SubmitMessage::Completed)
    }

    pub fn text(&self, locale: Locale) -> String {
        match self {
            SubmitMessage::Completed => UiText::ReservationCompleted.text(locale).to_string(),
            SubmitMessage::Invalid(e) => e.text(locale),
            SubmitMessage::Failed(message) => {
                format!("{}{}", UiText::ErrorPrefix.text(locale), message)
            }
        }
    }
}

/// The new-reservation form.
///
/// `submit` takes `&mut self`, so a form cannot be submitted again while a
/// submission is still in flight.
#[derive(Debug, Default)]
pub struct ReservationForm {
    pub draft: ReservationDraft,
    message: Option<SubmitMessage>,
}

impl ReservationForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> Option<&SubmitMessage> {
        self.message.as_ref()
    }

    /// Stores the draft as a pending reservation owned by the session user.
    ///
    /// Clears the draft on success. On failure the draft is kept for another
    /// attempt.
    pub async fn submit(&mut self, ctx: &SessionContext) -> Result<WriteResult, SubmitMessage> {
        let fields = match self.draft.to_fields(ctx.user()) {
            Ok(fields) => fields,
            Err(e) => return Err(self.finish(SubmitMessage::Invalid(e))),
        };

        match ctx.store().add(COLLECTION, fields).await {
            Ok(write) => {
                info!(id = %write.id, uid = %ctx.user().uid, "Reservation created");
                self.draft = ReservationDraft::default();
                self.message = Some(SubmitMessage::Completed);
                Ok(write)
            }
            Err(e) => {
                warn!(error = %e, "Failed to create reservation");
                Err(self.finish(SubmitMessage::Failed(e.to_string())))
            }
        }
    }

    fn finish(&mut self, message: SubmitMessage) -> SubmitMessage {
        self.message = Some(message.clone());
        message
    }
}
