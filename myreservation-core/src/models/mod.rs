mod reservation;

pub use reservation::{
    field, DraftError, ModelError, Reservation, ReservationDraft, ReservationStatus,
    ServiceCategory, COLLECTION,
};
