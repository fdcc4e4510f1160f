use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::messages::Locale;
use crate::store::{Document, Fields, Value};

/// Collection holding all reservations.
pub const COLLECTION: &str = "reservations";

/// Stored field names.
pub mod field {
    pub const USER_ID: &str = "userId";
    pub const USER_EMAIL: &str = "userEmail";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const SERVICE: &str = "service";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
}

/// Service offered for booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "カット")]
    Cut,
    #[serde(rename = "カラー")]
    Color,
    #[serde(rename = "パーマ")]
    Perm,
    #[serde(rename = "トリートメント")]
    Treatment,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 4] = [
        ServiceCategory::Cut,
        ServiceCategory::Color,
        ServiceCategory::Perm,
        ServiceCategory::Treatment,
    ];

    /// Stored label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Cut => "カット",
            ServiceCategory::Color => "カラー",
            ServiceCategory::Perm => "パーマ",
            ServiceCategory::Treatment => "トリートメント",
        }
    }

    /// Short ASCII name used on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            ServiceCategory::Cut => "cut",
            ServiceCategory::Color => "color",
            ServiceCategory::Perm => "perm",
            ServiceCategory::Treatment => "treatment",
        }
    }

    /// Parses a stored label or a command-line key.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.key().eq_ignore_ascii_case(s))
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ja => self.as_str(),
            Locale::En => match self {
                ServiceCategory::Cut => "Cut",
                ServiceCategory::Color => "Color",
                ServiceCategory::Perm => "Perm",
                ServiceCategory::Treatment => "Treatment",
            },
        }
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceCategory {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ModelError::InvalidService(s.to_string()))
    }
}

/// Review state of a reservation.
///
/// Clients only ever create pending reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
        }
    }

    /// Anything other than `confirmed` reads as pending.
    pub fn parse(s: &str) -> Self {
        if s == "confirmed" {
            ReservationStatus::Confirmed
        } else {
            ReservationStatus::Pending
        }
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::Ja, ReservationStatus::Pending) => "保留中",
            (Locale::Ja, ReservationStatus::Confirmed) => "確定",
            (Locale::En, ReservationStatus::Pending) => "Pending",
            (Locale::En, ReservationStatus::Confirmed) => "Confirmed",
        }
    }
}

/// A stored reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub service: ServiceCategory,
    pub status: ReservationStatus,
    /// Set by the store; absent only for writes not yet applied.
    pub created_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn from_document(doc: &Document) -> Result<Self, ModelError> {
        let required = |name: &'static str| {
            doc.get_str(name)
                .map(str::to_string)
                .ok_or(ModelError::MissingField(name))
        };

        let service_label = required(field::SERVICE)?;
        let service = ServiceCategory::parse(&service_label)
            .ok_or(ModelError::InvalidService(service_label))?;

        Ok(Self {
            id: doc.id.clone(),
            user_id: required(field::USER_ID)?,
            user_email: doc.get_str(field::USER_EMAIL).unwrap_or_default().to_string(),
            date: required(field::DATE)?,
            time: required(field::TIME)?,
            service,
            status: doc
                .get_str(field::STATUS)
                .map(ReservationStatus::parse)
                .unwrap_or_default(),
            created_at: doc.get(field::CREATED_AT).and_then(Value::as_timestamp),
        })
    }
}

/// Fields of a reservation being entered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReservationDraft {
    pub service: Option<ServiceCategory>,
    pub date: String,
    pub time: String,
}

impl ReservationDraft {
    pub fn new(service: ServiceCategory, date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            service: Some(service),
            date: date.into(),
            time: time.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.date.is_empty() && self.time.is_empty()
    }

    /// Checks that every field is present and encoded as stored.
    pub fn validate(&self) -> Result<ServiceCategory, DraftError> {
        let service = self.service.ok_or(DraftError::MissingService)?;
        if self.date.is_empty() {
            return Err(DraftError::MissingDate);
        }
        if self.time.is_empty() {
            return Err(DraftError::MissingTime);
        }
        // Fixed width keeps lexicographic order equal to chronological order.
        if self.date.len() != 10 || NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").is_err() {
            return Err(DraftError::InvalidDate(self.date.clone()));
        }
        if self.time.len() != 5 || NaiveTime::parse_from_str(&self.time, "%H:%M").is_err() {
            return Err(DraftError::InvalidTime(self.time.clone()));
        }
        Ok(service)
    }

    /// Builds the record to store for `owner`.
    pub fn to_fields(&self, owner: &User) -> Result<Fields, DraftError> {
        let service = self.validate()?;

        let mut fields = Fields::new();
        fields.insert(field::USER_ID.into(), owner.uid.as_str().into());
        fields.insert(field::USER_EMAIL.into(), owner.email.as_str().into());
        fields.insert(field::DATE.into(), self.date.as_str().into());
        fields.insert(field::TIME.into(), self.time.as_str().into());
        fields.insert(field::SERVICE.into(), service.as_str().into());
        fields.insert(
            field::STATUS.into(),
            ReservationStatus::Pending.as_str().into(),
        );
        fields.insert(field::CREATED_AT.into(), Value::ServerTimestamp);
        Ok(fields)
    }
}

/// Validation errors for a draft, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Service is required")]
    MissingService,
    #[error("Date is required")]
    MissingDate,
    #[error("Time is required")]
    MissingTime,
    #[error("Date must be YYYY-MM-DD: {0}")]
    InvalidDate(String),
    #[error("Time must be HH:MM: {0}")]
    InvalidTime(String),
}

impl DraftError {
    pub fn text(&self, locale: Locale) -> String {
        match locale {
            Locale::Ja => match self {
                DraftError::MissingService => "サービスを選択してください".to_string(),
                DraftError::MissingDate => "日付を入力してください".to_string(),
                DraftError::MissingTime => "時間を入力してください".to_string(),
                DraftError::InvalidDate(d) => {
                    format!("日付の形式が正しくありません (YYYY-MM-DD): {}", d)
                }
                DraftError::InvalidTime(t) => {
                    format!("時間の形式が正しくありません (HH:MM): {}", t)
                }
            },
            Locale::En => self.to_string(),
        }
    }
}

/// Errors reading a stored reservation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Unknown service: {0}")]
    InvalidService(String),
}
