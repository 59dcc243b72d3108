//! Pending booking draft model and compose-step validation.
//!
//! # Responsibility
//! - Define the single-slot draft persisted between compose and review.
//! - Define attachment shapes (bytes vs. display metadata).
//! - Validate compose input before anything is persisted or sent.
//!
//! # Invariants
//! - A draft is scoped to exactly one `service_id`.
//! - Draft JSON never carries attachment bytes; bytes live in the file store.
//! - Consultation services require both `date` and `time`.
//!
//! # See also
//! - docs/architecture/booking-lifecycle.md

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").expect("valid date regex")
});
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"));

/// Booking shape of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Scheduled session; date and time are required.
    Consultation,
    /// Deliverable work; no appointment slot.
    Standard,
}

/// Service context the compose/review screens operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub kind: ServiceKind,
}

/// One attachment with its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DraftFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size(),
        }
    }
}

/// Display metadata for an attachment, stored inside the draft JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Booking created from this draft, recorded before the payment link is
/// requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBookingRef {
    pub id: String,
    pub booking_number: String,
}

/// Draft persisted in the `pending_booking` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBookingDraft {
    pub service_id: String,
    pub service_name: String,
    /// Service price at compose time.
    pub price: Decimal,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub requirements: String,
    /// Metadata of files held in the file store under `service_id`.
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    /// Idempotency key sent with booking creation.
    pub client_token: Uuid,
    #[serde(default)]
    pub created_booking: Option<CreatedBookingRef>,
}

impl PendingBookingDraft {
    /// Builds a draft from a validated compose form.
    pub fn from_form(service: &ServiceSummary, form: &ComposeForm) -> Self {
        Self {
            service_id: service.id.clone(),
            service_name: service.name.clone(),
            price: service.price,
            date: form.date.clone(),
            time: form.time.clone(),
            requirements: form.requirements.clone(),
            attachments: form.files.iter().map(DraftFile::meta).collect(),
            client_token: Uuid::new_v4(),
            created_booking: None,
        }
    }

    /// Whether two drafts describe the same booking request.
    ///
    /// Ignores `client_token` and `created_booking`.
    pub fn same_request(&self, other: &PendingBookingDraft) -> bool {
        self.service_id == other.service_id
            && self.price == other.price
            && self.date == other.date
            && self.time == other.time
            && self.requirements == other.requirements
            && self.attachments == other.attachments
    }
}

/// Navigation signal distinguishing a fresh compose visit from a return
/// from review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeEntry {
    Fresh,
    ReturnFromReview,
}

impl ComposeEntry {
    /// Query parameter value the review screen appends (`?from=review`).
    pub const RETURN_QUERY_VALUE: &'static str = "review";

    /// Reads the signal from the compose URL query `from` parameter.
    ///
    /// Anything other than an explicit `review` is a fresh visit, so a reload
    /// or direct link never resurrects an old draft.
    pub fn from_query(from: Option<&str>) -> Self {
        match from.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case(Self::RETURN_QUERY_VALUE) => {
                Self::ReturnFromReview
            }
            _ => Self::Fresh,
        }
    }
}

/// Attachment limits applied on compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeLimits {
    pub max_files: usize,
    pub max_file_bytes: u64,
}

impl Default for ComposeLimits {
    fn default() -> Self {
        Self {
            max_files: 6,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Compose screen form state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeForm {
    pub date: Option<String>,
    pub time: Option<String>,
    pub requirements: String,
    pub files: Vec<DraftFile>,
}

impl ComposeForm {
    /// Rebuilds the form a draft was made from.
    pub fn from_draft(draft: &PendingBookingDraft, files: Vec<DraftFile>) -> Self {
        Self {
            date: draft.date.clone(),
            time: draft.time.clone(),
            requirements: draft.requirements.clone(),
            files,
        }
    }

    /// Trims text fields and drops blank date/time values.
    pub fn normalized(mut self) -> Self {
        self.date = blank_to_none(self.date);
        self.time = blank_to_none(self.time);
        self.requirements = self.requirements.trim().to_string();
        self
    }

    /// Validates the form for a service kind.
    ///
    /// # Errors
    /// - Missing or malformed date/time for consultation services.
    /// - More than `limits.max_files` attachments.
    /// - Any attachment above `limits.max_file_bytes`, or with a blank name.
    pub fn validate(
        &self,
        kind: ServiceKind,
        limits: ComposeLimits,
    ) -> Result<(), ComposeValidationError> {
        if kind == ServiceKind::Consultation {
            let date = self
                .date
                .as_deref()
                .ok_or(ComposeValidationError::MissingDate)?;
            if !DATE_RE.is_match(date) {
                return Err(ComposeValidationError::InvalidDate(date.to_string()));
            }
            let time = self
                .time
                .as_deref()
                .ok_or(ComposeValidationError::MissingTime)?;
            if !TIME_RE.is_match(time) {
                return Err(ComposeValidationError::InvalidTime(time.to_string()));
            }
        }

        if self.files.len() > limits.max_files {
            return Err(ComposeValidationError::TooManyFiles {
                count: self.files.len(),
                max: limits.max_files,
            });
        }

        for file in &self.files {
            if file.name.trim().is_empty() {
                return Err(ComposeValidationError::EmptyFileName);
            }
            if file.size() > limits.max_file_bytes {
                return Err(ComposeValidationError::FileTooLarge {
                    name: file.name.clone(),
                    size: file.size(),
                    max: limits.max_file_bytes,
                });
            }
        }

        Ok(())
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Local compose validation failures. Never reach the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeValidationError {
    MissingDate,
    MissingTime,
    InvalidDate(String),
    InvalidTime(String),
    TooManyFiles { count: usize, max: usize },
    FileTooLarge { name: String, size: u64, max: u64 },
    EmptyFileName,
}

impl Display for ComposeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDate => write!(f, "please choose a date for this consultation"),
            Self::MissingTime => write!(f, "please choose a time for this consultation"),
            Self::InvalidDate(value) => write!(f, "date `{value}` must be YYYY-MM-DD"),
            Self::InvalidTime(value) => write!(f, "time `{value}` must be HH:MM"),
            Self::TooManyFiles { count, max } => {
                write!(f, "you can attach at most {max} files ({count} selected)")
            }
            Self::FileTooLarge { name, max, .. } => write!(
                f,
                "file `{name}` is larger than {} MB",
                max / (1024 * 1024)
            ),
            Self::EmptyFileName => write!(f, "attachment name must not be empty"),
        }
    }
}

impl Error for ComposeValidationError {}
