//! Booking lifecycle controller: compose -> review -> pay -> refresh.
//!
//! # Responsibility
//! - Validate compose input and persist it as the pending draft.
//! - Gate review on a session and a matching draft.
//! - Create the booking at most once per draft, then request a payment link.
//! - Clear the draft once the backend reports the booking paid or advanced.
//!
//! # Invariants
//! - Validation failures never reach the network or the draft slot.
//! - A draft that recorded a created booking never creates a second one.
//! - The draft survives every failure path of `confirm_and_pay`.
//!
//! # See also
//! - docs/architecture/booking-lifecycle.md

use crate::api::{ApiError, CreateBookingRequest, Session, StorefrontApi};
use crate::config::StorefrontConfig;
use crate::model::booking::{
    BookingRecord, BookingState, BookingStatus, PaymentStatus, TransitionError,
};
use crate::model::draft::{
    ComposeEntry, ComposeForm, ComposeValidationError, CreatedBookingRef, PendingBookingDraft,
    ServiceSummary,
};
use crate::model::pricing::BookingQuote;
use crate::repo::file_repo::FileStore;
use crate::repo::slot_repo::SlotStore;
use crate::repo::RepoError;
use crate::service::booking_status::{observe_booking, MirrorUpdate};
use crate::service::draft_store::DraftStore;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Where the shell should navigate next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowRedirect {
    /// Login with a return path back to the screen that asked.
    Login { path: String },
    Compose { path: String },
    Review { path: String },
    /// External payment page for a created booking.
    Payment {
        link: String,
        booking_number: String,
    },
}

/// Data the review screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub draft: PendingBookingDraft,
    pub quote: BookingQuote,
}

/// Outcome of entering the review screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEntry {
    Ready(ReviewSummary),
    Redirect(FlowRedirect),
}

/// Booking flow and booking action failures.
#[derive(Debug)]
pub enum BookingFlowError {
    /// Local compose validation; nothing was persisted or sent.
    Validation(ComposeValidationError),
    /// Draft slot or file store failure.
    Storage(RepoError),
    /// Booking creation failed; the draft is intact and retry is safe.
    Creation(ApiError),
    /// The booking exists but its reference could not be stored in the
    /// draft; a retry would not know about it.
    BookingUnsaved {
        booking: CreatedBookingRef,
        source: RepoError,
    },
    /// The booking exists but no payment link was obtained.
    PaymentLink {
        booking: CreatedBookingRef,
        source: ApiError,
    },
    /// Any other backend call (refresh, status change, cancel).
    Backend(ApiError),
    /// Requested status change is rejected by the transition table.
    Transition(TransitionError),
}

impl Display for BookingFlowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "booking draft could not be saved: {err}"),
            Self::Creation(err) => write!(f, "booking could not be created: {}", err.message),
            Self::BookingUnsaved { booking, source } => write!(
                f,
                "booking {} was created but could not be recorded on this device: {source}",
                booking.booking_number
            ),
            Self::PaymentLink { booking, source } => write!(
                f,
                "booking {} was created but payment could not be started: {}",
                booking.booking_number, source.message
            ),
            Self::Backend(err) => write!(f, "{err}"),
            Self::Transition(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BookingFlowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) | Self::BookingUnsaved { source: err, .. } => Some(err),
            Self::Creation(err) | Self::Backend(err) => Some(err),
            Self::PaymentLink { source, .. } => Some(source),
            Self::Transition(err) => Some(err),
        }
    }
}

impl From<ComposeValidationError> for BookingFlowError {
    fn from(value: ComposeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for BookingFlowError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<TransitionError> for BookingFlowError {
    fn from(value: TransitionError) -> Self {
        Self::Transition(value)
    }
}

/// Controller driving the compose, review and payment screens.
pub struct BookingFlow<S: SlotStore, F: FileStore> {
    drafts: DraftStore<S, F>,
    api: Arc<dyn StorefrontApi>,
    config: StorefrontConfig,
}

impl<S: SlotStore, F: FileStore> BookingFlow<S, F> {
    pub fn new(
        drafts: DraftStore<S, F>,
        api: Arc<dyn StorefrontApi>,
        config: StorefrontConfig,
    ) -> Self {
        Self {
            drafts,
            api,
            config,
        }
    }

    pub fn drafts(&self) -> &DraftStore<S, F> {
        &self.drafts
    }

    /// Prepares the compose form for `service`.
    ///
    /// A fresh visit clears any stored draft and files; only an explicit
    /// return from review restores them.
    pub fn enter_compose(
        &self,
        service: &ServiceSummary,
        entry: ComposeEntry,
    ) -> Result<ComposeForm, BookingFlowError> {
        match entry {
            ComposeEntry::Fresh => {
                self.drafts.discard_current()?;
                self.drafts.purge_orphan_files()?;
                Ok(ComposeForm::default())
            }
            ComposeEntry::ReturnFromReview => {
                let form = self
                    .drafts
                    .load_for_service(&service.id)?
                    .map(|stored| ComposeForm::from_draft(&stored.draft, stored.files))
                    .unwrap_or_default();
                info!(
                    "event=compose_restore module=booking status=ok service_id={} files={}",
                    service.id,
                    form.files.len()
                );
                Ok(form)
            }
        }
    }

    /// Validates and persists the compose form, then points at review.
    ///
    /// Identical content keeps the draft's idempotency token and any created
    /// booking; changed content starts a new draft.
    pub fn submit_compose(
        &self,
        service: &ServiceSummary,
        form: ComposeForm,
    ) -> Result<FlowRedirect, BookingFlowError> {
        let form = form.normalized();
        if let Err(err) = form.validate(service.kind, self.config.compose_limits()) {
            info!(
                "event=compose_submit module=booking status=rejected service_id={} reason={}",
                service.id,
                validation_code(&err)
            );
            return Err(err.into());
        }

        let mut draft = PendingBookingDraft::from_form(service, &form);
        if let Ok(Some(previous)) = self.drafts.load_draft() {
            if previous.same_request(&draft) {
                draft.client_token = previous.client_token;
                draft.created_booking = previous.created_booking;
            }
        }

        self.drafts.store(&draft, &form.files)?;
        info!(
            "event=compose_submit module=booking status=ok service_id={} files={} has_booking={}",
            service.id,
            form.files.len(),
            draft.created_booking.is_some()
        );
        Ok(FlowRedirect::Review {
            path: self.config.review_path(&service.id),
        })
    }

    /// Loads what the review screen needs, or where to go instead.
    pub fn enter_review(
        &self,
        session: Option<&Session>,
        service_id: &str,
    ) -> Result<ReviewEntry, BookingFlowError> {
        if session.is_none() {
            return Ok(ReviewEntry::Redirect(self.login_redirect(service_id)));
        }
        let Some(stored) = self.drafts.load_for_service(service_id)? else {
            return Ok(ReviewEntry::Redirect(FlowRedirect::Compose {
                path: self.config.compose_path(service_id),
            }));
        };
        let quote = BookingQuote::for_price(stored.draft.price, self.config.service_fee_percent);
        Ok(ReviewEntry::Ready(ReviewSummary {
            draft: stored.draft,
            quote,
        }))
    }

    /// Path the review screen's "back" action should use.
    pub fn back_to_compose(&self, service_id: &str) -> FlowRedirect {
        FlowRedirect::Compose {
            path: self.config.compose_return_path(service_id),
        }
    }

    /// Creates the booking (once) and requests its payment link.
    ///
    /// The draft is left in place; it is cleared by `refresh_booking` once
    /// the backend reports payment.
    ///
    /// # Errors
    /// - `Creation` when the booking could not be created.
    /// - `BookingUnsaved` when the booking exists but the draft could not
    ///   record it; no payment link is requested.
    /// - `PaymentLink` when the booking exists but the link request failed;
    ///   calling again only re-requests the link.
    pub fn confirm_and_pay(
        &self,
        session: Option<&Session>,
        service_id: &str,
    ) -> Result<FlowRedirect, BookingFlowError> {
        let Some(session) = session else {
            return Ok(self.login_redirect(service_id));
        };
        let Some(stored) = self.drafts.load_for_service(service_id)? else {
            return Ok(FlowRedirect::Compose {
                path: self.config.compose_path(service_id),
            });
        };
        let mut draft = stored.draft;

        let booking = match draft.created_booking.clone() {
            Some(existing) => {
                info!(
                    "event=booking_create module=booking status=skipped reason=already_created booking_number={}",
                    existing.booking_number
                );
                existing
            }
            None => {
                let request = CreateBookingRequest {
                    service_id: draft.service_id.clone(),
                    date: draft.date.clone(),
                    time: draft.time.clone(),
                    requirements: draft.requirements.clone(),
                    files: stored.files,
                    idempotency_key: draft.client_token.to_string(),
                };
                let record = self.api.create_booking(session, &request).map_err(|err| {
                    warn!(
                        "event=booking_create module=booking status=error service_id={} error_code={} retryable={}",
                        service_id, err.code, err.retryable
                    );
                    BookingFlowError::Creation(err)
                })?;
                if record.state() != BookingState::initial() {
                    warn!(
                        "event=booking_create module=booking status=unexpected_state booking_number={} status={} payment_status={}",
                        record.booking_number, record.status, record.payment_status
                    );
                }

                let created = CreatedBookingRef {
                    id: record.id.clone(),
                    booking_number: record.booking_number.clone(),
                };
                draft.created_booking = Some(created.clone());
                if let Err(source) = self.drafts.save_draft(&draft) {
                    error!(
                        "event=booking_create module=booking status=unsaved booking_number={} error={source}",
                        created.booking_number
                    );
                    return Err(BookingFlowError::BookingUnsaved {
                        booking: created,
                        source,
                    });
                }
                if let Err(err) = observe_booking(self.drafts.slots(), record) {
                    warn!(
                        "event=booking_mirror module=booking status=error booking_number={} error={err}",
                        created.booking_number
                    );
                }
                info!(
                    "event=booking_create module=booking status=ok booking_number={}",
                    created.booking_number
                );
                created
            }
        };

        match self.api.request_payment_link(session, &booking.id) {
            Ok(link) => {
                info!(
                    "event=payment_link module=booking status=ok booking_number={}",
                    booking.booking_number
                );
                Ok(FlowRedirect::Payment {
                    link: link.link,
                    booking_number: booking.booking_number,
                })
            }
            Err(source) => {
                warn!(
                    "event=payment_link module=booking status=error booking_number={} error_code={}",
                    booking.booking_number, source.code
                );
                Err(BookingFlowError::PaymentLink { booking, source })
            }
        }
    }

    /// Re-reads a booking from the backend after the payment redirect.
    ///
    /// The report goes through the booking's persisted mirror first; a report
    /// that regresses or leaves a terminal state is ignored and the last
    /// accepted snapshot is returned instead.
    ///
    /// Clears the draft and its files when they belong to this booking and
    /// the accepted snapshot is paid or past `PENDING`.
    pub fn refresh_booking(
        &self,
        session: &Session,
        booking_number: &str,
    ) -> Result<BookingRecord, BookingFlowError> {
        let reported = self
            .api
            .get_booking(session, booking_number)
            .map_err(BookingFlowError::Backend)?;
        let (record, update) = observe_booking(self.drafts.slots(), reported)?;
        if let MirrorUpdate::Stale(reason) = update {
            info!(
                "event=booking_refresh module=booking status=stale_ignored booking_number={} reason={reason}",
                record.booking_number
            );
        }

        let settled =
            record.payment_status == PaymentStatus::Paid || record.status != BookingStatus::Pending;
        if settled {
            if let Ok(Some(draft)) = self.drafts.load_draft() {
                let owns = draft
                    .created_booking
                    .as_ref()
                    .is_some_and(|created| created.booking_number == record.booking_number);
                if owns {
                    self.drafts.discard(&draft.service_id)?;
                    info!(
                        "event=booking_refresh module=booking status=draft_cleared booking_number={}",
                        record.booking_number
                    );
                }
            }
        }

        info!(
            "event=booking_refresh module=booking status=ok booking_number={} booking_status={} payment_status={}",
            record.booking_number, record.status, record.payment_status
        );
        Ok(record)
    }

    /// Drops the current draft and its files.
    pub fn abandon(&self) -> Result<(), BookingFlowError> {
        self.drafts.discard_current()?;
        Ok(())
    }

    fn login_redirect(&self, service_id: &str) -> FlowRedirect {
        FlowRedirect::Login {
            path: self
                .config
                .login_redirect(&self.config.review_path(service_id)),
        }
    }
}

fn validation_code(err: &ComposeValidationError) -> &'static str {
    match err {
        ComposeValidationError::MissingDate => "missing_date",
        ComposeValidationError::MissingTime => "missing_time",
        ComposeValidationError::InvalidDate(_) => "invalid_date",
        ComposeValidationError::InvalidTime(_) => "invalid_time",
        ComposeValidationError::TooManyFiles { .. } => "too_many_files",
        ComposeValidationError::FileTooLarge { .. } => "file_too_large",
        ComposeValidationError::EmptyFileName => "empty_file_name",
    }
}
