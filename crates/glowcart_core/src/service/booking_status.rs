//! Booking status display and booking actions.
//!
//! # Responsibility
//! - Mirror backend-reported booking snapshots for client and provider views,
//!   persisting the last accepted snapshot per booking in a `booking:` slot.
//! - Check provider/client actions against the transition table before any
//!   backend call.
//!
//! # Invariants
//! - The mirror only ever moves forward along the transition table; a
//!   snapshot that regresses or leaves a terminal state is never rendered.
//! - An action the table rejects never reaches the backend.
//! - After an action, the backend's reply is the displayed state.

use crate::api::{Session, StorefrontApi};
use crate::model::booking::{
    available_actions, BookingAction, BookingRecord, BookingRole, BookingState, BookingStatus,
    PaymentStatus, TransitionError,
};
use crate::repo::slot_repo::{load_json, save_json, SlotStore};
use crate::repo::{RepoError, RepoResult};
use crate::service::booking_flow::BookingFlowError;
use log::{info, warn};
use std::sync::Arc;

const BOOKING_SLOT_PREFIX: &str = "booking:";

/// Slot holding the last accepted snapshot of `booking_number`.
pub fn booking_slot(booking_number: &str) -> String {
    format!("{BOOKING_SLOT_PREFIX}{booking_number}")
}

/// How a snapshot affected the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    /// First snapshot seen.
    Initial,
    Advanced,
    Unchanged,
    /// Snapshot would regress or leave a terminal state; ignored.
    Stale(TransitionError),
}

/// Last known backend state of one booking.
#[derive(Debug, Clone, Default)]
pub struct BookingMirror {
    current: Option<BookingRecord>,
}

impl BookingMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the last accepted snapshot of `booking_number`.
    ///
    /// An undecodable slot starts an empty mirror.
    pub fn load(slots: &impl SlotStore, booking_number: &str) -> RepoResult<Self> {
        match load_json::<BookingRecord>(slots, &booking_slot(booking_number)) {
            Ok(current) => Ok(Self { current }),
            Err(RepoError::Serialization { .. }) => {
                warn!(
                    "event=booking_mirror module=booking status=reset reason=undecodable booking_number={booking_number}"
                );
                Ok(Self::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Persists the current snapshot under its booking number.
    pub fn save(&self, slots: &impl SlotStore) -> RepoResult<()> {
        match &self.current {
            Some(current) => save_json(slots, &booking_slot(&current.booking_number), current),
            None => Ok(()),
        }
    }

    pub fn current(&self) -> Option<&BookingRecord> {
        self.current.as_ref()
    }

    pub fn state(&self) -> Option<BookingState> {
        self.current.as_ref().map(BookingRecord::state)
    }

    /// Applies a snapshot polled or returned by the backend.
    ///
    /// Snapshots for a different booking replace the mirror outright.
    pub fn apply(&mut self, record: BookingRecord) -> MirrorUpdate {
        let Some(current) = &self.current else {
            self.current = Some(record);
            return MirrorUpdate::Initial;
        };
        if current.booking_number != record.booking_number {
            self.current = Some(record);
            return MirrorUpdate::Initial;
        }

        let before = current.state();
        let after = record.state();
        if before == after {
            self.current = Some(record);
            return MirrorUpdate::Unchanged;
        }
        if let Err(err) = before.check_observed(after) {
            warn!(
                "event=booking_mirror module=booking status=stale booking_number={} from={}/{} to={}/{}",
                record.booking_number,
                before.status,
                before.payment_status,
                after.status,
                after.payment_status
            );
            return MirrorUpdate::Stale(err);
        }
        self.current = Some(record);
        MirrorUpdate::Advanced
    }

    /// Actions a view for `role` may offer right now.
    pub fn actions(&self, role: BookingRole) -> Vec<BookingAction> {
        self.state()
            .map(|state| available_actions(role, state))
            .unwrap_or_default()
    }
}

/// Feeds a backend snapshot through the persisted mirror of its booking.
///
/// Returns the snapshot views should render: the reported one, or the last
/// accepted one when the report is stale. A failed save is logged; the next
/// observation retries it.
pub fn observe_booking(
    slots: &impl SlotStore,
    record: BookingRecord,
) -> RepoResult<(BookingRecord, MirrorUpdate)> {
    let mut mirror = BookingMirror::load(slots, &record.booking_number)?;
    let update = mirror.apply(record.clone());
    if !matches!(update, MirrorUpdate::Stale(_)) {
        if let Err(err) = mirror.save(slots) {
            warn!(
                "event=booking_mirror module=booking status=unsaved booking_number={} error={err}",
                record.booking_number
            );
        }
    }
    let shown = mirror.current.unwrap_or(record);
    Ok((shown, update))
}

/// Result of performing a booking action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Updated(BookingRecord),
    /// `Pay` yields the external payment link.
    PaymentRedirect { link: String },
}

/// Booking actions for client and provider views.
pub struct BookingActions {
    api: Arc<dyn StorefrontApi>,
}

impl BookingActions {
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        Self { api }
    }

    /// Fetches the current backend snapshot.
    pub fn fetch(
        &self,
        session: &Session,
        booking_number: &str,
    ) -> Result<BookingRecord, BookingFlowError> {
        self.api
            .get_booking(session, booking_number)
            .map_err(BookingFlowError::Backend)
    }

    /// Moves a booking to `target` after checking the transition table
    /// against the freshly fetched state.
    pub fn advance(
        &self,
        session: &Session,
        booking_number: &str,
        target: BookingStatus,
    ) -> Result<BookingRecord, BookingFlowError> {
        let current = self.fetch(session, booking_number)?;
        self.check(&current, target)?;
        let updated = self
            .api
            .update_booking_status(session, booking_number, target)
            .map_err(BookingFlowError::Backend)?;
        self.log_result("advance", &current, &updated);
        Ok(updated)
    }

    /// Cancels a booking; refunds are the backend's concern.
    pub fn cancel(
        &self,
        session: &Session,
        booking_number: &str,
    ) -> Result<BookingRecord, BookingFlowError> {
        let current = self.fetch(session, booking_number)?;
        self.check(&current, BookingStatus::Cancelled)?;
        let updated = self
            .api
            .cancel_booking(session, booking_number)
            .map_err(BookingFlowError::Backend)?;
        self.log_result("cancel", &current, &updated);
        Ok(updated)
    }

    /// Performs `action` for `role`, refusing actions the view must not offer.
    pub fn perform(
        &self,
        session: &Session,
        role: BookingRole,
        booking_number: &str,
        action: BookingAction,
    ) -> Result<ActionOutcome, BookingFlowError> {
        let current = self.fetch(session, booking_number)?;
        let state = current.state();
        if !available_actions(role, state).contains(&action) {
            info!(
                "event=booking_action module=booking status=rejected action={} booking_number={} booking_status={} payment_status={}",
                action.as_str(),
                booking_number,
                state.status,
                state.payment_status
            );
            let err = match action.target_status() {
                Some(target) => state
                    .check_status_change(target)
                    .err()
                    .unwrap_or(TransitionError::NotAllowed {
                        from: state.status,
                        to: target,
                    }),
                None => state
                    .check_payment_change(PaymentStatus::Paid)
                    .err()
                    .unwrap_or(TransitionError::Inconsistent(state)),
            };
            return Err(BookingFlowError::Transition(err));
        }

        let updated = match action.target_status() {
            None => {
                let link = self
                    .api
                    .request_payment_link(session, &current.id)
                    .map_err(BookingFlowError::Backend)?;
                return Ok(ActionOutcome::PaymentRedirect { link: link.link });
            }
            Some(BookingStatus::Cancelled) => self.api.cancel_booking(session, booking_number),
            Some(target) => self
                .api
                .update_booking_status(session, booking_number, target),
        }
        .map_err(BookingFlowError::Backend)?;
        self.log_result(action.as_str(), &current, &updated);
        Ok(ActionOutcome::Updated(updated))
    }

    fn check(&self, current: &BookingRecord, target: BookingStatus) -> Result<(), TransitionError> {
        current.state().check_status_change(target).map_err(|err| {
            info!(
                "event=booking_transition module=booking status=rejected booking_number={} from={} to={} reason={}",
                current.booking_number, current.status, target, err
            );
            err
        })
    }

    fn log_result(&self, action: &str, before: &BookingRecord, after: &BookingRecord) {
        if before.state().check_observed(after.state()).is_err() {
            warn!(
                "event=booking_transition module=booking status=unexpected action={action} booking_number={} reported={}/{}",
                after.booking_number, after.status, after.payment_status
            );
            return;
        }
        info!(
            "event=booking_transition module=booking status=ok action={action} booking_number={} booking_status={} payment_status={}",
            after.booking_number, after.status, after.payment_status
        );
    }
}
