//! Booking status model and the single transition table.
//!
//! # Responsibility
//! - Define booking lifecycle and payment sub-state enums.
//! - Own the one transition table consumed by client and provider views.
//! - Derive the actions a view may offer for a reported state.
//!
//! # Invariants
//! - `CANCELLED` and `COMPLETED` are terminal.
//! - A booking cannot leave `PENDING` forward unless payment is `PAID`.
//! - `REFUNDED` is reachable only from `PAID` on a cancelled booking.
//! - Status never regresses.
//!
//! # See also
//! - docs/architecture/booking-lifecycle.md

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Backend-reported booking lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// Payment axis, independent of lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, Pending};

/// Single-step status edges. Everything else is rejected.
const STATUS_TRANSITIONS: &[(BookingStatus, BookingStatus)] = &[
    (Pending, Confirmed),
    (Confirmed, InProgress),
    (InProgress, Completed),
    (Pending, Cancelled),
    (Confirmed, Cancelled),
];

const PAYMENT_TRANSITIONS: &[(PaymentStatus, PaymentStatus)] = &[
    (PaymentStatus::Unpaid, PaymentStatus::Paid),
    (PaymentStatus::Paid, PaymentStatus::Refunded),
];

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Pending => "PENDING",
            Confirmed => "CONFIRMED",
            InProgress => "IN_PROGRESS",
            Completed => "COMPLETED",
            Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Pending),
            "CONFIRMED" => Some(Confirmed),
            "IN_PROGRESS" => Some(InProgress),
            "COMPLETED" => Some(Completed),
            "CANCELLED" => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Completed | Cancelled)
    }

    /// Whether `to` is reachable from `self` through zero or more table edges.
    ///
    /// Polling may skip intermediate states, so observed jumps such as
    /// `PENDING -> COMPLETED` are reachable while `CONFIRMED -> PENDING` is not.
    pub fn can_reach(self, to: BookingStatus) -> bool {
        if self == to {
            return true;
        }
        STATUS_TRANSITIONS
            .iter()
            .filter(|(from, _)| *from == self)
            .any(|(_, next)| next.can_reach(to))
    }

    fn progress_rank(self) -> u8 {
        match self {
            Pending => 0,
            Confirmed => 1,
            InProgress => 2,
            Completed | Cancelled => 3,
        }
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Refunded => "REFUNDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Some(Self::Unpaid),
            "PAID" => Some(Self::Paid),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn can_reach(self, to: PaymentStatus) -> bool {
        if self == to {
            return true;
        }
        PAYMENT_TRANSITIONS
            .iter()
            .filter(|(from, _)| *from == self)
            .any(|(_, next)| next.can_reach(to))
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Source status is `CANCELLED` or `COMPLETED`.
    Terminal(BookingStatus),
    /// Target is behind the source in lifecycle order.
    Regression {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Advancing past `PENDING` while payment is outstanding.
    PaymentRequired(PaymentStatus),
    /// Edge missing from the table (e.g. `IN_PROGRESS -> CANCELLED`).
    NotAllowed {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Payment axis edge missing from the table.
    PaymentNotAllowed {
        from: PaymentStatus,
        to: PaymentStatus,
        status: BookingStatus,
    },
    /// Reported pair can never exist (e.g. `CONFIRMED` + `UNPAID`).
    Inconsistent(BookingState),
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal(status) => write!(f, "booking is {status}; no further transitions"),
            Self::Regression { from, to } => {
                write!(f, "booking status cannot regress from {from} to {to}")
            }
            Self::PaymentRequired(payment) => write!(
                f,
                "booking cannot advance past PENDING while payment is {payment}"
            ),
            Self::NotAllowed { from, to } => {
                write!(f, "booking transition {from} -> {to} is not allowed")
            }
            Self::PaymentNotAllowed { from, to, status } => write!(
                f,
                "payment transition {from} -> {to} is not allowed for a {status} booking"
            ),
            Self::Inconsistent(state) => write!(
                f,
                "booking state {} / {} is inconsistent",
                state.status, state.payment_status
            ),
        }
    }
}

impl Error for TransitionError {}

/// The `(status, paymentStatus)` pair every view renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingState {
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

impl BookingState {
    pub fn new(status: BookingStatus, payment_status: PaymentStatus) -> Self {
        Self {
            status,
            payment_status,
        }
    }

    /// State of a freshly created booking.
    pub fn initial() -> Self {
        Self::new(Pending, PaymentStatus::Unpaid)
    }

    /// Whether the pair can exist at all under payment gating.
    pub fn is_consistent(self) -> bool {
        match (self.status, self.payment_status) {
            (Pending, PaymentStatus::Refunded) => false,
            (Pending, _) => true,
            (Cancelled, _) => true,
            (_, PaymentStatus::Paid) => true,
            _ => false,
        }
    }

    /// Checks a single requested status change (provider/admin action).
    pub fn check_status_change(self, to: BookingStatus) -> Result<(), TransitionError> {
        let from = self.status;
        if from.is_terminal() {
            return Err(TransitionError::Terminal(from));
        }
        if !STATUS_TRANSITIONS.contains(&(from, to)) {
            if to.progress_rank() <= from.progress_rank() {
                return Err(TransitionError::Regression { from, to });
            }
            return Err(TransitionError::NotAllowed { from, to });
        }
        if from == Pending && to != Cancelled && self.payment_status != PaymentStatus::Paid {
            return Err(TransitionError::PaymentRequired(self.payment_status));
        }
        Ok(())
    }

    /// Checks a single payment change against the current status.
    pub fn check_payment_change(self, to: PaymentStatus) -> Result<(), TransitionError> {
        let from = self.payment_status;
        let allowed = PAYMENT_TRANSITIONS.contains(&(from, to))
            && match to {
                PaymentStatus::Paid => !self.status.is_terminal(),
                PaymentStatus::Refunded => self.status == Cancelled,
                PaymentStatus::Unpaid => false,
            };
        if allowed {
            Ok(())
        } else {
            Err(TransitionError::PaymentNotAllowed {
                from,
                to,
                status: self.status,
            })
        }
    }

    /// Checks that `next` is a legal later observation of `self`.
    ///
    /// Used when mirroring backend snapshots: intermediate states may be
    /// skipped, but nothing may regress or leave a terminal state.
    pub fn check_observed(self, next: BookingState) -> Result<(), TransitionError> {
        if !next.is_consistent() {
            return Err(TransitionError::Inconsistent(next));
        }
        if self.status.is_terminal() && next.status != self.status {
            return Err(TransitionError::Terminal(self.status));
        }
        if !self.status.can_reach(next.status) {
            if next.status.progress_rank() <= self.status.progress_rank() {
                return Err(TransitionError::Regression {
                    from: self.status,
                    to: next.status,
                });
            }
            return Err(TransitionError::NotAllowed {
                from: self.status,
                to: next.status,
            });
        }
        if !self.payment_status.can_reach(next.payment_status) {
            return Err(TransitionError::PaymentNotAllowed {
                from: self.payment_status,
                to: next.payment_status,
                status: next.status,
            });
        }
        Ok(())
    }
}

/// Which side of the marketplace a view renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingRole {
    Client,
    Provider,
}

/// Actions a view may offer for a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingAction {
    /// Client: open the payment link for an unpaid booking.
    Pay,
    /// Provider: `PENDING -> CONFIRMED`.
    Accept,
    /// Provider: `CONFIRMED -> IN_PROGRESS`.
    Start,
    /// Provider: `IN_PROGRESS -> COMPLETED`.
    Complete,
    /// Either side: move to `CANCELLED`.
    Cancel,
}

impl BookingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pay => "pay",
            Self::Accept => "accept",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }

    /// Status the action requests, `None` for payment.
    pub fn target_status(self) -> Option<BookingStatus> {
        match self {
            Self::Pay => None,
            Self::Accept => Some(Confirmed),
            Self::Start => Some(InProgress),
            Self::Complete => Some(Completed),
            Self::Cancel => Some(Cancelled),
        }
    }
}

/// Returns the actions a view for `role` may offer in `state`.
///
/// Every status action is filtered through `check_status_change`, so no view
/// can offer a control the table would reject.
pub fn available_actions(role: BookingRole, state: BookingState) -> Vec<BookingAction> {
    let candidates: &[BookingAction] = match role {
        BookingRole::Client => &[BookingAction::Pay, BookingAction::Cancel],
        BookingRole::Provider => &[
            BookingAction::Accept,
            BookingAction::Start,
            BookingAction::Complete,
            BookingAction::Cancel,
        ],
    };

    candidates
        .iter()
        .copied()
        .filter(|action| match action.target_status() {
            Some(target) => state.check_status_change(target).is_ok(),
            None => state.check_payment_change(PaymentStatus::Paid).is_ok(),
        })
        .collect()
}

/// Booking as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: String,
    pub booking_number: String,
    #[serde(default)]
    pub service_id: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    /// Amount stored server-side at creation; later price edits do not
    /// touch it.
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl BookingRecord {
    pub fn state(&self) -> BookingState {
        BookingState::new(self.status, self.payment_status)
    }
}
