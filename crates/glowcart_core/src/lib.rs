//! Core client logic for the GlowCart storefront.
//! This crate is the single source of truth for cart, draft and booking
//! invariants; UI shells reach it through `glowcart_ffi`.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use api::{ApiError, HttpStorefrontApi, Session, StorefrontApi};
pub use config::{ConfigError, StorefrontConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::booking::{
    available_actions, BookingAction, BookingRecord, BookingRole, BookingState, BookingStatus,
    PaymentStatus, TransitionError,
};
pub use model::cart::{composite_item_id, CartItem, ServerCartItem};
pub use model::draft::{ComposeEntry, ComposeForm, DraftFile, PendingBookingDraft, ServiceSummary};
pub use model::pricing::BookingQuote;
pub use repo::{RepoError, RepoResult};
pub use service::booking_flow::{BookingFlow, BookingFlowError, FlowRedirect, ReviewEntry};
pub use service::booking_status::{BookingActions, BookingMirror};
pub use service::cart_store::{CartStore, CartUpdate, CheckoutError};
pub use service::draft_store::DraftStore;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
