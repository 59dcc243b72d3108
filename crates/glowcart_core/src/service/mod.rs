//! Stores and controllers the UI shell drives.
//!
//! # Responsibility
//! - Own in-memory session state (cart) and orchestrate persistence and
//!   backend calls into screen-level operations.
//! - Keep the FFI layer decoupled from storage and transport details.
//!
//! # See also
//! - docs/architecture/booking-lifecycle.md

pub mod booking_flow;
pub mod booking_status;
pub mod cart_store;
pub mod cart_sync;
pub mod draft_store;
