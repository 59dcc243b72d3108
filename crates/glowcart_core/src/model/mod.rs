//! Storefront domain model.
//!
//! # Responsibility
//! - Define cart lines, booking drafts and booking status shapes.
//! - Hold pure rules (composite identity, transition table, fee math) so
//!   stores and controllers stay thin.
//!
//! # Invariants
//! - Cart rows are identified by composite ids only.
//! - Booking status is mirrored from the backend, never invented.
//!
//! # See also
//! - docs/architecture/data-model.md

pub mod booking;
pub mod cart;
pub mod draft;
pub mod pricing;
