//! Flutter bridge surface over `glowcart_core`.

pub mod api;
