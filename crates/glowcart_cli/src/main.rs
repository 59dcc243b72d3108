//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `glowcart_core` linkage.
//! - Print the booking action table so UI controls can be checked by eye.
//! - Keep output deterministic for quick local sanity checks.

use glowcart_core::{available_actions, BookingRole, BookingState, BookingStatus, PaymentStatus};

const STATUSES: [BookingStatus; 5] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::InProgress,
    BookingStatus::Completed,
    BookingStatus::Cancelled,
];

const PAYMENTS: [PaymentStatus; 3] = [
    PaymentStatus::Unpaid,
    PaymentStatus::Paid,
    PaymentStatus::Refunded,
];

fn main() {
    println!("glowcart_core ping={}", glowcart_core::ping());
    println!("glowcart_core version={}", glowcart_core::core_version());

    for status in STATUSES {
        for payment in PAYMENTS {
            let state = BookingState::new(status, payment);
            if !state.is_consistent() {
                continue;
            }
            println!(
                "state={}/{} client=[{}] provider=[{}]",
                status.as_str(),
                payment.as_str(),
                action_list(BookingRole::Client, state),
                action_list(BookingRole::Provider, state),
            );
        }
    }
}

fn action_list(role: BookingRole, state: BookingState) -> String {
    available_actions(role, state)
        .iter()
        .map(|action| action.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
