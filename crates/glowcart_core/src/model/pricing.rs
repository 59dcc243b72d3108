//! Review-step price breakdown.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Default service fee, in percent of the service price.
pub const DEFAULT_SERVICE_FEE_PERCENT: u32 = 5;

const MONEY_DECIMAL_PLACES: u32 = 2;

/// Price, fee and total shown on the review screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuote {
    pub price: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

impl BookingQuote {
    /// Computes `total = price + fee_percent% of price`.
    ///
    /// The fee is rounded to cents, half away from zero, before it is added,
    /// so `total - price` always equals the displayed fee.
    pub fn for_price(price: Decimal, fee_percent: u32) -> Self {
        let service_fee = (price * Decimal::from(fee_percent) / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
        Self {
            price,
            service_fee,
            total: price + service_fee,
        }
    }
}
