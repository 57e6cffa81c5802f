//! Platform fee schedule
//!
//! A single flat rate applied to the total price of a trade and deducted
//! from the seller's proceeds.

use crate::numeric::NumericError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fraction of total price, e.g. 0.005 for 0.5%
    pub platform_fee_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(platform_fee_rate: Decimal) -> Self {
        Self { platform_fee_rate }
    }

    /// fee = total_price × rate, exact
    pub fn platform_fee(&self, total_price: Decimal) -> Result<Decimal, NumericError> {
        total_price
            .checked_mul(self.platform_fee_rate)
            .ok_or(NumericError::Overflow("platform fee"))
    }

    pub fn seller_proceeds(&self, total_price: Decimal) -> Result<Decimal, NumericError> {
        let fee = self.platform_fee(total_price)?;
        total_price
            .checked_sub(fee)
            .ok_or(NumericError::Overflow("seller proceeds"))
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        // 0.5%
        Self::new(Decimal::new(5, 3))
    }
}
