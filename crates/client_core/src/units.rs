//! Conversion between base units and a human-readable display denomination.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,
    #[error("amount '{0}' is not a decimal number")]
    NotDecimal(String),
    #[error("amount '{amount}' has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },
    #[error("amount '{0}' does not fit in 256 bits")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denomination {
    pub symbol: &'static str,
    pub decimals: u8,
}

pub const ETHER: Denomination = Denomination {
    symbol: "ETH",
    decimals: 18,
};

impl Denomination {
    pub fn unit_factor(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals))
    }

    /// Formats like ethers' `formatEther`: trailing fractional zeros are
    /// trimmed but at least one fractional digit is kept (`1.0`, `0.01`).
    pub fn format(&self, amount: U256) -> String {
        let factor = self.unit_factor();
        let whole = amount / factor;
        if self.decimals == 0 {
            return whole.to_string();
        }

        let fraction = (amount % factor).to_string();
        let padded = format!("{fraction:0>width$}", width = usize::from(self.decimals));
        let trimmed = padded.trim_end_matches('0');
        let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
        format!("{whole}.{trimmed}")
    }

    pub fn format_with_symbol(&self, amount: U256) -> String {
        format!("{} {}", self.format(amount), self.symbol)
    }

    pub fn parse(&self, amount: &str) -> Result<U256, UnitsError> {
        let amount = amount.trim();
        if amount.is_empty() {
            return Err(UnitsError::Empty);
        }

        let (whole, fraction) = match amount.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (amount, ""),
        };
        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
            return Err(UnitsError::NotDecimal(amount.to_string()));
        }
        if fraction.len() > usize::from(self.decimals) {
            return Err(UnitsError::TooPrecise {
                amount: amount.to_string(),
                decimals: self.decimals,
            });
        }

        let overflow = || UnitsError::Overflow(amount.to_string());
        let whole = if whole.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(whole, 10).map_err(|_| overflow())?
        };
        let fraction = format!(
            "{fraction:0<width$}",
            width = usize::from(self.decimals)
        );
        let fraction = if fraction.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(&fraction, 10).map_err(|_| overflow())?
        };

        whole
            .checked_mul(self.unit_factor())
            .and_then(|scaled| scaled.checked_add(fraction))
            .ok_or_else(overflow)
    }
}
