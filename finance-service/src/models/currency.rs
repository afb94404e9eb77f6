//! ISO 4217 currency codes and minor-unit precision.

use crate::error::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places of the currency's minor unit.
pub fn minor_units(currency: &str) -> u32 {
    match currency {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "UYI" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Normalize and validate a 3-letter currency code.
pub fn parse_currency(code: &str) -> Result<String, LedgerError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LedgerError::Validation(format!(
            "currency '{}' must be a 3-letter ISO 4217 code",
            code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Round half away from zero at the currency's minor unit.
pub fn round_minor(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(minor_units(currency), RoundingStrategy::MidpointAwayFromZero)
}

/// True when the amount carries no more precision than the minor unit allows.
pub fn fits_minor_units(amount: Decimal, currency: &str) -> bool {
    amount.normalize().scale() <= minor_units(currency)
}
