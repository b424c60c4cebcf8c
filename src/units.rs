// src/units.rs
//! Token unit scaling and display formatting.
//!
//! Amounts cross the contract boundary as integers scaled by 10^decimals; the
//! user types and reads decimal strings.

use alloy_primitives::utils::{self, ParseUnits};
use alloy_primitives::U256;

use crate::error::ValidationError;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Parse a user-entered decimal amount into base units.
///
/// Accepts "12", "12.5", ".5". Rejects empty input, anything non-numeric
/// (including NaN / infinity spellings), zero and negative values, and more
/// fractional digits than the token supports.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAmount);
    }

    if let Some(rest) = trimmed.strip_prefix('-') {
        return if split_decimal(rest).is_some() {
            Err(ValidationError::NonPositive)
        } else {
            Err(ValidationError::NotNumeric(trimmed.to_string()))
        };
    }

    let (int_part, frac_part) = split_decimal(trimmed).ok_or_else(|| ValidationError::NotNumeric(trimmed.to_string()))?;
    // Trailing zeros beyond the supported precision carry no value
    if frac_part.len() > decimals as usize && frac_part[decimals as usize..].chars().any(|c| c != '0') {
        return Err(ValidationError::TooManyDecimals { max: decimals });
    }
    // Anything wider than 77 digits may not fit a U256 once scaled
    if int_part.trim_start_matches('0').len() + decimals as usize > 77 {
        return Err(ValidationError::AmountOverflow);
    }

    match utils::parse_units(trimmed, decimals) {
        Ok(ParseUnits::U256(value)) if !value.is_zero() => Ok(value),
        Ok(_) => Err(ValidationError::NonPositive),
        Err(e) => {
            log::debug!("Amount {:?} out of range: {}", trimmed, e);
            Err(ValidationError::AmountOverflow)
        }
    }
}

/// Split "123.45" into ("123", "45"). `None` unless the input is plain digits
/// with at most one decimal point and at least one digit.
fn split_decimal(s: &str) -> Option<(&str, &str)> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if all_digits(int_part) && all_digits(frac_part) {
        Some((int_part, frac_part))
    } else {
        None
    }
}

/// Format base units as a decimal string with trailing zeros trimmed
pub fn format_units(amount: U256, decimals: u8) -> String {
    match utils::format_units(amount, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted.trim_end_matches('0').trim_end_matches('.').to_string(),
        Ok(formatted) => formatted,
        Err(e) => {
            log::debug!("Cannot scale by {} decimals: {}", decimals, e);
            amount.to_string()
        }
    }
}

/// Format basis points as a percentage ("500" -> "5.00%")
pub fn format_bps(bps: U256) -> String {
    let value = bps.to_string().parse::<f64>().unwrap_or(0.0) / 100.0;
    format!("{:.2}%", value)
}

pub fn is_unlocked(unlock_timestamp: i64, now: i64) -> bool {
    unlock_timestamp <= now
}

/// Human countdown until an unlock timestamp
pub fn format_time_until_unlock(unlock_timestamp: i64, now: i64) -> String {
    let diff = unlock_timestamp - now;
    if diff <= 0 {
        return "Unlocked".to_string();
    }

    let days = diff / SECONDS_PER_DAY;
    let hours = (diff % SECONDS_PER_DAY) / 3600;
    let minutes = (diff % 3600) / 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
