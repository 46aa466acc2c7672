//! Service-unit quantity validation and job-cost parsing.
//!
//! Error messages embed the offending value and the configured limit
//! verbatim; admin tooling and tests match on the full strings.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::config::LedgerConfig;

/// Name of the attribute type carrying service-unit allowances.
pub const SERVICE_UNITS_ATTRIBUTE: &str = "Service Units";

/// Name of the attribute type tracking per-user cluster access.
pub const CLUSTER_ACCOUNT_STATUS_ATTRIBUTE: &str = "Cluster Account Status";

/// Error raised when a service-unit quantity fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuBoundsError {
    #[error("Number of service units {value} is not in the acceptable bounds: [{min}, {max}].")]
    OutOfBounds {
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Number of service units {value} has greater than {max_digits} digits.")]
    TooManyDigits { value: Decimal, max_digits: u32 },

    #[error("Number of service units {value} has greater than {max_places} decimal places.")]
    TooManyPlaces { value: Decimal, max_places: u32 },
}

/// Error raised when a raw job-cost string cannot be parsed into a valid
/// nonnegative decimal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobCostError {
    #[error("Encountered exception {source} when converting job_cost {raw} to a decimal.")]
    NotADecimal {
        raw: String,
        source: rust_decimal::Error,
    },

    #[error("job_cost {value} is not nonnegative.")]
    Negative { value: Decimal },

    #[error("job_cost {value} has greater than {max_digits} digits.")]
    TooManyDigits { value: Decimal, max_digits: u32 },

    #[error("job_cost {value} has greater than {max_places} decimal places.")]
    TooManyPlaces { value: Decimal, max_places: u32 },
}

/// Number of significant digits in the decimal's coefficient.
fn digit_count(value: &Decimal) -> u32 {
    value.mantissa().unsigned_abs().to_string().len() as u32
}

/// Validate a proposed service-unit quantity against the configured bounds
/// and precision limits.
pub fn validate_su_quantity(value: Decimal, config: &LedgerConfig) -> Result<(), SuBoundsError> {
    if value < config.min || value > config.max {
        return Err(SuBoundsError::OutOfBounds {
            value,
            min: config.min,
            max: config.max,
        });
    }
    if digit_count(&value) > config.max_digits {
        return Err(SuBoundsError::TooManyDigits {
            value,
            max_digits: config.max_digits,
        });
    }
    if value.scale() > config.max_decimal_places {
        return Err(SuBoundsError::TooManyPlaces {
            value,
            max_places: config.max_decimal_places,
        });
    }
    Ok(())
}

/// Parse a raw job-cost string into a decimal, rejecting garbage, negative
/// values, and quantities exceeding the configured precision.
pub fn parse_job_cost(raw: &str, config: &LedgerConfig) -> Result<Decimal, JobCostError> {
    let value = Decimal::from_str(raw).map_err(|source| JobCostError::NotADecimal {
        raw: raw.to_string(),
        source,
    })?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(JobCostError::Negative { value });
    }
    if digit_count(&value) > config.max_digits {
        return Err(JobCostError::TooManyDigits {
            value,
            max_digits: config.max_digits,
        });
    }
    if value.scale() > config.max_decimal_places {
        return Err(JobCostError::TooManyPlaces {
            value,
            max_places: config.max_decimal_places,
        });
    }
    Ok(value)
}

/// Serialize an allowance for the string-typed attribute store.
pub fn serialize_allowance(value: Decimal) -> String {
    value.to_string()
}

/// Parse a string-encoded allowance read back from the attribute store.
///
/// A malformed stored value is a data-integrity problem, so the error
/// message names the value for the invariant-violation report.
pub fn parse_stored_allowance(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw)
        .map_err(|e| format!("Stored allowance value {raw:?} is not a decimal: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LedgerConfig {
        LedgerConfig::default()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_quantity_within_bounds_accepted() {
        for v in ["0.00", "0.01", "1", "300000.00", "100000000.00"] {
            assert!(validate_su_quantity(dec(v), &config()).is_ok(), "{v}");
        }
    }

    #[test]
    fn test_quantity_below_minimum_rejected() {
        let err = validate_su_quantity(dec("-0.01"), &config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Number of service units -0.01 is not in the acceptable bounds: \
             [0.00, 100000000.00]."
        );
    }

    #[test]
    fn test_quantity_above_maximum_rejected() {
        let err = validate_su_quantity(dec("100000000.01"), &config()).unwrap_err();
        assert!(err.to_string().contains("100000000.01"));
        assert!(err.to_string().contains("[0.00, 100000000.00]"));
    }

    #[test]
    fn test_quantity_with_too_many_places_rejected() {
        let err = validate_su_quantity(dec("1.001"), &config()).unwrap_err();
        assert_eq!(
            err,
            SuBoundsError::TooManyPlaces {
                value: dec("1.001"),
                max_places: 2
            }
        );
    }

    #[test]
    fn test_parse_job_cost_valid() {
        assert_eq!(parse_job_cost("100.00", &config()).unwrap(), dec("100.00"));
        assert_eq!(parse_job_cost("0", &config()).unwrap(), dec("0"));
        assert_eq!(parse_job_cost("0.01", &config()).unwrap(), dec("0.01"));
    }

    #[test]
    fn test_parse_job_cost_garbage_rejected() {
        let err = parse_job_cost("abc", &config()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Encountered exception"));
        assert!(message.contains("job_cost abc"));
    }

    #[test]
    fn test_parse_job_cost_negative_rejected() {
        let err = parse_job_cost("-1.00", &config()).unwrap_err();
        assert_eq!(err.to_string(), "job_cost -1.00 is not nonnegative.");
    }

    #[test]
    fn test_parse_job_cost_too_many_digits_rejected() {
        // Twelve digits against a limit of eleven.
        let err = parse_job_cost("123456789012", &config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "job_cost 123456789012 has greater than 11 digits."
        );
    }

    #[test]
    fn test_parse_job_cost_too_many_places_rejected() {
        let err = parse_job_cost("1.234", &config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "job_cost 1.234 has greater than 2 decimal places."
        );
    }

    #[test]
    fn test_allowance_round_trip_preserves_scale() {
        let value = dec("300000.00");
        assert_eq!(serialize_allowance(value), "300000.00");
        assert_eq!(parse_stored_allowance("300000.00").unwrap(), value);
    }

    #[test]
    fn test_parse_stored_allowance_garbage_is_error() {
        let err = parse_stored_allowance("Active").unwrap_err();
        assert!(err.contains("\"Active\""));
    }
}
