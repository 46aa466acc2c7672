use rust_decimal::Decimal;

use crate::allowance::AccountClass;

/// Ledger configuration governing every service-unit quantity.
///
/// Passed explicitly into validation and the admission decision rather than
/// read from process-wide state, so the engine is testable with varied
/// configurations in parallel.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Smallest permitted service-unit quantity.
    pub min: Decimal,
    /// Largest permitted service-unit quantity.
    pub max: Decimal,
    /// Maximum total significant digits in a quantity.
    pub max_digits: u32,
    /// Maximum decimal places in a quantity.
    pub max_decimal_places: u32,
    /// When set, admission control approves every job without checks.
    pub allow_all_jobs: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min: Decimal::new(0, 2),
            max: Decimal::new(100_000_000_00, 2),
            max_digits: 11,
            max_decimal_places: 2,
            allow_all_jobs: false,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default          |
    /// |----------------------|------------------|
    /// | `ALLOCATION_MIN`     | `0.00`           |
    /// | `ALLOCATION_MAX`     | `100000000.00`   |
    /// | `DECIMAL_MAX_DIGITS` | `11`             |
    /// | `DECIMAL_MAX_PLACES` | `2`              |
    /// | `ALLOW_ALL_JOBS`     | `false`          |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let min = std::env::var("ALLOCATION_MIN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min);
        let max = std::env::var("ALLOCATION_MAX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max);
        let max_digits = std::env::var("DECIMAL_MAX_DIGITS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_digits);
        let max_decimal_places = std::env::var("DECIMAL_MAX_PLACES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_decimal_places);
        let allow_all_jobs = std::env::var("ALLOW_ALL_JOBS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.allow_all_jobs);

        Self {
            min,
            max,
            max_digits,
            max_decimal_places,
            allow_all_jobs,
        }
    }
}

/// Base allowance granted per account class at period start, before
/// proration. Unmetered accounts have no base amount.
#[derive(Debug, Clone)]
pub struct AllowanceAmounts {
    pub faculty: Decimal,
    pub partner: Decimal,
    pub instructional: Decimal,
}

impl Default for AllowanceAmounts {
    fn default() -> Self {
        Self {
            faculty: Decimal::new(300_000_00, 2),
            partner: Decimal::new(200_000_00, 2),
            instructional: Decimal::new(200_000_00, 2),
        }
    }
}

impl AllowanceAmounts {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default     |
    /// |---------------------------|-------------|
    /// | `FCA_DEFAULT_ALLOWANCE`   | `300000.00` |
    /// | `PCA_DEFAULT_ALLOWANCE`   | `200000.00` |
    /// | `ICA_DEFAULT_ALLOWANCE`   | `200000.00` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: Decimal| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            faculty: read("FCA_DEFAULT_ALLOWANCE", defaults.faculty),
            partner: read("PCA_DEFAULT_ALLOWANCE", defaults.partner),
            instructional: read("ICA_DEFAULT_ALLOWANCE", defaults.instructional),
        }
    }

    /// The base allowance for the given class, or `None` for unmetered
    /// accounts.
    pub fn for_class(&self, class: AccountClass) -> Option<Decimal> {
        match class {
            AccountClass::FacultyComputingAllowance => Some(self.faculty),
            AccountClass::PartnerComputingAllowance => Some(self.partner),
            AccountClass::InstructionalComputingAllowance => Some(self.instructional),
            AccountClass::Unmetered => None,
        }
    }
}
