//! Computing-allowance classification.
//!
//! Accounts are classified once, from the project's naming prefix, into a
//! typed [`AccountClass`] that is threaded through admission control and the
//! period lifecycle instead of re-sniffing string prefixes at every call
//! site.

/// Prefix of allowance-year period names. Periods not matching it are
/// treated as instructional terms, including Summer Sessions periods whose
/// names follow a different convention (known limitation, replicated from
/// the production deployment).
pub const ALLOWANCE_YEAR_PERIOD_PREFIX: &str = "Allowance Year";

/// The compute resource metered by the service-unit ledger.
pub const COMPUTE_RESOURCE: &str = "Savio Compute";

/// The class of computing allowance backing a project, derived from the
/// project's naming prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountClass {
    /// `fc_` projects: yearly, prorated, renewable.
    FacultyComputingAllowance,
    /// `pc_` projects: yearly, prorated.
    PartnerComputingAllowance,
    /// `ic_` projects: granted whole for a fixed instructional term.
    InstructionalComputingAllowance,
    /// `co_` projects (Condo/MOU): no metered allowance at all.
    Unmetered,
}

impl AccountClass {
    /// The project-name prefix identifying the class.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::FacultyComputingAllowance => "fc_",
            Self::PartnerComputingAllowance => "pc_",
            Self::InstructionalComputingAllowance => "ic_",
            Self::Unmetered => "co_",
        }
    }

    /// Human-readable allowance name, used in operator-facing reports.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::FacultyComputingAllowance => "Faculty Computing Allowance",
            Self::PartnerComputingAllowance => "Partner Computing Allowance",
            Self::InstructionalComputingAllowance => "Instructional Computing Allowance",
            Self::Unmetered => "Condo Allocation",
        }
    }

    /// Classify a project name by its prefix. Projects outside the known
    /// naming conventions have no class and are treated as plain metered
    /// accounts.
    pub fn from_project_name(name: &str) -> Option<Self> {
        [
            Self::FacultyComputingAllowance,
            Self::PartnerComputingAllowance,
            Self::InstructionalComputingAllowance,
            Self::Unmetered,
        ]
        .into_iter()
        .find(|class| name.starts_with(class.prefix()))
    }

    /// Whether the allowance is limited to a specific allocation period and
    /// therefore participates in period-boundary deactivation/renewal.
    pub const fn is_periodic(self) -> bool {
        !matches!(self, Self::Unmetered)
    }

    /// Whether granted service units are prorated by the remaining fraction
    /// of the period. Instructional allowances are granted whole.
    pub const fn is_prorated(self) -> bool {
        matches!(
            self,
            Self::FacultyComputingAllowance | Self::PartnerComputingAllowance
        )
    }

    /// Whether the account is exempt from metered budget enforcement.
    pub const fn has_unlimited_service_units(self) -> bool {
        matches!(self, Self::Unmetered)
    }
}

/// Category of an allocation period, derived from the period name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodCategory {
    /// An allowance year, covering the yearly allowance classes.
    AllowanceYear,
    /// An instructional term (semester, session).
    Instructional,
}

impl PeriodCategory {
    pub fn from_period_name(name: &str) -> Self {
        if name.starts_with(ALLOWANCE_YEAR_PERIOD_PREFIX) {
            Self::AllowanceYear
        } else {
            Self::Instructional
        }
    }

    /// The account classes whose projects transition at this period's
    /// boundary.
    pub const fn account_classes(self) -> &'static [AccountClass] {
        match self {
            Self::AllowanceYear => &[
                AccountClass::FacultyComputingAllowance,
                AccountClass::PartnerComputingAllowance,
            ],
            Self::Instructional => &[AccountClass::InstructionalComputingAllowance],
        }
    }
}
