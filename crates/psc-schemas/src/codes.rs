//! Integer-coded enums shared with the ledger ABI.
//!
//! The numeric codes are the wire format (API bodies, journal lines) and must
//! never be renumbered.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Actor classification. Determines which transitions an actor may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Role {
    Patient = 0,
    Fda = 1,
    IngredientSupplier = 2,
    Manufacturer = 3,
    Repackager = 4,
    Distributor = 5,
    Pharmacy = 6,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Patient,
        Role::Fda,
        Role::IngredientSupplier,
        Role::Manufacturer,
        Role::Repackager,
        Role::Distributor,
        Role::Pharmacy,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Fda => "FDA",
            Role::IngredientSupplier => "Ingredient Supplier",
            Role::Manufacturer => "Manufacturer",
            Role::Repackager => "Repackager",
            Role::Distributor => "Distributor",
            Role::Pharmacy => "Pharmacy",
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
            .ok_or_else(|| CoreError::validation(format!("unknown role code {code}")))
    }
}

impl From<Role> for u8 {
    fn from(r: Role) -> Self {
        r.code()
    }
}

/// Accepts the numeric code or the label in any case, with spaces, dashes
/// or underscores ("ingredient-supplier", "INGREDIENT_SUPPLIER", "2").
impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<u8>() {
            return Self::try_from(code);
        }
        let wanted = fold_label(s);
        Self::ALL
            .iter()
            .copied()
            .find(|r| fold_label(r.label()) == wanted)
            .ok_or_else(|| CoreError::validation(format!("unknown role '{}'", s.trim())))
    }
}

// ---------------------------------------------------------------------------
// BatchStatus
// ---------------------------------------------------------------------------

/// Lifecycle position of a batch. Codes follow the custody order, with the
/// FDA-rejection branch sitting at 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BatchStatus {
    None = 0,
    IngredientsSupplied = 1,
    FdaPending = 2,
    FdaApproved = 3,
    /// **Terminal.**
    FdaRejected = 4,
    Manufactured = 5,
    Repackaged = 6,
    Distributed = 7,
    /// **Terminal.**
    Dispensed = 8,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 9] = [
        BatchStatus::None,
        BatchStatus::IngredientsSupplied,
        BatchStatus::FdaPending,
        BatchStatus::FdaApproved,
        BatchStatus::FdaRejected,
        BatchStatus::Manufactured,
        BatchStatus::Repackaged,
        BatchStatus::Distributed,
        BatchStatus::Dispensed,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FdaRejected | Self::Dispensed)
    }

    pub fn label(self) -> &'static str {
        match self {
            BatchStatus::None => "None",
            BatchStatus::IngredientsSupplied => "Ingredients Supplied",
            BatchStatus::FdaPending => "FDA Pending",
            BatchStatus::FdaApproved => "FDA Approved",
            BatchStatus::FdaRejected => "FDA Rejected",
            BatchStatus::Manufactured => "Manufactured",
            BatchStatus::Repackaged => "Repackaged",
            BatchStatus::Distributed => "Distributed",
            BatchStatus::Dispensed => "Dispensed",
        }
    }
}

impl TryFrom<u8> for BatchStatus {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
            .ok_or_else(|| CoreError::validation(format!("unknown status code {code}")))
    }
}

impl From<BatchStatus> for u8 {
    fn from(s: BatchStatus) -> Self {
        s.code()
    }
}

// ---------------------------------------------------------------------------
// AlertType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AlertType {
    Temperature = 0,
    Humidity = 1,
    Pressure = 2,
    Tampering = 3,
    FakeTransfer = 4,
}

impl AlertType {
    pub const ALL: [AlertType; 5] = [
        AlertType::Temperature,
        AlertType::Humidity,
        AlertType::Pressure,
        AlertType::Tampering,
        AlertType::FakeTransfer,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertType::Temperature => "Temperature",
            AlertType::Humidity => "Humidity",
            AlertType::Pressure => "Pressure",
            AlertType::Tampering => "Tampering",
            AlertType::FakeTransfer => "Fake Transfer",
        }
    }
}

impl TryFrom<u8> for AlertType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| CoreError::validation(format!("unknown alert type code {code}")))
    }
}

impl From<AlertType> for u8 {
    fn from(t: AlertType) -> Self {
        t.code()
    }
}

fn fold_label(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
