use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Actor identity on the ledger.
///
/// Addresses compare case-insensitively, so the canonical form is lowercase.
/// No checksum or key validation happens here; wallet cryptography belongs to
/// the ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Identity used for writes that no human actor submitted (ambient sensor
    /// fan-out, gateway-submitted readings).
    pub const SYSTEM: &'static str = "system";

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let t = raw.trim();
        if t.is_empty() {
            return Err(CoreError::validation("address must not be empty"));
        }
        if t.chars().any(char::is_whitespace) {
            return Err(CoreError::validation(format!(
                "address '{t}' must not contain whitespace"
            )));
        }
        Ok(Self(t.to_ascii_lowercase()))
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parse_normalizes_case_and_trims() {
        let a = Address::parse("  0x70997970C51812dc3A010C7d01b50e0d17dc79C8 ").unwrap();
        let b = Address::parse("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0x70997970c51812dc3a010c7d01b50e0d17dc79c8");
    }

    #[test]
    fn empty_and_spaced_addresses_rejected() {
        assert_eq!(
            Address::parse("   ").unwrap_err().kind,
            ErrorKind::ValidationError
        );
        assert_eq!(
            Address::parse("0xab cd").unwrap_err().kind,
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn serde_goes_through_parse() {
        let a: Address = serde_json::from_str("\"0xABC\"").unwrap();
        assert_eq!(a.as_str(), "0xabc");
        assert!(serde_json::from_str::<Address>("\"\"").is_err());
    }
}
